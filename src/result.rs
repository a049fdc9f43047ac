//! Per-file result: parse/completion state, verdict and the two text reports.

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::error::Error;
use crate::threat::Assessment;
use crate::FileType;

/// Outcome of analyzing one file. Built stage by stage inside the analysis
/// call and returned by value.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ProcessResult {
    pub file_path: String,
    /// Format chosen from the extension; `None` when the extension is unsupported.
    pub kind: Option<FileType>,
    /// Sniffed MIME type of the content, when it was read.
    pub mime_type: Option<String>,
    /// The format parser produced a document.
    pub parsed: bool,
    /// Every analysis stage ran.
    pub completed: bool,
    pub dangerous: bool,
    #[cfg_attr(feature = "serde", serde(serialize_with = "error_message"))]
    pub error: Option<Error>,
    pub metadata: String,
    pub analysis: String,
}

#[cfg(feature = "serde")]
fn error_message<S: Serializer>(error: &Option<Error>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl ProcessResult {
    pub(crate) fn new(file_path: impl Into<String>, kind: Option<FileType>) -> Self {
        Self {
            file_path: file_path.into(),
            kind,
            mime_type: None,
            parsed: false,
            completed: false,
            dangerous: false,
            error: None,
            metadata: String::new(),
            analysis: String::new(),
        }
    }

    /// Failed before or during parsing.
    pub(crate) fn failed(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// Take the verdict and reports of a classification stage. Danger only accumulates.
    pub(crate) fn apply(&mut self, assessment: Assessment) {
        self.dangerous |= assessment.dangerous;
        self.metadata = assessment.metadata;
        self.analysis = assessment.analysis;
    }

    /// Short status used by the CLI: `ERROR`, `DANGEROUS`, `INCOMPLETE` or `OK`.
    pub fn status(&self) -> &'static str {
        if self.dangerous {
            "DANGEROUS"
        } else if self.error.is_some() {
            "ERROR"
        } else if !self.completed {
            "INCOMPLETE"
        } else {
            "OK"
        }
    }
}
