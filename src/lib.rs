//! # docsentry
//!
//! Triage untrusted documents without rendering them: Outlook `.msg`
//! containers, RFC 822 `.eml` messages and PDFs are parsed with hand-written
//! readers and checked for the signals an analyst looks at first.
//!
//! ## Formats and checks
//!
//! - **MSG (compound file)**: MAPI properties, attachments reassembled from
//!   their property streams, `Authentication-Results` from the transport
//!   headers, links in the body.
//! - **EML**: headers, base64 attachments from `multipart/mixed` bodies,
//!   authentication results, links in the body.
//! - **PDF**: full-file object scan (object streams included), `#xx` name
//!   deobfuscation, active content (`/JavaScript`, `/JS`, `/OpenAction`,
//!   `/Launch`, `/AA`, `/AcroForm`), encryption, info dictionary.
//!
//! Every file is first checked for an extension/content mismatch; a
//! mismatching file is reported as dangerous and not parsed.
//!
//! ## Example
//!
//! ```no_run
//! let result = docsentry::analyze_file("invoice.pdf");
//! if result.dangerous {
//!     println!("{}", result.analysis);
//! }
//! ```
//!
//! ## Throughput
//!
//! One file is processed synchronously start to finish. An [`Inspector`] is
//! read-only and can be shared across threads; enable the `parallel` feature
//! for a `rayon` batch API.

mod document;
mod error;
mod result;
pub mod eml;
pub mod msg;
pub mod pdf;
pub mod threat;

pub use document::{Attachment, DocumentBuilder, DocumentKind, NormalizedDocument, UnknownProperty};
pub use error::{Error, Result};
pub use result::ProcessResult;
pub use threat::{extension_mime_mismatch, Assessment, CommonDomains};

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::Path;

use tracing::{info, warn};

/// Formats selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FileType {
    Msg,
    Eml,
    Pdf,
}

impl FileType {
    /// Extension with a leading dot (e.g. ".msg").
    pub fn extension(self) -> &'static str {
        match self {
            FileType::Msg => ".msg",
            FileType::Eml => ".eml",
            FileType::Pdf => ".pdf",
        }
    }

    /// Short label for display.
    pub fn label(self) -> &'static str {
        match self {
            FileType::Msg => "Outlook message",
            FileType::Eml => "Email message",
            FileType::Pdf => "PDF",
        }
    }

    pub fn expected_mime_types(self) -> &'static [&'static str] {
        threat::expected_mime_types(self.extension()).unwrap_or_default()
    }

    /// Case-insensitive, with or without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "msg" => Some(FileType::Msg),
            "eml" => Some(FileType::Eml),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// Type for a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(OsStr::to_str).and_then(Self::from_extension)
    }
}

/// Per-process analysis configuration. Read-only, shareable across threads.
#[derive(Debug, Clone)]
pub struct Inspector {
    domains: Cow<'static, CommonDomains>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    /// Uses the bundled common-domain list.
    pub fn new() -> Self {
        Self {
            domains: Cow::Borrowed(CommonDomains::bundled()),
        }
    }

    pub fn with_domains(domains: CommonDomains) -> Self {
        Self {
            domains: Cow::Owned(domains),
        }
    }

    pub fn domains(&self) -> &CommonDomains {
        &self.domains
    }

    /// Analyze a file on disk. The extension is checked before anything is read.
    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> ProcessResult {
        let path = path.as_ref();
        let shown = path.display().to_string();
        info!(path = %shown, "processing file");

        let Some(kind) = FileType::from_path(path) else {
            return unsupported(shown, path);
        };
        match std::fs::read(path) {
            Ok(bytes) => self.run(shown, kind, &bytes),
            Err(e) => {
                warn!(path = %shown, error = %e, "failed to read file");
                ProcessResult::new(shown, Some(kind)).failed(e.into())
            }
        }
    }

    /// Analyze in-memory content; `path` supplies the extension and the report name.
    pub fn analyze_bytes<P: AsRef<Path>>(&self, path: P, bytes: &[u8]) -> ProcessResult {
        let path = path.as_ref();
        let shown = path.display().to_string();
        info!(path = %shown, size = bytes.len(), "processing bytes");

        match FileType::from_path(path) {
            Some(kind) => self.run(shown, kind, bytes),
            None => unsupported(shown, path),
        }
    }

    /// Analyze paths one after another.
    pub fn analyze_batch<I, P>(&self, paths: I) -> Vec<ProcessResult>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(|p| self.analyze_file(p)).collect()
    }

    /// Analyze paths on the `rayon` pool; results keep the input order.
    #[cfg(feature = "parallel")]
    pub fn par_analyze_batch<P>(&self, paths: &[P]) -> Vec<ProcessResult>
    where
        P: AsRef<Path> + Sync,
    {
        use rayon::prelude::*;
        paths.par_iter().map(|p| self.analyze_file(p)).collect()
    }

    fn run(&self, file_path: String, kind: FileType, bytes: &[u8]) -> ProcessResult {
        let mut result = ProcessResult::new(file_path, Some(kind));

        let mime = threat::detect_mime_type(bytes);
        result.mime_type = Some(mime.to_string());
        let (ok, explanation) = extension_mime_mismatch(kind.extension(), mime);
        if !ok {
            warn!(path = %result.file_path, mime, "extension and content disagree");
            result.apply(threat::assess_mismatch(&explanation));
            result.error = Some(Error::MimeMismatch {
                extension: kind.extension().to_string(),
                mime: mime.to_string(),
                explanation,
            });
            return result;
        }

        let parsed = match kind {
            FileType::Msg => msg::read_msg(bytes).map(|doc| threat::assess_email(&doc, &self.domains)),
            FileType::Eml => eml::read_eml(bytes).map(|doc| threat::assess_email(&doc, &self.domains)),
            FileType::Pdf => pdf::read_pdf(bytes).map(|doc| threat::assess_pdf(&doc)),
        };

        match parsed {
            Ok(assessment) => {
                result.parsed = true;
                result.completed = true;
                result.apply(assessment);
            }
            Err(Error::EncryptedDocument) => {
                info!(path = %result.file_path, "encrypted document, not inspected");
                let assessment = threat::assess_encrypted(&result.file_path);
                result.apply(assessment);
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!(path = %result.file_path, error = %e, "failed to parse file");
                } else {
                    info!(path = %result.file_path, error = %e, "file not analyzed");
                }
                result.error = Some(e);
            }
        }
        info!(
            path = %result.file_path,
            dangerous = result.dangerous,
            completed = result.completed,
            "processing done"
        );
        result
    }
}

fn unsupported(file_path: String, path: &Path) -> ProcessResult {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    warn!(path = %file_path, extension = %ext, "unsupported file extension");
    ProcessResult::new(file_path, None).failed(Error::UnsupportedExtension(ext))
}

/// Analyze one file with the bundled configuration.
pub fn analyze_file<P: AsRef<Path>>(path: P) -> ProcessResult {
    Inspector::new().analyze_file(path)
}

/// Analyze in-memory content with the bundled configuration.
pub fn analyze_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> ProcessResult {
    Inspector::new().analyze_bytes(path, bytes)
}

/// Analyze many files in sequence with the bundled configuration.
pub fn analyze_batch<I, P>(paths: I) -> Vec<ProcessResult>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    Inspector::new().analyze_batch(paths)
}

/// Parallel [`analyze_batch`].
#[cfg(feature = "parallel")]
pub fn par_analyze_batch<P>(paths: &[P]) -> Vec<ProcessResult>
where
    P: AsRef<Path> + Sync,
{
    Inspector::new().par_analyze_batch(paths)
}
