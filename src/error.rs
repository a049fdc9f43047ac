//! Error taxonomy shared by every parser and the orchestrator.
//!
//! Whole-document failures ([`Error::is_fatal`]) abort one file; everything
//! below document granularity is logged, dropped and processing continues.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Compound-file header or allocation tables cannot be parsed.
    #[error("container is corrupt: {0}")]
    ContainerCorrupt(String),

    /// Whole document is unparseable (PDF without header or objects, unreadable mail headers).
    #[error("document is structurally corrupt: {0}")]
    StructuralCorrupt(String),

    /// A single property, attachment or object failed to decode.
    #[error("failed to decode {unit}: {reason}")]
    DecodeFailure { unit: String, reason: String },

    /// Container entry name does not carry the property stream prefix.
    #[error("entry {0:?} is not a property stream")]
    NotAPropertyStream(String),

    #[error("unsupported file extension {0:?}")]
    UnsupportedExtension(String),

    /// Password or permission encryption; the document cannot be inspected.
    #[error("document is encrypted and cannot be inspected")]
    EncryptedDocument,

    /// Sniffed MIME type does not match the extension; parsing is skipped.
    #[error("{explanation}")]
    MimeMismatch {
        extension: String,
        mime: String,
        explanation: String,
    },

    #[error("invalid base64 in attachment {filename:?}: {source}")]
    Base64Decode {
        filename: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn decode(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DecodeFailure {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that leave no usable partial result for the document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ContainerCorrupt(_)
                | Error::StructuralCorrupt(_)
                | Error::UnsupportedExtension(_)
                | Error::Io(_)
        )
    }
}
