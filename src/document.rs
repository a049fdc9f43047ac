//! Normalized view of a parsed mail document (properties/headers, attachments, body).

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::msg::PropertyEntry;

/// Format a document was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DocumentKind {
    Msg,
    Eml,
    Pdf,
}

/// Property whose id has no entry in the name table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct UnknownProperty {
    /// Property id as four hex digits (e.g. "8015").
    pub property_type: String,
    /// Encoding id as four hex digits (e.g. "0102").
    pub encoding: String,
    /// Decoded text, or base64 of the raw payload for non-text encodings.
    pub data: String,
}

/// One attachment recovered from a container or a multipart body.
///
/// Identity is its position in [`NormalizedDocument::attachments`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Attachment {
    #[cfg_attr(feature = "serde", serde(skip))]
    pub bytes: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub other_bytes: Vec<u8>,
    pub size: usize,
    pub filename: String,
    pub long_filename: String,
    pub mime_tag: String,
    pub unicode_extension: String,
}

impl Attachment {
    /// Long filename when present, otherwise the short one.
    pub fn display_name(&self) -> &str {
        if self.long_filename.is_empty() {
            &self.filename
        } else {
            &self.long_filename
        }
    }

    /// Lowercase hex SHA-256 of the primary payload.
    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Parsed document. Built once through [`DocumentBuilder`], read-only afterwards.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct NormalizedDocument {
    kind: DocumentKind,
    properties: IndexMap<String, String>,
    unknown_properties: IndexMap<u16, UnknownProperty>,
    attachments: Vec<Attachment>,
    body: String,
    warnings: Vec<String>,
}

impl NormalizedDocument {
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Recognized properties (MSG) or headers (EML), keyed by canonical name.
    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn unknown_properties(&self) -> &IndexMap<u16, UnknownProperty> {
        &self.unknown_properties
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Units that failed to decode and were dropped.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Accumulates a [`NormalizedDocument`].
#[derive(Debug)]
pub struct DocumentBuilder {
    doc: NormalizedDocument,
}

impl DocumentBuilder {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            doc: NormalizedDocument {
                kind,
                properties: IndexMap::new(),
                unknown_properties: IndexMap::new(),
                attachments: Vec::new(),
                body: String::new(),
                warnings: Vec::new(),
            },
        }
    }

    /// Store a decoded MAPI property under its name, or under its numeric id when unrecognized.
    /// Empty values are dropped; the first value seen for a name or id is kept.
    pub fn add_property(&mut self, entry: &PropertyEntry) {
        let text = entry.text_value();
        if text.is_empty() {
            return;
        }
        match entry.name() {
            Some(name) => {
                self.doc
                    .properties
                    .entry(name.to_string())
                    .or_insert_with(|| text.into_owned());
            }
            None => {
                if entry.encoding_name().is_none() {
                    debug!(
                        property = %entry.property_type(),
                        encoding = %entry.encoding(),
                        "property uses unknown encoding"
                    );
                }
                self.doc
                    .unknown_properties
                    .entry(entry.id)
                    .or_insert_with(|| UnknownProperty {
                        property_type: entry.property_type(),
                        encoding: entry.encoding(),
                        data: text.into_owned(),
                    });
            }
        }
    }

    /// Store a named value (mail header). Empty values are dropped; first occurrence wins.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.doc.properties.entry(name.into()).or_insert(value);
    }

    pub fn extend_attachments(&mut self, attachments: impl IntoIterator<Item = Attachment>) {
        self.doc.attachments.extend(attachments);
    }

    pub fn body(&mut self, body: impl Into<String>) {
        self.doc.body = body.into();
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.doc.warnings.push(warning.into());
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.doc.properties.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.doc.property(name)
    }

    pub fn build(self) -> NormalizedDocument {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::decode_property;

    #[test]
    fn property_lands_in_exactly_one_map() {
        let mut b = DocumentBuilder::new(DocumentKind::Msg);
        let subject: Vec<u8> = "Invoice".encode_utf16().flat_map(u16::to_le_bytes).collect();
        b.add_property(&decode_property("__substg1.0_0037001F", &subject).unwrap());
        b.add_property(&decode_property("__substg1.0_80AA0102", &[1, 2, 3]).unwrap());
        let doc = b.build();
        assert_eq!(doc.property("Subject"), Some("Invoice"));
        assert!(!doc.unknown_properties().contains_key(&0x0037));
        let unknown = &doc.unknown_properties()[&0x80AA];
        assert_eq!(unknown.property_type, "80AA");
        assert_eq!(unknown.encoding, "0102");
        assert_eq!(unknown.data, "AQID");
        assert!(!doc.properties().values().any(|v| v == "AQID"));
    }

    #[test]
    fn empty_values_dropped_and_first_wins() {
        let mut b = DocumentBuilder::new(DocumentKind::Msg);
        b.add_property(&decode_property("__substg1.0_0037001F", &[]).unwrap());
        assert!(!b.has_property("Subject"));
        b.add_property(&decode_property("__substg1.0_0037001E", b"first").unwrap());
        b.add_property(&decode_property("__substg1.0_0037001E", b"second").unwrap());
        assert_eq!(b.build().property("Subject"), Some("first"));
    }

    #[test]
    fn display_name_prefers_long_filename() {
        let a = Attachment {
            filename: "REPORT~1.PDF".into(),
            long_filename: "report final.pdf".into(),
            ..Default::default()
        };
        assert_eq!(a.display_name(), "report final.pdf");
        let b = Attachment {
            filename: "a.txt".into(),
            ..Default::default()
        };
        assert_eq!(b.display_name(), "a.txt");
    }

    #[test]
    fn sha256_of_empty_payload() {
        assert_eq!(
            Attachment::default().sha256_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
