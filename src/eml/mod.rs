//! RFC 822 `.eml` reader: headers, raw body and base64 multipart attachments.

mod multipart;

pub use multipart::{scan_attachments, MultipartScan};

use tracing::{info, warn};

use crate::document::{DocumentBuilder, DocumentKind, NormalizedDocument};
use crate::error::{Error, Result};

/// Parse a mail message. Unreadable or missing headers are fatal; attachment
/// parts that fail to decode are recorded as warnings.
pub fn read_eml(data: &[u8]) -> Result<NormalizedDocument> {
    let (headers, body_offset) = mailparse::parse_headers(data)
        .map_err(|e| Error::StructuralCorrupt(format!("error reading eml message: {e}")))?;
    if headers.is_empty() {
        return Err(Error::StructuralCorrupt("message has no headers".to_string()));
    }

    let mut builder = DocumentBuilder::new(DocumentKind::Eml);
    for header in &headers {
        builder.set_property(canonical_header_key(&header.get_key()), header.get_value());
    }

    let body = String::from_utf8_lossy(data.get(body_offset..).unwrap_or_default()).into_owned();
    if body.is_empty() {
        warn!("failed to read any body bytes");
    } else {
        let content_type = builder.property("Content-Type").unwrap_or_default().to_string();
        match scan_attachments(&content_type, &body) {
            Ok(scan) => {
                let (attachments, failures) = scan.into_parts();
                for e in failures {
                    warn!(error = %e, "error extracting attachment");
                    builder.warn(e.to_string());
                }
                builder.extend_attachments(attachments);
            }
            Err(e) => {
                warn!(error = %e, "error scanning multipart body");
                builder.warn(e.to_string());
            }
        }
    }
    builder.body(body);

    let doc = builder.build();
    info!(
        headers = doc.properties().len(),
        attachments = doc.attachments().len(),
        "eml parsing done"
    );
    Ok(doc)
}

/// `message-id` → `Message-Id`. Keys with characters outside the header token
/// set are returned unchanged.
pub fn canonical_header_key(key: &str) -> String {
    let valid = key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid {
        return key.to_string();
    }
    let mut upper = true;
    key.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys() {
        assert_eq!(canonical_header_key("message-ID"), "Message-Id");
        assert_eq!(canonical_header_key("AUTHENTICATION-RESULTS"), "Authentication-Results");
        assert_eq!(canonical_header_key("bad key"), "bad key");
    }

    #[test]
    fn plain_message() {
        let raw = b"From: a@example.com\r\nSubject: hi\r\nSubject: again\r\n\r\nbody text\r\n";
        let doc = read_eml(raw).unwrap();
        assert_eq!(doc.property("Subject"), Some("hi"));
        assert_eq!(doc.body(), "body text\r\n");
        assert!(doc.attachments().is_empty());
    }

    #[test]
    fn empty_input_is_structural() {
        assert!(matches!(read_eml(b""), Err(Error::StructuralCorrupt(_))));
    }
}
