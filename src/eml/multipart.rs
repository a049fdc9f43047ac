//! Line-oriented attachment scanner for `multipart/mixed` bodies.
//!
//! Not a conformant MIME parser: it looks for boundary lines, a named
//! Content-Type right after them, a base64 transfer encoding among the part
//! headers, and decodes the wrapped payload up to the next blank line or
//! boundary. Parts that do not fit that shape are skipped.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, info};

use crate::document::Attachment;
use crate::error::{Error, Result};

/// Lines after a boundary searched for the transfer encoding.
const ENCODING_WINDOW: usize = 9;

/// Outcome of [`scan_attachments`].
#[derive(Debug)]
pub enum MultipartScan {
    /// Top-level type is not `multipart/mixed`.
    NoAttachments,
    /// One entry per recognized attachment part, in body order.
    Parts(Vec<Result<Attachment>>),
}

impl MultipartScan {
    /// Split into decoded attachments and per-part failures.
    pub fn into_parts(self) -> (Vec<Attachment>, Vec<Error>) {
        match self {
            MultipartScan::NoAttachments => (Vec::new(), Vec::new()),
            MultipartScan::Parts(parts) => {
                let mut ok = Vec::new();
                let mut failed = Vec::new();
                for part in parts {
                    match part {
                        Ok(att) => ok.push(att),
                        Err(e) => failed.push(e),
                    }
                }
                (ok, failed)
            }
        }
    }
}

/// Extract base64 attachments from a body given its declared Content-Type.
pub fn scan_attachments(content_type: &str, body: &str) -> Result<MultipartScan> {
    let ct = mailparse::parse_content_type(content_type);
    if !ct.mimetype.starts_with("multipart/mixed") {
        debug!(mime = %ct.mimetype, "content type is not multipart");
        return Ok(MultipartScan::NoAttachments);
    }
    let boundary = ct
        .params
        .get("boundary")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::decode("Content-Type", "multipart/mixed without a boundary"))?;
    Ok(MultipartScan::Parts(scan_parts(body, boundary)))
}

fn scan_parts(body: &str, boundary: &str) -> Vec<Result<Attachment>> {
    let marker = format!("--{boundary}");
    let lines: Vec<&str> = body.lines().collect();
    let mut parts = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        let Some(rest) = line.strip_prefix(marker.as_str()) else {
            continue;
        };
        if rest.starts_with("--") {
            // closing delimiter
            continue;
        }
        if let Some(part) = scan_part(&lines[i..], &marker) {
            parts.push(part);
        }
    }
    parts
}

/// Unfolded header lines of a part plus the index of the line after the blank separator.
fn part_headers(lines: &[&str], marker: &str) -> (Vec<String>, usize) {
    let mut headers: Vec<String> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            return (headers, idx + 1);
        }
        if line.starts_with(marker) {
            return (headers, idx);
        }
        match headers.last_mut() {
            Some(prev) if line.starts_with(|c: char| c == ' ' || c == '\t') => {
                prev.push(' ');
                prev.push_str(line.trim());
            }
            _ => headers.push(line.trim_end().to_string()),
        }
    }
    (headers, lines.len())
}

fn header_value<'h>(header: &'h str, name: &str) -> Option<&'h str> {
    let (key, value) = header.split_once(':')?;
    key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
}

fn scan_part(lines: &[&str], marker: &str) -> Option<Result<Attachment>> {
    let (headers, payload_start) = part_headers(lines, marker);

    let content_type = header_value(headers.first()?, "Content-Type")?;
    let ct = mailparse::parse_content_type(content_type);
    let filename = ct.params.get("name")?.trim().trim_matches('"').to_string();

    // Physical line span of the headers bounds the encoding search.
    let window_end = payload_start.min(ENCODING_WINDOW);
    let is_base64 = lines[..window_end].iter().any(|l| {
        header_value(l, "Content-Transfer-Encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("base64"))
    });
    if !is_base64 {
        debug!(filename = %filename, "attachment part is not base64, skipping");
        return None;
    }

    let mut encoded = String::new();
    for line in &lines[payload_start..] {
        let trimmed = line.trim();
        if trimmed.is_empty() || line.starts_with(marker) {
            break;
        }
        encoded.push_str(trimmed);
    }

    Some(match STANDARD.decode(encoded.as_bytes()) {
        Ok(bytes) => {
            info!(filename = %filename, bytes = bytes.len(), "extracted attachment");
            Ok(Attachment {
                size: bytes.len(),
                bytes,
                filename,
                mime_tag: ct.mimetype,
                ..Default::default()
            })
        }
        Err(source) => Err(Error::Base64Decode { filename, source }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/mixed; boundary=\"XYZ\"";

    #[test]
    fn non_multipart_is_not_an_error() {
        let scan = scan_attachments("text/plain; charset=utf-8", "hello").unwrap();
        assert!(matches!(scan, MultipartScan::NoAttachments));
    }

    #[test]
    fn missing_boundary_is_decode_failure() {
        let err = scan_attachments("multipart/mixed", "").unwrap_err();
        assert!(matches!(err, Error::DecodeFailure { .. }));
    }

    #[test]
    fn decodes_single_part() {
        let body = "preamble\r\n--XYZ\r\nContent-Type: application/pdf; name=\"G026730897.pdf\"\r\n\
Content-Disposition: attachment; filename=G026730897.pdf\r\nContent-Transfer-Encoding: base64\r\n\r\n\
JVBERi0x\r\nLjcK\r\n\r\n--XYZ--\r\n";
        let (atts, errs) = scan_attachments(CT, body).unwrap().into_parts();
        assert!(errs.is_empty());
        assert_eq!(atts.len(), 1);
        assert_eq!(atts[0].filename, "G026730897.pdf");
        assert_eq!(atts[0].bytes, b"%PDF-1.7\n");
        assert_eq!(atts[0].mime_tag, "application/pdf");
        assert_eq!(atts[0].size, 9);
    }

    #[test]
    fn part_without_name_is_skipped() {
        let body = "--XYZ\nContent-Type: text/plain\nContent-Transfer-Encoding: base64\n\naGk=\n--XYZ--\n";
        let MultipartScan::Parts(parts) = scan_attachments(CT, body).unwrap() else {
            panic!("expected parts");
        };
        assert!(parts.is_empty());
    }

    #[test]
    fn folded_content_type_is_unfolded() {
        let body = "--XYZ\nContent-Type: application/octet-stream;\n\tname=\"a.bin\"\nContent-Transfer-Encoding: base64\n\nAAEC\n--XYZ--\n";
        let (atts, _) = scan_attachments(CT, body).unwrap().into_parts();
        assert_eq!(atts[0].filename, "a.bin");
        assert_eq!(atts[0].bytes, [0, 1, 2]);
    }

    #[test]
    fn bad_base64_surfaces_error() {
        let body = "--XYZ\nContent-Type: application/zip; name=x.zip\nContent-Transfer-Encoding: base64\n\n@@not-base64@@\n--XYZ--\n";
        let (atts, errs) = scan_attachments(CT, body).unwrap().into_parts();
        assert!(atts.is_empty());
        assert!(matches!(&errs[..], [Error::Base64Decode { filename, .. }] if filename == "x.zip"));
    }
}
