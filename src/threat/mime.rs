//! Extension/MIME consistency and a small content sniffer.

use crate::msg::{is_msg, is_ole};

pub const MSG_MIME: &str = "application/vnd.ms-outlook";
pub const EML_MIME: &str = "text/plain; charset=utf-8";
pub const RFC822_MIME: &str = "message/rfc822";
pub const PDF_MIME: &str = "application/pdf";
pub const OLE_MIME: &str = "application/x-ole-storage";
pub const ZIP_MIME: &str = "application/zip";
pub const LATIN1_TEXT_MIME: &str = "text/plain; charset=iso-8859-1";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// Bytes inspected by [`detect_mime_type`].
const SNIFF_LEN: usize = 8192;

/// Header names that open a stored mail message.
const MAIL_HEADERS: [&str; 14] = [
    "received",
    "return-path",
    "delivered-to",
    "from",
    "to",
    "subject",
    "date",
    "message-id",
    "mime-version",
    "reply-to",
    "x-mailer",
    "x-received",
    "authentication-results",
    "arc-seal",
];

/// MIME types accepted for a supported extension (leading dot, any case).
pub fn expected_mime_types(extension: &str) -> Option<&'static [&'static str]> {
    match normalize_extension(extension).as_str() {
        ".msg" => Some(&[MSG_MIME]),
        ".eml" => Some(&[EML_MIME, RFC822_MIME]),
        ".pdf" => Some(&[PDF_MIME]),
        _ => None,
    }
}

fn normalize_extension(extension: &str) -> String {
    let lower = extension.trim().to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// `(true, "")` when `mime` is what the extension promises (or the extension is
/// not one this crate parses); otherwise `(false, explanation)`.
pub fn extension_mime_mismatch(extension: &str, mime: &str) -> (bool, String) {
    let Some(expected) = expected_mime_types(extension) else {
        return (true, String::new());
    };
    if expected.iter().any(|e| e.eq_ignore_ascii_case(mime.trim())) {
        return (true, String::new());
    }
    (
        false,
        format!(
            "We expect {:?} for files with {} extensions, but found {:?}.",
            expected[0],
            normalize_extension(extension),
            mime
        ),
    )
}

/// Identify content from its leading bytes.
pub fn detect_mime_type(data: &[u8]) -> &'static str {
    if is_ole(data) {
        return if is_msg(data) { MSG_MIME } else { OLE_MIME };
    }
    if data.starts_with(b"%PDF-") {
        return PDF_MIME;
    }
    if data.starts_with(b"PK\x03\x04") {
        return ZIP_MIME;
    }

    let head = &data[..data.len().min(SNIFF_LEN)];
    if head.is_empty() || head.contains(&0) {
        return OCTET_STREAM_MIME;
    }
    if looks_like_mail(head) {
        return RFC822_MIME;
    }
    match std::str::from_utf8(head) {
        Ok(_) => EML_MIME,
        // A multi-byte sequence cut by the window is still text.
        Err(e) if e.error_len().is_none() => EML_MIME,
        Err(_) if head.iter().all(|&b| b >= 0x20 || b.is_ascii_whitespace()) => LATIN1_TEXT_MIME,
        Err(_) => OCTET_STREAM_MIME,
    }
}

/// First line is a header field that mail messages start with.
fn looks_like_mail(head: &[u8]) -> bool {
    let first = head.split(|&b| b == b'\n').next().unwrap_or_default();
    let Some(colon) = first.iter().position(|&b| b == b':') else {
        return false;
    };
    let name = String::from_utf8_lossy(&first[..colon]).to_ascii_lowercase();
    MAIL_HEADERS.contains(&name.as_str()) || name.starts_with("x-")
}
