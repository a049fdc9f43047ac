//! Text sections shared by the email and PDF assessments.

use crate::document::{Attachment, DocumentKind, NormalizedDocument};

/// Properties listed for `.msg` files, in report order.
pub const MSG_KEY_FIELDS: [&str; 12] = [
    "Sender name",
    "Sender Simple Display Name",
    "Sender SMTP Address",
    "Sender Email",
    "Sender Email 2",
    "Received by name",
    "Received By SMTP Address",
    "Seven Bit Email",
    "Received by email",
    "Subject",
    "Topic",
    "MessageID",
];

/// Headers listed for `.eml` files, in canonical form.
pub const EML_KEY_FIELDS: [&str; 7] = [
    "From",
    "Return-Path",
    "To",
    "Date",
    "Subject",
    "Message-Id",
    "Content-Type",
];

/// `Name: "value"` for each key field the document carries.
pub fn key_fields(doc: &NormalizedDocument) -> String {
    let names: &[&str] = match doc.kind() {
        DocumentKind::Msg => &MSG_KEY_FIELDS,
        DocumentKind::Eml => &EML_KEY_FIELDS,
        DocumentKind::Pdf => &[],
    };
    let mut out = String::new();
    for name in names {
        if let Some(value) = doc.property(name) {
            out.push_str(&format!("{name}: {value:?}\n"));
        }
    }
    out
}

/// Filenames, MIME tag, size and SHA-256 of every attachment.
pub fn attachment_report(attachments: &[Attachment]) -> String {
    let mut out = format!("\nEmail has {} attachments:\n", attachments.len());
    for (i, a) in attachments.iter().enumerate() {
        out.push_str(&format!("\tAttachment {}:\n", i + 1));
        if !a.filename.is_empty() {
            out.push_str(&format!("\tFilename: {:?}\n", a.filename));
        }
        if !a.long_filename.is_empty() {
            out.push_str(&format!("\tLong Filename: {:?}\n", a.long_filename));
        }
        if !a.mime_tag.is_empty() {
            out.push_str(&format!("\tMIME tag: {:?}\n", a.mime_tag));
        }
        out.push_str(&format!("\tSize: {} bytes\n", a.bytes.len()));
        out.push_str(&format!("\tSHA-256 hash: {:?}\n\n", a.sha256_hex()));
    }
    out
}

/// `label<TAB>value` rows with the values aligned.
pub fn aligned_rows<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let rows: Vec<(&str, &str)> = rows.into_iter().collect();
    let width = rows.iter().map(|(k, _)| k.trim().chars().count()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| format!("{:<width$}\t{}\n", k.trim(), v))
        .collect()
}

/// Byte count for display, binary units.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_lines() {
        let a = Attachment {
            bytes: b"abc".to_vec(),
            size: 3,
            filename: "a.txt".into(),
            mime_tag: "text/plain".into(),
            ..Default::default()
        };
        let report = attachment_report(&[a]);
        assert!(report.starts_with("\nEmail has 1 attachments:\n\tAttachment 1:\n"));
        assert!(report.contains("\tFilename: \"a.txt\"\n"));
        assert!(!report.contains("Long Filename"));
        assert!(report.contains("\tSize: 3 bytes\n"));
        assert!(report.contains(
            "\tSHA-256 hash: \"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\"\n\n"
        ));
    }

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn rows_align() {
        let out = aligned_rows([("Title", "Q3"), ("Modified Date", "2023")]);
        assert_eq!(out, "Title        \tQ3\nModified Date\t2023\n");
    }
}
