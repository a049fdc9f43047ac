//! MSG reader tests against containers written by the `cfb` crate.

use std::io::{Cursor, Read, Write};

use docsentry::msg::{is_msg, read_msg, OleEntryType, OleReader};
use docsentry::threat::MSG_MIME;
use docsentry::{analyze_bytes, DocumentKind, Error};

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn build_msg(streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    for (path, data) in streams {
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !parent.is_empty() && !comp.exists(parent) {
                comp.create_storage_all(parent).unwrap();
            }
        }
        let mut s = comp.create_stream(path).unwrap();
        s.write_all(data).unwrap();
    }
    comp.flush().unwrap();
    comp.into_inner().into_inner()
}

fn attachment(index: usize, filename: &str, data: &[u8]) -> Vec<(String, Vec<u8>)> {
    let dir = format!("/__attach_version1.0_#{index:08X}");
    vec![
        (format!("{dir}/__substg1.0_37010102"), data.to_vec()),
        (format!("{dir}/__substg1.0_3703001F"), utf16(".bin")),
        (format!("{dir}/__substg1.0_3704001F"), utf16(filename)),
        (format!("{dir}/__substg1.0_3707001F"), utf16(&format!("long {filename}"))),
        (format!("{dir}/__substg1.0_370E001F"), utf16("application/octet-stream")),
    ]
}

fn message_with_attachments(n: usize) -> Vec<u8> {
    let mut streams: Vec<(String, Vec<u8>)> = vec![
        ("/__substg1.0_0037001F".into(), utf16("Quarterly figures")),
        ("/__substg1.0_0C1A001E".into(), b"Finance Team\0".to_vec()),
        ("/__substg1.0_1000001F".into(), utf16("See https://github.com/acme/q3 for details")),
        ("/__substg1.0_8123001F".into(), utf16("custom")),
    ];
    for i in 0..n {
        streams.extend(attachment(i, &format!("file{i}.bin"), format!("payload {i}").as_bytes()));
    }
    let borrowed: Vec<(&str, Vec<u8>)> = streams.iter().map(|(p, d)| (p.as_str(), d.clone())).collect();
    build_msg(&borrowed)
}

#[test]
fn reader_walks_cfb_written_container() {
    let data = message_with_attachments(1);
    let mut reader = OleReader::new(&data).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry() {
        if entry.name() == "__substg1.0_3704001F" {
            assert_eq!(entry.path(), ["__attach_version1.0_#00000000".to_string()]);
            assert_eq!(entry.size(), utf16("file0.bin").len() as u64);
            let mut streamed = Vec::new();
            entry.reader().unwrap().read_to_end(&mut streamed).unwrap();
            assert_eq!(streamed, utf16("file0.bin"));
        }
        if entry.name().starts_with("__attach") {
            assert_eq!(entry.entry_type(), OleEntryType::Storage);
        }
        names.push(entry.name().to_string());
    }
    assert_eq!(names.len(), 10);
    // Storage children follow their storage.
    let storage = names.iter().position(|n| n.starts_with("__attach")).unwrap();
    assert!(names[storage + 1..].iter().all(|n| n.starts_with("__substg1.0_37")));
}

#[test]
fn n_groups_give_n_attachments() {
    for n in [0usize, 1, 3] {
        let doc = read_msg(&message_with_attachments(n)).unwrap();
        assert_eq!(doc.attachments().len(), n);
        for (i, a) in doc.attachments().iter().enumerate() {
            assert_eq!(a.filename, format!("file{i}.bin"));
            assert_eq!(a.long_filename, format!("long file{i}.bin"));
            assert_eq!(a.mime_tag, "application/octet-stream");
            assert_eq!(a.unicode_extension, ".bin");
            assert_eq!(a.bytes, format!("payload {i}").as_bytes());
            assert_eq!(a.size, a.bytes.len());
        }
    }
}

#[test]
fn properties_and_unknown_ids() {
    let doc = read_msg(&message_with_attachments(0)).unwrap();
    assert_eq!(doc.kind(), DocumentKind::Msg);
    assert_eq!(doc.property("Subject"), Some("Quarterly figures"));
    assert_eq!(doc.property("Sender name"), Some("Finance Team"));
    assert_eq!(doc.body(), "See https://github.com/acme/q3 for details");
    let unknown = doc.unknown_properties().get(&0x8123).unwrap();
    assert_eq!(unknown.property_type, "8123");
    assert_eq!(unknown.encoding, "001F");
    assert_eq!(unknown.data, "custom");
    assert!(!doc.properties().contains_key("8123"));
}

#[test]
fn html_body_used_when_plain_body_missing() {
    let data = build_msg(&[
        ("/__substg1.0_0037001F", utf16("html only")),
        ("/__substg1.0_10130102", b"<a href=\"https://evil.test/x\">x</a>".to_vec()),
    ]);
    let doc = read_msg(&data).unwrap();
    assert!(doc.body().contains("https://evil.test/x"));
}

#[test]
fn failed_auth_in_transport_headers_is_dangerous() {
    let headers = "Received: from mx.example.com\r\n\
Authentication-Results: mx.example.com; dkim=pass header.d=example.com; spf=fail smtp.mailfrom=evil.test; dmarc=pass\r\n\
Subject: hi\r\n\r\n";
    let data = build_msg(&[
        ("/__substg1.0_0037001F", utf16("hi")),
        ("/__substg1.0_007D001F", utf16(headers)),
    ]);
    assert!(is_msg(&data));
    let result = analyze_bytes("mail.msg", &data);
    assert_eq!(result.mime_type.as_deref(), Some(MSG_MIME));
    assert!(result.parsed);
    assert!(result.completed);
    assert!(result.dangerous);
    assert!(result.analysis.contains("\tBAD: spf=fail smtp.mailfrom=evil.test\n"));
    assert!(result.analysis.contains("\tGOOD: dkim=pass header.d=example.com\n"));
    assert!(result.metadata.contains("Subject: \"hi\"\n"));
}

#[test]
fn clean_message_report() {
    let result = analyze_bytes("mail.msg", &message_with_attachments(2));
    assert!(result.completed);
    assert!(!result.dangerous);
    assert!(result.analysis.contains("\nEmail has 2 attachments:\n"));
    assert!(result.analysis.contains("\tFilename: \"file1.bin\"\n"));
    assert!(result.analysis.contains("\tEmail body has content.\n"));
    assert!(result.analysis.contains("\t\tURL from common domain: \"https://github.com/acme/q3\"\n"));
    assert!(result.metadata.contains("Sender name: \"Finance Team\"\n"));
}

#[test]
fn container_without_properties_is_not_msg() {
    let data = build_msg(&[("/Contents", b"plain ole stream".to_vec())]);
    assert!(!is_msg(&data));
    let result = analyze_bytes("mail.msg", &data);
    assert!(!result.parsed);
    assert!(!result.completed);
    assert!(result.dangerous);
    assert!(matches!(result.error, Some(Error::MimeMismatch { .. })));
    assert!(result.analysis.starts_with("Mismatched extension and MIME type.\n\n"));
}

#[test]
fn garbage_is_container_corrupt() {
    let err = read_msg(b"definitely not a compound file").unwrap_err();
    assert!(matches!(err, Error::ContainerCorrupt(_)));
    assert!(err.is_fatal());
}
