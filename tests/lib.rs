//! Tests for extension routing and the top-level analysis entry points.

use std::fs;

use docsentry::{analyze_batch, analyze_file, Error, FileType, Inspector};

#[test]
fn file_type_from_extension() {
    assert_eq!(FileType::from_extension(".MSG"), Some(FileType::Msg));
    assert_eq!(FileType::from_extension("eml"), Some(FileType::Eml));
    assert_eq!(FileType::from_extension(".pdf"), Some(FileType::Pdf));
    assert_eq!(FileType::from_extension(".docx"), None);
    assert_eq!(FileType::Pdf.extension(), ".pdf");
    assert!(FileType::Eml.expected_mime_types().contains(&"message/rfc822"));
}

#[test]
fn unsupported_extension_fails_before_reading() {
    // The file does not exist: an Io error would mean it was opened.
    let result = analyze_file("/nonexistent/dir/report.docx");
    assert!(matches!(result.error, Some(Error::UnsupportedExtension(ref e)) if e == ".docx"));
    assert!(result.kind.is_none());
    assert!(!result.parsed);
    assert!(!result.completed);
    assert!(result.mime_type.is_none());
}

#[test]
fn missing_file_is_io_error() {
    let result = analyze_file("/nonexistent/dir/report.pdf");
    assert!(matches!(result.error, Some(Error::Io(_))));
    assert_eq!(result.kind, Some(FileType::Pdf));
    assert_eq!(result.status(), "ERROR");
}

#[test]
fn analyze_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("doc.pdf");
    fs::write(
        &pdf,
        b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /OpenAction << /S /JavaScript /JS (x) >> >>\nendobj\n",
    )
    .unwrap();
    let eml = dir.path().join("note.eml");
    fs::write(&eml, b"From: a@example.com\r\nSubject: hi\r\n\r\nhello\r\n").unwrap();
    let fake = dir.path().join("fake.pdf");
    fs::write(&fake, b"just some text\n").unwrap();

    let results = analyze_batch([&pdf, &eml, &fake]);
    assert_eq!(results.len(), 3);

    assert!(results[0].dangerous);
    assert!(results[0].completed);
    assert_eq!(results[0].status(), "DANGEROUS");
    assert_eq!(results[0].file_path, pdf.display().to_string());

    assert!(!results[1].dangerous);
    assert!(results[1].completed);
    assert_eq!(results[1].status(), "OK");
    assert!(results[1].metadata.contains("Subject: \"hi\"\n"));

    assert!(results[2].dangerous);
    assert!(!results[2].completed);
    assert!(matches!(results[2].error, Some(Error::MimeMismatch { ref mime, .. }) if mime == "text/plain; charset=utf-8"));
}

#[test]
fn inspector_is_reusable() {
    let inspector = Inspector::new();
    assert!(!inspector.domains().is_empty());
    let a = inspector.analyze_bytes("a.eml", b"Subject: one\r\n\r\nhttps://github.com\r\n");
    let b = inspector.analyze_bytes("b.eml", b"Subject: two\r\n\r\n");
    assert!(a.analysis.contains("URL from common domain"));
    assert!(b.analysis.contains("\tEmpty body\n"));
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_batch_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..8)
        .map(|i| {
            let p = dir.path().join(format!("m{i}.eml"));
            fs::write(&p, format!("Subject: {i}\r\n\r\nbody\r\n")).unwrap();
            p
        })
        .collect();
    let results = docsentry::par_analyze_batch(&paths);
    for (p, r) in paths.iter().zip(&results) {
        assert_eq!(r.file_path, p.display().to_string());
        assert!(r.completed);
    }
}
