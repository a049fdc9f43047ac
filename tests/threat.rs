//! Classifier heuristics: MIME consistency, authentication results, links.

use docsentry::threat::{
    assess_email, detect_mime_type, extract_original_url, host_from_url, inspect_links,
    is_safelink, AuthResults, LinkFinding, Verdict, PDF_MIME,
};
use docsentry::{extension_mime_mismatch, CommonDomains, DocumentBuilder, DocumentKind};

#[test]
fn pdf_mime_consistency() {
    let (ok, why) = extension_mime_mismatch(".pdf", "application/pdf");
    assert!(ok);
    assert!(why.is_empty());

    let (ok, why) = extension_mime_mismatch(".pdf", "text/plain");
    assert!(!ok);
    assert_eq!(
        why,
        "We expect \"application/pdf\" for files with .pdf extensions, but found \"text/plain\"."
    );
}

#[test]
fn msg_requires_outlook_mime() {
    assert!(extension_mime_mismatch(".msg", "application/vnd.ms-outlook").0);
    assert!(!extension_mime_mismatch(".msg", "application/x-ole-storage").0);
    assert_eq!(detect_mime_type(b"%PDF-1.3\n"), PDF_MIME);
}

#[test]
fn exactly_one_bad_clause() {
    let results = AuthResults::parse("dkim=pass; spf=fail; dmarc=pass");
    assert!(results.failed());
    let lines = results.lines();
    assert_eq!(lines.len(), 3);
    let bad: Vec<&String> = lines.iter().filter(|l| l.starts_with("\tBAD: ")).collect();
    assert_eq!(bad, [&"\tBAD: spf=fail".to_string()]);
}

#[test]
fn all_pass_is_clean() {
    assert!(!AuthResults::parse("mx; dkim=pass; spf=pass; dmarc=pass (p=reject)").failed());
    assert!(AuthResults::parse("dmarc=none").failed());
}

#[test]
fn safelink_recovery() {
    let url = "https://eu01.safelinks.protection.outlook.com/?url=https%3A%2F%2Fexample.com";
    assert!(is_safelink(url));
    assert_eq!(extract_original_url(url).unwrap(), "https://example.com");
    assert!(extract_original_url("https://eu01.safelinks.protection.outlook.com/?data=1").is_err());
}

#[test]
fn safelink_is_judged_by_its_target() {
    let domains = CommonDomains::from_list("example.com");
    let body = "https://eu01.safelinks.protection.outlook.com/?url=https%3A%2F%2Fphish.test%2Fa&data=x";
    let report = inspect_links(body, &domains);
    assert_eq!(
        report.findings,
        vec![LinkFinding::Safelink {
            original: "https://phish.test/a".to_string(),
            common: false,
        }]
    );
}

#[test]
fn hosts_are_normalized() {
    assert_eq!(host_from_url("HTTPS://WWW.BBC.CO.UK/news"), "bbc.co.uk");
    assert_eq!(host_from_url("https://mobile.twitter.com/x"), "twitter.com");
}

#[test]
fn verdict_is_never_cleared() {
    let mut verdict = Verdict::new();
    verdict.mark_dangerous();
    verdict.raise_if(false);
    assert!(verdict.is_dangerous());
}

#[test]
fn email_assessment_order() {
    let mut builder = DocumentBuilder::new(DocumentKind::Eml);
    builder.set_property("Subject", "Order");
    builder.set_property("Authentication-Results", "mx; spf=softfail");
    builder.body("Visit https://github.com/x");
    let doc = builder.build();

    let assessment = assess_email(&doc, CommonDomains::bundled());
    assert!(assessment.dangerous);
    assert_eq!(assessment.metadata, "Subject: \"Order\"\n");
    let auth = assessment.analysis.find("Authentication results:").unwrap();
    let body = assessment.analysis.find("Body Details:").unwrap();
    assert!(auth < body);
    assert!(assessment.analysis.contains("\tBAD: spf=softfail\n"));
}
