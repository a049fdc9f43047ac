//! Threat classifier: combines parser output and header/body heuristics into
//! one verdict plus the metadata and analysis reports.

mod auth;
mod domains;
mod links;
mod mime;
mod report;

pub use auth::{AuthClause, AuthResults};
pub use domains::CommonDomains;
pub use links::{
    extract_original_url, extract_urls, host_from_url, inspect_links, is_safelink, LinkFinding,
    LinkReport,
};
pub use mime::{
    detect_mime_type, expected_mime_types, extension_mime_mismatch, EML_MIME, LATIN1_TEXT_MIME,
    MSG_MIME, OCTET_STREAM_MIME, OLE_MIME, PDF_MIME, RFC822_MIME, ZIP_MIME,
};
pub use report::{
    aligned_rows, attachment_report, human_size, key_fields, EML_KEY_FIELDS, MSG_KEY_FIELDS,
};

use mailparse::MailHeaderMap;
use tracing::{debug, info, warn};

use crate::document::{DocumentKind, NormalizedDocument};
use crate::msg::HEADERS_PROPERTY;
use crate::pdf::PdfDocument;

pub const AUTH_RESULTS_HEADER: &str = "Authentication-Results";

/// Set-only danger flag: a later stage can raise it, never clear it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    dangerous: bool,
}

impl Verdict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dangerous(&mut self) {
        self.dangerous = true;
    }

    /// Raise the flag when `signal` holds; returns `signal`.
    pub fn raise_if(&mut self, signal: bool) -> bool {
        self.dangerous |= signal;
        signal
    }

    pub fn is_dangerous(self) -> bool {
        self.dangerous
    }
}

/// Outcome of classifying one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Assessment {
    pub dangerous: bool,
    pub metadata: String,
    pub analysis: String,
}

/// Authentication-Results value of a mail document: the header itself for
/// `.eml`, or the one inside the transport headers property for `.msg`.
pub fn auth_header(doc: &NormalizedDocument) -> Option<String> {
    match doc.kind() {
        DocumentKind::Eml => doc.property(AUTH_RESULTS_HEADER).map(str::to_string),
        DocumentKind::Msg => {
            let transport = doc.property(HEADERS_PROPERTY)?;
            match mailparse::parse_headers(transport.as_bytes()) {
                Ok((headers, _)) => headers.get_first_value(AUTH_RESULTS_HEADER),
                Err(e) => {
                    warn!(error = %e, "failed to parse transport headers");
                    None
                }
            }
        }
        DocumentKind::Pdf => None,
    }
}

/// Classify a parsed `.msg`/`.eml`: key fields, attachments, authentication
/// results and body links, in that order.
pub fn assess_email(doc: &NormalizedDocument, domains: &CommonDomains) -> Assessment {
    let mut verdict = Verdict::new();
    let metadata = key_fields(doc);
    let mut analysis = String::new();

    if !doc.attachments().is_empty() {
        debug!(attachments = doc.attachments().len(), "parsing attachments");
        analysis.push_str(&attachment_report(doc.attachments()));
    }

    if let Some(header) = auth_header(doc).filter(|h| !h.trim().is_empty()) {
        let results = AuthResults::parse(&header);
        analysis.push_str("\nAuthentication results:\n");
        for line in results.lines() {
            analysis.push_str(&line);
            analysis.push('\n');
        }
        if verdict.raise_if(results.failed()) {
            info!("authentication check failed");
        }
    }

    analysis.push_str(&body_report(doc.body(), domains));

    if !doc.warnings().is_empty() {
        analysis.push_str("\nParsing warnings:\n");
        for w in doc.warnings() {
            analysis.push_str(&format!("\t{w}\n"));
        }
    }

    Assessment {
        dangerous: verdict.is_dangerous(),
        metadata,
        analysis,
    }
}

fn body_report(body: &str, domains: &CommonDomains) -> String {
    let mut out = String::from("\nBody Details:\n");
    if body.is_empty() {
        out.push_str("\tEmpty body\n");
        return out;
    }
    out.push_str("\tEmail body has content.\n");

    let links = inspect_links(body, domains);
    if links.found > 0 {
        out.push_str(&format!("\n\tFound {} URLs in the email body:\n", links.found));
        for finding in &links.findings {
            out.push_str(&finding.line());
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

/// Classify a scanned PDF. Any active-content marker makes it dangerous.
pub fn assess_pdf(doc: &PdfDocument) -> Assessment {
    let mut verdict = Verdict::new();

    let metadata = match &doc.metadata {
        Some(fields) if !fields.is_empty() => {
            aligned_rows(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        }
        _ => "No metadata found in file".to_string(),
    };

    let mut analysis = String::from("Active content in file:\n\n");
    if verdict.raise_if(doc.is_dangerous()) {
        for line in doc.active_content.lines() {
            analysis.push_str(&format!("\t{line}\n"));
        }
    } else {
        analysis.push_str("\t✅ None found\n");
    }

    analysis.push_str(&format!(
        "\nPDF version {}, {} objects ({} in object streams).\n",
        doc.version, doc.object_count, doc.compressed_objects
    ));
    if !doc.broken_objects.is_empty() {
        analysis.push_str(&format!(
            "\tSkipped {} malformed objects: {}\n",
            doc.broken_objects.len(),
            object_list(&doc.broken_objects)
        ));
    }
    if !doc.undeclared_objects.is_empty() {
        analysis.push_str(&format!(
            "\t{} objects not declared in the cross-reference table: {}\n",
            doc.undeclared_objects.len(),
            object_list(&doc.undeclared_objects)
        ));
    }

    Assessment {
        dangerous: verdict.is_dangerous(),
        metadata,
        analysis,
    }
}

fn object_list(ids: &[crate::pdf::ObjectId]) -> String {
    ids.iter()
        .map(|(n, g)| format!("{n} {g}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Verdict for an encrypted PDF: dangerous and not inspected.
pub fn assess_encrypted(path: &str) -> Assessment {
    Assessment {
        dangerous: true,
        metadata: String::new(),
        analysis: format!(
            "File {path:?} is encrypted and password protected, so cannot be inspected.\n"
        ),
    }
}

/// Verdict for a file whose content does not match its extension.
pub fn assess_mismatch(explanation: &str) -> Assessment {
    Assessment {
        dangerous: true,
        metadata: String::new(),
        analysis: format!("Mismatched extension and MIME type.\n\n{explanation}"),
    }
}
