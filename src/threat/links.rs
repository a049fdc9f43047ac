//! Link extraction, safelink unwrapping and host normalization.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::domains::CommonDomains;
use crate::error::{Error, Result};

const SAFELINK_MARKER: &str = "safelinks.protection.outlook.com/?url=";

/// Scheme-qualified URLs only (no bare `example.com`).
static STRICT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|ftp://|file://|mailto:|tel:)[^\s<>"'`{}|\\^\[\]]+"#)
        .expect("invalid url regex")
});

/// Host prefixes removed before the allow-list lookup, applied in order.
const HOST_PREFIXES: [&str; 5] = ["www.", "en.", "m.", "mobile.", "uk."];

/// Every scheme-qualified URL in `text`, with trailing sentence punctuation removed.
pub fn extract_urls(text: &str) -> Vec<String> {
    STRICT_URL
        .find_iter(text)
        .map(|m| trim_trailing_punctuation(m.as_str()).to_string())
        .collect()
}

fn trim_trailing_punctuation(url: &str) -> &str {
    let mut out = url.trim_end_matches(|c: char| ".,;:!?".contains(c));
    // Closing paren belongs to the surrounding text unless the URL opened one.
    while out.ends_with(')') && out.matches('(').count() < out.matches(')').count() {
        out = out[..out.len() - 1].trim_end_matches(|c: char| ".,;:!?".contains(c));
    }
    out
}

/// Outlook safelink wrapper (regional host, `?url=` parameter).
pub fn is_safelink(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("https://") && lower.contains(SAFELINK_MARKER)
}

/// Target of a safelink: the unescaped value of its `url` query parameter.
pub fn extract_original_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::decode(url, e.to_string()))?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::decode(url, "safelink has no url parameter"))
}

/// Lowercase host with common prefixes (`www.`, `en.`, `m.`, `mobile.`, `uk.`) removed.
pub fn host_from_url(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(u) => u.host_str().unwrap_or_default().to_ascii_lowercase(),
        Err(_) => {
            let lower = url.to_ascii_lowercase();
            let rest = lower.split_once("://").map_or(lower.as_str(), |(_, r)| r);
            rest.split(['/', '?', '#', ':']).next().unwrap_or_default().to_string()
        }
    };
    let mut host = host.as_str();
    for prefix in HOST_PREFIXES {
        host = host.strip_prefix(prefix).unwrap_or(host);
    }
    host.to_string()
}

/// Verdict on one link found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LinkFinding {
    Safelink { original: String, common: bool },
    BrokenSafelink { url: String, reason: String },
    Direct { url: String, common: bool },
}

impl LinkFinding {
    pub fn is_uncommon(&self) -> bool {
        matches!(
            self,
            LinkFinding::Safelink { common: false, .. } | LinkFinding::Direct { common: false, .. }
        )
    }

    pub fn line(&self) -> String {
        match self {
            LinkFinding::Safelink { original, common: true } => {
                format!("\t\tSafelink redirects to common domain {original:?}")
            }
            LinkFinding::Safelink { original, common: false } => {
                format!("\t\tSafelink redirects to *uncommon* domain {original:?}")
            }
            LinkFinding::BrokenSafelink { reason, .. } => format!("\t\tError extracting URL: {reason}"),
            LinkFinding::Direct { url, common: true } => format!("\t\tURL from common domain: {url:?}"),
            LinkFinding::Direct { url, common: false } => {
                format!("\t\tURL from *uncommon* domain: {url:?}")
            }
        }
    }
}

/// All links in a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LinkReport {
    /// Raw URL matches, skipped ones included.
    pub found: usize,
    pub findings: Vec<LinkFinding>,
}

impl LinkReport {
    pub fn uncommon(&self) -> impl Iterator<Item = &LinkFinding> {
        self.findings.iter().filter(|f| f.is_uncommon())
    }
}

/// Classify every link in `body` against the allow-list.
pub fn inspect_links(body: &str, domains: &CommonDomains) -> LinkReport {
    let urls = extract_urls(body);
    debug!(links = urls.len(), known_domains = domains.len(), "inspecting links");

    let findings = urls
        .iter()
        .filter(|u| {
            let lower = u.to_ascii_lowercase();
            !(lower.starts_with("mailto:") || lower.starts_with("tel:") || u.trim().is_empty())
        })
        .map(|u| {
            if is_safelink(u) {
                match extract_original_url(u) {
                    Ok(original) => LinkFinding::Safelink {
                        common: domains.is_common_url(&original),
                        original,
                    },
                    Err(e) => LinkFinding::BrokenSafelink {
                        url: u.clone(),
                        reason: e.to_string(),
                    },
                }
            } else {
                LinkFinding::Direct {
                    common: domains.is_common_url(u),
                    url: u.clone(),
                }
            }
        })
        .collect();

    LinkReport {
        found: urls.len(),
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_safelink() {
        let u = "https://eu01.safelinks.protection.outlook.com/?url=https%3A%2F%2Fexample.com";
        assert!(is_safelink(u));
        assert_eq!(extract_original_url(u).unwrap(), "https://example.com");
    }

    #[test]
    fn safelink_target_stops_at_next_parameter() {
        let u = "https://nam02.safelinks.protection.outlook.com/?url=https%3A%2F%2Fevil.test%2Fa%3Fb%3D1&data=05%7C01&reserved=0";
        assert_eq!(extract_original_url(u).unwrap(), "https://evil.test/a?b=1");
    }

    #[test]
    fn plain_urls_are_not_safelinks() {
        assert!(!is_safelink("https://example.com/?url=https://x"));
        assert!(!is_safelink("http://eu01.safelinks.protection.outlook.com/?url=x"));
    }

    #[test]
    fn strict_extraction() {
        let urls = extract_urls(
            "See https://www.example.com/a. Or (http://test.org/x) and mailto:a@b.c, not example.net",
        );
        assert_eq!(urls, ["https://www.example.com/a", "http://test.org/x", "mailto:a@b.c"]);
    }

    #[test]
    fn host_prefixes_stripped() {
        assert_eq!(host_from_url("https://www.Example.com/path"), "example.com");
        assert_eq!(host_from_url("https://en.m.wikipedia.org/wiki"), "wikipedia.org");
        assert_eq!(host_from_url("http://uk.news.test:8080/"), "news.test");
    }

    #[test]
    fn classifies_against_allow_list() {
        let domains = CommonDomains::from_list("example.com\n");
        let body = "Go to https://example.com/login and https://phish.test/x or tel:+123";
        let report = inspect_links(body, &domains);
        assert_eq!(report.found, 3);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.uncommon().count(), 1);
        assert_eq!(report.findings[1].line(), "\t\tURL from *uncommon* domain: \"https://phish.test/x\"");
    }
}
