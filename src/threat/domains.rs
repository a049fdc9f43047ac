//! Common-domain allow-list.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;

use super::links::host_from_url;
use crate::error::Result;

static BUNDLED: Lazy<CommonDomains> =
    Lazy::new(|| CommonDomains::from_list(include_str!("../../data/common-domains.txt")));

/// Hostnames treated as well known. Read-only once built, so one instance is
/// shared by every analysis in the process.
#[derive(Debug, Clone, Default)]
pub struct CommonDomains {
    hosts: HashSet<String>,
}

impl CommonDomains {
    /// The list shipped with the crate, parsed on first use.
    pub fn bundled() -> &'static CommonDomains {
        &BUNDLED
    }

    /// One hostname per line; blank lines and `#` comments ignored.
    pub fn from_list(list: &str) -> Self {
        let hosts = list
            .lines()
            .map(|l| l.split('#').next().unwrap_or_default().trim())
            .filter(|l| !l.is_empty())
            .map(host_from_url)
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let list = std::fs::read_to_string(path)?;
        Ok(Self::from_list(&list))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// `host` or any of its parent domains is listed.
    pub fn contains_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let mut candidate = host.as_str();
        loop {
            if self.hosts.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return false,
            }
        }
    }

    pub fn is_common_url(&self, url: &str) -> bool {
        self.contains_host(&host_from_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_domains_match() {
        let d = CommonDomains::from_list("# comment\nexample.com\n\nwww.github.com # inline\n");
        assert_eq!(d.len(), 2);
        assert!(d.contains_host("example.com"));
        assert!(d.contains_host("mail.example.com"));
        assert!(d.contains_host("github.com"));
        assert!(!d.contains_host("example.com.evil.test"));
        assert!(!d.contains_host("com"));
    }

    #[test]
    fn urls_use_normalized_host() {
        let d = CommonDomains::from_list("wikipedia.org");
        assert!(d.is_common_url("https://en.m.wikipedia.org/wiki/Rust"));
        assert!(!d.is_common_url("https://wikipedia.org.phish.test/"));
    }

    #[test]
    fn bundled_list_loads() {
        let d = CommonDomains::bundled();
        assert!(!d.is_empty());
        assert!(d.contains_host("google.com"));
        assert!(d.contains_host("microsoft.com"));
    }

    #[test]
    fn bundled_list_covers_everyday_links() {
        let d = CommonDomains::bundled();
        assert!(d.len() > 1000);
        for url in [
            "https://www.paypal.com/signin",
            "https://docs.rs/regex",
            "https://www.gov.uk/government/news",
            "https://login.microsoftonline.com/common",
            "https://www.booking.com/hotel",
        ] {
            assert!(d.is_common_url(url), "{url}");
        }
        assert!(!d.is_common_url("https://invoice-portal.herokuapp.com/"));
        assert!(!d.is_common_url("https://bit.ly/3xYz"));
    }
}
