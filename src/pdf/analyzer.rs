//! Active-content detection over scanned objects.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::Serialize;

use super::scanner::PdfObject;

/// Names that trigger scripts or actions when a document is opened or viewed.
pub const ACTIVE_CONTENT_MARKERS: [&str; 6] = [
    "/JavaScript",
    "/AcroForm",
    "/JS",
    "/OpenAction",
    "/Launch",
    "/AA",
];

/// A PDF name token: `/` followed by regular characters.
static NAME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/[^\s/\[\]()<>{}%]*").expect("invalid name token regex"));

/// Reverse `#xx` hex escapes: `/#4Aava#53cript` → `/JavaScript`.
///
/// The first `#` is decoded and every identical escape replaced, repeatedly,
/// until no `#` remains or the first one is not followed by two hex digits.
pub fn deobfuscate(text: &str) -> String {
    let mut out = text.to_string();
    while let Some(idx) = out.find('#') {
        let Some(digits) = out.get(idx + 1..idx + 3) else {
            break;
        };
        let Ok(decoded) = hex::decode(digits) else {
            break;
        };
        let escape = format!("#{digits}");
        let ch = char::from(decoded[0]);
        out = out.replace(&escape, ch.encode_utf8(&mut [0u8; 4]));
    }
    out
}

/// Apply [`deobfuscate`] to every name token of an object's text.
pub fn deobfuscate_names(text: &str) -> String {
    if !text.contains('#') {
        return text.to_string();
    }
    NAME_TOKEN
        .replace_all(text, |caps: &regex::Captures<'_>| deobfuscate(&caps[0]))
        .into_owned()
}

/// Occurrences of one marker across the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MarkerHits {
    pub total: usize,
    /// (object number, occurrences) in scan order.
    pub objects: Vec<(u32, usize)>,
}

/// Per-marker counts for the whole document. Markers with no hits are absent.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ActiveContent {
    pub markers: IndexMap<&'static str, MarkerHits>,
}

impl ActiveContent {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn total(&self, marker: &str) -> usize {
        self.markers.get(marker).map_or(0, |h| h.total)
    }

    /// One line per marker with a non-zero count.
    pub fn lines(&self) -> Vec<String> {
        self.markers
            .iter()
            .map(|(marker, hits)| {
                let objects: Vec<String> = hits.objects.iter().map(|(n, _)| n.to_string()).collect();
                format!(
                    "Found {} instances of active content {:?} in the file's objects (objects {}).",
                    hits.total,
                    marker,
                    objects.join(", ")
                )
            })
            .collect()
    }
}

/// Marker occurrences in one object's text, as complete name tokens.
pub fn count_markers(text: &str) -> [usize; ACTIVE_CONTENT_MARKERS.len()] {
    let clear = deobfuscate_names(text);
    let mut counts = [0usize; ACTIVE_CONTENT_MARKERS.len()];
    for token in NAME_TOKEN.find_iter(&clear) {
        if let Some(i) = ACTIVE_CONTENT_MARKERS.iter().position(|m| *m == token.as_str()) {
            counts[i] += 1;
        }
    }
    counts
}

/// Count markers over every non-broken object.
pub fn find_active_content<'o>(objects: impl IntoIterator<Item = &'o PdfObject>) -> ActiveContent {
    let mut per_marker: Vec<MarkerHits> = vec![MarkerHits::default(); ACTIVE_CONTENT_MARKERS.len()];
    for obj in objects.into_iter().filter(|o| !o.broken) {
        let counts = count_markers(&obj.header);
        for (i, &n) in counts.iter().enumerate() {
            if n > 0 {
                debug!(object = obj.number, marker = ACTIVE_CONTENT_MARKERS[i], count = n, "active content");
                per_marker[i].total += n;
                per_marker[i].objects.push((obj.number, n));
            }
        }
    }

    let markers = ACTIVE_CONTENT_MARKERS
        .iter()
        .zip(per_marker)
        .filter(|(_, hits)| hits.total > 0)
        .map(|(m, hits)| (*m, hits))
        .collect();
    ActiveContent { markers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deobfuscates_known_variants() {
        assert_eq!(deobfuscate("/#4Aava#53cript"), "/JavaScript");
        assert_eq!(deobfuscate("/J#61vaScrip#74"), "/JavaScript");
        assert_eq!(deobfuscate("/#4a#61#76#61#53#63#72#69#70#74"), "/JavaScript");
    }

    #[test]
    fn deobfuscate_is_idempotent() {
        for s in ["/#4Aava#53cript", "/A#zz", "plain", "#", "/#2341", "/Op#65nAction #1"] {
            let once = deobfuscate(s);
            assert_eq!(deobfuscate(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn stops_at_invalid_escape() {
        assert_eq!(deobfuscate("/A#zz#41"), "/A#zz#41");
        assert_eq!(deobfuscate("/A#4"), "/A#4");
    }

    #[test]
    fn names_are_decoded_independently() {
        let text = "<< /Title (Item #1) /#4F#70enAction 3 0 R >>";
        assert_eq!(deobfuscate_names(text), "<< /Title (Item #1) /OpenAction 3 0 R >>");
    }

    #[test]
    fn markers_are_whole_tokens() {
        let counts = count_markers("<< /JSON 1 /JS (x) /AA << /O 2 0 R >> /JavaScript 4 0 R >>");
        assert_eq!(counts, [1, 0, 1, 0, 0, 1]);
    }
}
