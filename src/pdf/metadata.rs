//! Document information dictionary (`/Info`) fields.

use encoding_rs::{UTF_16BE, UTF_8, WINDOWS_1252};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::analyzer::deobfuscate_names;
use super::scanner::PdfObject;

/// (dictionary key, reported field name)
const INFO_FIELDS: [(&str, &str); 8] = [
    ("Title", "Title"),
    ("Author", "Author"),
    ("Subject", "Subject"),
    ("Keywords", "Keywords"),
    ("Creator", "Creator"),
    ("Producer", "Producer"),
    ("CreationDate", "CreationDate"),
    ("ModDate", "Modified Date"),
];

static INFO_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Info\s+(\d+)\s+(\d+)\s+R").expect("invalid info regex"));

static INDIRECT_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+(\d+)\s+R").expect("invalid reference regex"));

/// Object number of the `/Info` dictionary named by the last trailer that has one.
pub fn info_reference<'t>(trailers: impl DoubleEndedIterator<Item = &'t str>) -> Option<u32> {
    trailers
        .rev()
        .find_map(|t| INFO_REF.captures(t).and_then(|c| c[1].parse().ok()))
}

/// Last definition of an object (incremental updates append newer versions).
fn lookup(objects: &[PdfObject], number: u32) -> Option<&PdfObject> {
    objects.iter().rev().find(|o| o.number == number && !o.broken)
}

/// Read the info dictionary fields present in object `info`.
pub fn read_info(objects: &[PdfObject], info: u32) -> Option<IndexMap<String, String>> {
    let dict = deobfuscate_names(&lookup(objects, info)?.header);
    let mut fields = IndexMap::new();
    for (key, label) in INFO_FIELDS {
        let Some(raw) = value_after_key(&dict, key).and_then(|v| resolve_string(objects, v)) else {
            continue;
        };
        let mut text = decode_text_string(&raw);
        if key.ends_with("Date") {
            text = format_date(&text);
        }
        let text = text.trim().to_string();
        if !text.is_empty() {
            fields.insert(label.to_string(), text);
        }
    }
    Some(fields)
}

/// Text following `/Key` up to the end of the dictionary.
fn value_after_key<'d>(dict: &'d str, key: &str) -> Option<&'d str> {
    let needle = format!("/{key}");
    let mut from = 0;
    while let Some(pos) = dict[from..].find(&needle) {
        let end = from + pos + needle.len();
        let next = dict[end..].chars().next();
        if next.map_or(true, |c| c.is_whitespace() || "([<".contains(c)) {
            return Some(dict[end..].trim_start());
        }
        from = end;
    }
    None
}

/// Literal or hex string at the start of `value`, following one indirect reference.
fn resolve_string(objects: &[PdfObject], value: &str) -> Option<Vec<u8>> {
    if let Some(s) = parse_string(value) {
        return Some(s);
    }
    let caps = INDIRECT_REF.captures(value)?;
    let target = lookup(objects, caps[1].parse().ok()?)?;
    parse_string(target.header.trim_start())
}

fn parse_string(value: &str) -> Option<Vec<u8>> {
    // Header text holds one char per source byte.
    let bytes: Vec<u8> = value.chars().map(|c| c as u32 as u8).collect();
    match *bytes.first()? {
        b'(' => Some(parse_literal(&bytes[1..])),
        b'<' if bytes.get(1) != Some(&b'<') => Some(parse_hex(&bytes[1..])),
        _ => None,
    }
}

fn parse_literal(b: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut depth = 1usize;
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        i += 1;
        match c {
            b'\\' => {
                let Some(&e) = b.get(i) else { break };
                i += 1;
                match e {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'0'..=b'7' => {
                        let mut v = u32::from(e - b'0');
                        for _ in 0..2 {
                            match b.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    v = v * 8 + u32::from(d - b'0');
                                    i += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push((v & 0xFF) as u8);
                    }
                    b'\r' => {
                        if b.get(i) == Some(&b'\n') {
                            i += 1;
                        }
                    }
                    b'\n' => {}
                    other => out.push(other),
                }
            }
            b'(' => {
                depth += 1;
                out.push(c);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_hex(b: &[u8]) -> Vec<u8> {
    let mut digits: Vec<u8> = b
        .iter()
        .take_while(|&&c| c != b'>')
        .filter(|c| c.is_ascii_hexdigit())
        .copied()
        .collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    hex::decode(&digits).unwrap_or_default()
}

/// UTF-16BE with BOM, UTF-8 with BOM, otherwise PDFDocEncoding (read as Windows-1252).
pub fn decode_text_string(raw: &[u8]) -> String {
    let text = if let Some(rest) = raw.strip_prefix(&[0xFE, 0xFF]) {
        UTF_16BE.decode_without_bom_handling(rest).0
    } else if let Some(rest) = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        UTF_8.decode_without_bom_handling(rest).0
    } else {
        WINDOWS_1252.decode_without_bom_handling(raw).0
    };
    text.trim_end_matches('\0').to_string()
}

/// `D:YYYYMMDDHHmmSSOHH'mm'` → `YYYY-MM-DD HH:mm:SS OHH:mm`; other text unchanged.
pub fn format_date(raw: &str) -> String {
    let s = raw.trim().strip_prefix("D:").unwrap_or(raw.trim());
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return raw.to_string();
    }
    let part = |from: usize, default: &'static str| digits.get(from..from + 2).unwrap_or(default).to_string();
    let mut out = format!(
        "{}-{}-{} {}:{}:{}",
        &digits[..4],
        part(4, "01"),
        part(6, "01"),
        part(8, "00"),
        part(10, "00"),
        part(12, "00")
    );
    let tz: String = s[digits.len()..].chars().filter(|c| *c != '\'').collect();
    match tz.chars().next() {
        Some('Z') => out.push_str(" UTC"),
        Some(sign @ ('+' | '-')) => {
            if let Some(hh) = tz.get(1..3) {
                let mm = tz.get(3..5).unwrap_or("00");
                out.push_str(&format!(" {sign}{hh}:{mm}"));
            }
        }
        _ => {}
    }
    out
}
