//! Sequential object scan of a PDF file.
//!
//! The whole file is searched for `N G obj` headers; the declared
//! cross-reference table is only consulted afterwards, to report objects it
//! does not list. Compressed object streams are expanded and their members
//! scanned as ordinary objects.

use std::collections::BTreeSet;
use std::io::Read;

use flate2::read::ZlibDecoder;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::{debug, warn};

/// Search window for the `%PDF-` header.
pub const HEADER_SEARCH_LIMIT: usize = 1024;
/// Upper bound on bytes inflated from a single object stream.
const MAX_OBJSTM_BYTES: u64 = 32 * 1024 * 1024;
const MAX_OBJSTM_MEMBERS: usize = 100_000;

static OBJ_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)\b(\d{1,10})[ \t\r\n\x0C\x00]+(\d{1,5})[ \t\r\n\x0C\x00]+obj\b")
        .expect("invalid object header regex")
});

static DIRECT_LENGTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)/Length\s+(\d+)(\s+\d+\s+R)?").expect("invalid length regex")
});

static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)%PDF-(\d+\.\d+)").expect("invalid version regex"));

/// Where an object's text was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ObjectSource {
    /// Top level of the file.
    Indirect,
    /// Member of a compressed object stream.
    ObjectStream { container: u32 },
}

/// One object found by the scan.
#[derive(Debug, Clone)]
pub struct PdfObject {
    pub number: u32,
    pub generation: u16,
    /// Byte offset of the `N G obj` header (of the container for stream members).
    pub offset: usize,
    /// Object text preceding any stream payload, one char per byte.
    pub header: String,
    /// Raw stream payload range in the file.
    pub stream: Option<std::ops::Range<usize>>,
    /// No terminator, or unbalanced dictionary delimiters.
    pub broken: bool,
    pub source: ObjectSource,
}

impl PdfObject {
    pub fn id(&self) -> (u32, u16) {
        (self.number, self.generation)
    }
}

/// Offset and version of the `%PDF-x.y` header, if within the search window.
pub fn find_header(data: &[u8]) -> Option<(usize, String)> {
    let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
    let caps = VERSION.captures(window)?;
    let whole = caps.get(0)?;
    let version = String::from_utf8_lossy(caps.get(1)?.as_bytes()).into_owned();
    Some((whole.start(), version))
}

pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// `keyword` at `at` as a whole token.
fn keyword_at(data: &[u8], at: usize, keyword: &[u8]) -> bool {
    data[at..].starts_with(keyword)
        && (at == 0 || !is_regular(data[at - 1]))
        && data.get(at + keyword.len()).map_or(true, |&b| !is_regular(b))
}

/// Walks object text at the token level: literal strings, hex strings,
/// comments and names are stepped over, `<<`/`>>` are counted.
struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    underflow: bool,
}

impl<'a> Lexer<'a> {
    fn new(data: &'a [u8], from: usize) -> Self {
        Self {
            data,
            pos: from,
            depth: 0,
            underflow: false,
        }
    }

    fn balanced(&self) -> bool {
        self.depth == 0 && !self.underflow
    }

    /// Offset of the next byte outside strings, comments, names and
    /// dictionary delimiters.
    fn next_code(&mut self) -> Option<usize> {
        let data = self.data;
        while self.pos < data.len() {
            let i = self.pos;
            let next = data.get(i + 1).copied();
            match data[i] {
                b'(' => self.pos = skip_literal(data, i),
                b'%' => {
                    let eol = data[i..].iter().position(|&b| b == b'\r' || b == b'\n');
                    self.pos = eol.map_or(data.len(), |p| i + p + 1);
                }
                b'/' => {
                    let len = data[i + 1..].iter().take_while(|&&b| is_regular(b)).count();
                    self.pos = i + 1 + len;
                }
                b'<' if next == Some(b'<') => {
                    self.depth += 1;
                    self.pos = i + 2;
                }
                b'<' => {
                    let close = data[i..].iter().position(|&b| b == b'>');
                    self.pos = close.map_or(data.len(), |p| i + p + 1);
                }
                b'>' if next == Some(b'>') => {
                    match self.depth.checked_sub(1) {
                        Some(d) => self.depth = d,
                        None => self.underflow = true,
                    }
                    self.pos = i + 2;
                }
                _ => {
                    self.pos = i + 1;
                    return Some(i);
                }
            }
        }
        None
    }
}

/// End of the literal string opening at `open`, with nested parentheses and
/// backslash escapes.
fn skip_literal(data: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    data.len()
}

fn balanced_dictionary(text: &[u8]) -> bool {
    let mut lexer = Lexer::new(text, 0);
    while lexer.next_code().is_some() {}
    lexer.balanced()
}

/// What ends an object's dictionary part.
enum Stop {
    EndObj(usize),
    Stream(usize),
    NextHeader(usize),
}

/// First terminator outside strings and comments, with the dictionary balance
/// up to it.
fn find_stop(data: &[u8], body_start: usize) -> (Option<Stop>, bool) {
    let mut lexer = Lexer::new(data, body_start);
    let mut candidate = OBJ_HEADER.find_at(data, body_start).map(|m| m.start());
    while let Some(i) = lexer.next_code() {
        // a header match that began inside a string or comment does not count
        if candidate.is_some_and(|c| c < i) {
            candidate = OBJ_HEADER.find_at(data, i).map(|m| m.start());
        }
        if candidate == Some(i) {
            return (Some(Stop::NextHeader(i)), lexer.balanced());
        }
        if keyword_at(data, i, b"endobj") {
            return (Some(Stop::EndObj(i)), lexer.balanced());
        }
        if keyword_at(data, i, b"stream") && matches!(data.get(i + 6), Some(b'\r') | Some(b'\n')) {
            return (Some(Stop::Stream(i)), lexer.balanced());
        }
    }
    (None, lexer.balanced())
}

/// Scan every top-level object in file order, then expand object streams.
pub fn scan_objects(data: &[u8]) -> Vec<PdfObject> {
    let mut objects = Vec::new();
    let mut pos = 0usize;

    while let Some(caps) = OBJ_HEADER.captures_at(data, pos) {
        let (Some(whole), Some(num), Some(gen)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            break;
        };
        let number = parse_int::<u32>(num.as_bytes());
        let generation = parse_int::<u16>(gen.as_bytes());
        let (Some(number), Some(generation)) = (number, generation) else {
            pos = whole.end();
            continue;
        };

        let body_start = whole.end();
        let (object, next) = scan_body(data, number, generation, whole.start(), body_start);
        if object.broken {
            warn!(object = number, generation, offset = whole.start(), "broken object skipped");
        }
        objects.push(object);
        pos = next.max(body_start);
    }

    let expanded = expand_object_streams(data, &objects);
    debug!(objects = objects.len(), expanded = expanded.len(), "pdf object scan done");
    objects.extend(expanded);
    objects
}

fn parse_int<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Object extent starting right after its header. Returns the object and the
/// position to continue scanning from.
fn scan_body(
    data: &[u8],
    number: u32,
    generation: u16,
    offset: usize,
    body_start: usize,
) -> (PdfObject, usize) {
    let broken = |header: &[u8]| PdfObject {
        number,
        generation,
        offset,
        header: latin1(header),
        stream: None,
        broken: true,
        source: ObjectSource::Indirect,
    };

    let (stop, balanced) = find_stop(data, body_start);
    let kw = match stop {
        Some(Stop::EndObj(end)) => {
            let mut obj = broken(&data[body_start..end]);
            obj.broken = !balanced;
            return (obj, end + b"endobj".len());
        }
        // Another object header before our terminator means ours has none.
        Some(Stop::NextHeader(next)) => return (broken(&data[body_start..next]), next),
        None => {
            let next = OBJ_HEADER.find_at(data, body_start).map_or(data.len(), |m| m.start());
            return (broken(&data[body_start..next]), body_start);
        }
        Some(Stop::Stream(kw)) => kw,
    };

    let header = &data[body_start..kw];
    let mut payload_start = kw + b"stream".len();
    if data.get(payload_start) == Some(&b'\r') {
        payload_start += 1;
    }
    if data.get(payload_start) == Some(&b'\n') {
        payload_start += 1;
    }

    let by_length = DIRECT_LENGTH
        .captures(header)
        .filter(|c| c.get(2).is_none())
        .and_then(|c| parse_int::<usize>(c.get(1)?.as_bytes()))
        .and_then(|len| payload_start.checked_add(len))
        .filter(|&end| {
            end <= data.len() && {
                let rest = &data[end..];
                let skip = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
                rest[skip..].starts_with(b"endstream")
            }
        });
    let stream_end = by_length.or_else(|| find_bytes(data, b"endstream", payload_start));

    let Some(stream_end) = stream_end else {
        return (broken(header), body_start);
    };
    let after_stream = find_bytes(data, b"endstream", stream_end).unwrap_or(stream_end) + b"endstream".len();
    let Some(end) = find_bytes(data, b"endobj", after_stream) else {
        let mut obj = broken(header);
        obj.stream = Some(payload_start..stream_end);
        return (obj, after_stream);
    };

    let object = PdfObject {
        number,
        generation,
        offset,
        header: latin1(header),
        stream: Some(payload_start..stream_end),
        broken: !balanced,
        source: ObjectSource::Indirect,
    };
    (object, end + b"endobj".len())
}

static OBJSTM_TYPE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"/Type\s*/ObjStm\b").expect("invalid ObjStm regex"));

static INT_KEY: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"/(N|First)\s+(\d+)").expect("invalid int key regex"));

fn dict_int(header: &str, key: &str) -> Option<usize> {
    INT_KEY
        .captures_iter(header)
        .find(|c| &c[1] == key)
        .and_then(|c| c[2].parse().ok())
}

fn inflate(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(raw).take(MAX_OBJSTM_BYTES).read_to_end(&mut out)?;
    Ok(out)
}

/// Decode `/Type /ObjStm` containers and return their members as objects.
fn expand_object_streams(data: &[u8], objects: &[PdfObject]) -> Vec<PdfObject> {
    let mut out = Vec::new();
    for container in objects.iter().filter(|o| !o.broken) {
        let Some(range) = container.stream.clone() else {
            continue;
        };
        let header = super::analyzer::deobfuscate_names(&container.header);
        if !OBJSTM_TYPE.is_match(&header) {
            continue;
        }
        let (Some(n), Some(first)) = (dict_int(&header, "N"), dict_int(&header, "First")) else {
            warn!(object = container.number, "object stream without /N or /First");
            continue;
        };

        let raw = &data[range];
        let decoded = if header.contains("/FlateDecode") || header.contains("/Fl ") {
            match inflate(raw) {
                Ok(d) => d,
                Err(e) => {
                    warn!(object = container.number, error = %e, "object stream failed to inflate");
                    continue;
                }
            }
        } else if header.contains("/Filter") {
            debug!(object = container.number, "object stream uses an unsupported filter");
            continue;
        } else {
            raw.to_vec()
        };
        if decoded.len() <= first {
            continue;
        }

        let index = latin1(&decoded[..first]);
        let nums: Vec<usize> = index
            .split_ascii_whitespace()
            .map_while(|t| t.parse().ok())
            .take(n.min(MAX_OBJSTM_MEMBERS) * 2)
            .collect();

        let pairs: Vec<(usize, usize)> = nums.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        for (i, &(number, rel)) in pairs.iter().enumerate() {
            let Ok(number) = u32::try_from(number) else {
                continue;
            };
            if number == container.number {
                warn!(object = number, "object stream contains itself");
                continue;
            }
            let start = first.saturating_add(rel);
            let end = pairs
                .get(i + 1)
                .map(|&(_, next)| first.saturating_add(next))
                .unwrap_or(decoded.len())
                .min(decoded.len());
            if start >= end {
                continue;
            }
            let text = latin1(&decoded[start..end]);
            out.push(PdfObject {
                number,
                generation: 0,
                offset: container.offset,
                broken: !balanced_dictionary(text.as_bytes()),
                header: text,
                stream: None,
                source: ObjectSource::ObjectStream {
                    container: container.number,
                },
            });
        }
    }
    out
}

/// Object numbers marked in use (`n`) by classic `xref` tables, or `None`
/// when the file has no classic table.
pub fn declared_objects(data: &[u8]) -> Option<BTreeSet<u32>> {
    static XREF: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?-u)(?:^|[\r\n])xref[ \t]*[\r\n]").expect("invalid xref regex"));

    let mut declared = BTreeSet::new();
    let mut found = false;
    for m in XREF.find_iter(data) {
        found = true;
        let section_end = find_bytes(data, b"trailer", m.end()).unwrap_or(data.len());
        let text = latin1(&data[m.end()..section_end]);
        let mut tokens = text.split_ascii_whitespace();
        loop {
            let (Some(start), Some(count)) = (tokens.next(), tokens.next()) else {
                break;
            };
            let (Ok(start), Ok(count)) = (start.parse::<u32>(), count.parse::<u32>()) else {
                break;
            };
            for i in 0..count {
                let (Some(_off), Some(_gen), Some(kind)) = (tokens.next(), tokens.next(), tokens.next())
                else {
                    break;
                };
                if kind == "n" {
                    declared.insert(start.saturating_add(i));
                }
            }
        }
    }
    found.then_some(declared)
}

/// Dictionary text of every `trailer << ... >>` in file order.
pub fn trailer_dictionaries(data: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut at = 0;
    while let Some(pos) = find_bytes(data, b"trailer", at) {
        at = pos + b"trailer".len();
        if let Some(dict) = dictionary_at(data, at) {
            out.push(latin1(dict));
        }
    }
    out
}

/// Balanced `<< ... >>` starting at the first `<<` after `from` (whitespace only in between).
fn dictionary_at(data: &[u8], from: usize) -> Option<&[u8]> {
    let skip = data.get(from..)?.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let start = from + skip;
    if !data.get(start..)?.starts_with(b"<<") {
        return None;
    }
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < data.len() {
        match &data[i..i + 2] {
            b"<<" => {
                depth += 1;
                i += 2;
            }
            b">>" => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(&data[start..i]);
                }
            }
            _ => i += 1,
        }
    }
    None
}
