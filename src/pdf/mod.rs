//! PDF reader: full-file object scan, encryption check, info dictionary and
//! active-content markers.

mod analyzer;
mod metadata;
mod scanner;

pub use analyzer::{
    count_markers, deobfuscate, deobfuscate_names, find_active_content, ActiveContent, MarkerHits,
    ACTIVE_CONTENT_MARKERS,
};
pub use metadata::{decode_text_string, format_date};
pub use scanner::{find_header, scan_objects, ObjectSource, PdfObject, HEADER_SEARCH_LIMIT};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};

static XREF_STREAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Type\s*/XRef\b").expect("invalid xref stream regex"));

static ENCRYPT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Encrypt[\s/<\[(0-9]").expect("invalid encrypt regex"));

/// Check if data looks like a PDF.
#[inline]
pub fn is_pdf(data: &[u8]) -> bool {
    find_header(data).is_some()
}

/// Object identity as `(number, generation)`.
pub type ObjectId = (u32, u16);

/// Everything the scan learned about one PDF.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdfDocument {
    pub version: String,
    /// Info dictionary fields; `None` when the file has no `/Info`.
    pub metadata: Option<IndexMap<String, String>>,
    /// Objects found by the scan, object stream members included.
    pub object_count: usize,
    pub compressed_objects: usize,
    pub active_content: ActiveContent,
    pub broken_objects: Vec<ObjectId>,
    /// Top-level objects missing from the classic cross-reference table.
    pub undeclared_objects: Vec<ObjectId>,
}

impl PdfDocument {
    pub fn is_dangerous(&self) -> bool {
        !self.active_content.is_empty()
    }
}

/// `/Encrypt` in any trailer or cross-reference stream dictionary.
pub fn is_encrypted(trailers: &[String], objects: &[PdfObject]) -> bool {
    let in_trailer = trailers
        .iter()
        .any(|t| ENCRYPT_KEY.is_match(&deobfuscate_names(t)));
    in_trailer
        || objects.iter().filter(|o| o.stream.is_some()).any(|o| {
            let header = deobfuscate_names(&o.header);
            XREF_STREAM.is_match(&header) && ENCRYPT_KEY.is_match(&header)
        })
}

/// Scan a PDF. Fails with `StructuralCorrupt` without a header or objects and
/// with `EncryptedDocument` when the file is encrypted.
pub fn read_pdf(data: &[u8]) -> Result<PdfDocument> {
    let (_, version) = find_header(data).ok_or_else(|| {
        Error::StructuralCorrupt(format!(
            "no %PDF- header in the first {HEADER_SEARCH_LIMIT} bytes"
        ))
    })?;

    let objects = scan_objects(data);
    let trailers = scanner::trailer_dictionaries(data);

    if is_encrypted(&trailers, &objects) {
        info!("pdf is encrypted");
        return Err(Error::EncryptedDocument);
    }
    if objects.is_empty() {
        return Err(Error::StructuralCorrupt("no objects found".to_string()));
    }

    // Cross-reference stream dictionaries double as trailers.
    let mut trailer_dicts: Vec<String> = trailers;
    trailer_dicts.extend(
        objects
            .iter()
            .filter(|o| !o.broken && XREF_STREAM.is_match(&o.header))
            .map(|o| o.header.clone()),
    );
    let metadata = metadata::info_reference(trailer_dicts.iter().map(String::as_str))
        .and_then(|n| metadata::read_info(&objects, n));

    let broken_objects: Vec<ObjectId> = objects.iter().filter(|o| o.broken).map(PdfObject::id).collect();

    let undeclared_objects = match scanner::declared_objects(data) {
        Some(declared) => objects
            .iter()
            .filter(|o| o.source == ObjectSource::Indirect && !declared.contains(&o.number))
            .map(PdfObject::id)
            .collect(),
        None => Vec::new(),
    };

    let active_content = find_active_content(&objects);
    let compressed_objects = objects
        .iter()
        .filter(|o| matches!(o.source, ObjectSource::ObjectStream { .. }))
        .count();

    debug!(
        objects = objects.len(),
        compressed = compressed_objects,
        broken = broken_objects.len(),
        undeclared = undeclared_objects.len(),
        markers = active_content.markers.len(),
        "pdf parsing done"
    );

    Ok(PdfDocument {
        version,
        metadata,
        object_count: objects.len(),
        compressed_objects,
        active_content,
        broken_objects,
        undeclared_objects,
    })
}
