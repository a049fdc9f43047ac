//! Outlook `.msg` reader: compound file → MAPI properties + attachments.

mod attachment;
mod ole;
mod property;

pub use attachment::{AssemblerState, AttachmentAssembler, Transition};
pub use ole::{is_ole, OleEntry, OleEntryType, OleReader, OLE_SIGNATURE};
pub use property::{
    decode_property, encoding_name, is_attachment_field, is_attachment_stream,
    is_property_stream, parse_stream_name, property_name, PropertyEntry, PropertyValue,
    ATTACHMENT_PREFIX, PROPERTY_STREAM_PREFIX,
};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, info, warn};

use crate::document::{DocumentBuilder, DocumentKind, NormalizedDocument};
use crate::error::Result;

pub const BODY_PROPERTY: &str = "Message body";
pub const HTML_BODY_PROPERTY: &str = "Body HTML";
pub const HEADERS_PROPERTY: &str = "Message Headers";

/// True when the data is a compound file holding at least one MAPI property stream.
pub fn is_msg(data: &[u8]) -> bool {
    if !is_ole(data) {
        return false;
    }
    let Ok(mut reader) = OleReader::new(data) else {
        return false;
    };
    while let Some(entry) = reader.next_entry() {
        if is_property_stream(entry.name()) {
            return true;
        }
    }
    false
}

/// Parse a `.msg` container. Only an unusable container header or allocation
/// table fails; individual entries that do not decode become warnings.
pub fn read_msg(data: &[u8]) -> Result<NormalizedDocument> {
    let mut reader = OleReader::new(data)?;
    let mut builder = DocumentBuilder::new(DocumentKind::Msg);
    let mut assembler = AttachmentAssembler::new();

    while let Some(entry) = reader.next_entry() {
        let name = entry.name();
        let bytes = match entry.read_data() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(entry = name, error = %e, "error reading entry");
                builder.warn(e.to_string());
                Vec::new()
            }
        };

        if assembler.feed(name, &bytes).consumed() {
            continue;
        }
        if !is_property_stream(name) {
            debug!(entry = name, path = ?entry.path(), "skipping non-property entry");
            continue;
        }
        if !entry.is_stream() {
            continue;
        }

        match decode_property(name, &bytes) {
            Ok(prop) => builder.add_property(&prop),
            Err(e) => {
                warn!(entry = name, error = %e, "error parsing property from stream");
                builder.warn(e.to_string());
            }
        }
    }

    builder.extend_attachments(assembler.finish());

    let body = match builder.property(BODY_PROPERTY) {
        Some(text) => Some(text.to_string()),
        None => builder.property(HTML_BODY_PROPERTY).map(|html| match STANDARD.decode(html) {
            Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
            Err(_) => html.to_string(),
        }),
    };
    if let Some(body) = body {
        builder.body(body);
    }

    let doc = builder.build();
    info!(
        properties = doc.properties().len(),
        unknown = doc.unknown_properties().len(),
        attachments = doc.attachments().len(),
        "msg parsing done"
    );
    Ok(doc)
}
