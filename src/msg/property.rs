//! MAPI property streams: `__substg1.0_PPPPEEEE` names, payload decoding and
//! the id → name table.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use encoding_rs::{Encoding, UTF_16LE, WINDOWS_1252};
use tracing::debug;

use crate::error::{Error, Result};

pub const PROPERTY_STREAM_PREFIX: &str = "__substg1.0_";
/// Attachment-family property streams (ids 0x3700..=0x37FF).
pub const ATTACHMENT_PREFIX: &str = "__substg1.0_37";

pub const ENC_ASCII: u16 = 0x001E;
pub const ENC_UNICODE: u16 = 0x001F;
pub const ENC_BINARY: u16 = 0x0102;

/// Attachment field ids.
pub const ATTACH_DATA: u16 = 0x3701;
pub const ATTACH_EXTENSION: u16 = 0x3703;
pub const ATTACH_FILENAME: u16 = 0x3704;
pub const ATTACH_LONG_FILENAME: u16 = 0x3707;
pub const ATTACH_MIME_TAG: u16 = 0x370E;
/// Auxiliary binary fields (encoding, rendering, tag, content id blobs).
pub const ATTACH_OTHER_DATA: [u16; 4] = [0x3702, 0x3709, 0x370A, 0x371D];

/// Decoded payload of one property stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Binary(Vec<u8>),
}

/// One decoded property stream. Consumed right away by the document builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    pub id: u16,
    pub encoding_code: u16,
    pub value: PropertyValue,
}

impl PropertyEntry {
    /// Human name for the property id, `None` when not in the table.
    pub fn name(&self) -> Option<&'static str> {
        property_name(self.id)
    }

    pub fn encoding_name(&self) -> Option<&'static str> {
        encoding_name(self.encoding_code)
    }

    /// Property id as four uppercase hex digits.
    pub fn property_type(&self) -> String {
        format!("{:04X}", self.id)
    }

    pub fn encoding(&self) -> String {
        format!("{:04X}", self.encoding_code)
    }

    /// Text as-is; binary payloads as standard base64.
    pub fn text_value(&self) -> Cow<'_, str> {
        match &self.value {
            PropertyValue::Text(s) => Cow::Borrowed(s.as_str()),
            PropertyValue::Binary(b) => Cow::Owned(STANDARD.encode(b)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.value {
            PropertyValue::Text(s) => s.is_empty(),
            PropertyValue::Binary(b) => b.is_empty(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.value {
            PropertyValue::Text(s) => s.into_bytes(),
            PropertyValue::Binary(b) => b,
        }
    }

    pub fn into_text(self) -> String {
        match self.value {
            PropertyValue::Text(s) => s,
            PropertyValue::Binary(b) => STANDARD.encode(b),
        }
    }
}

#[inline]
pub fn is_property_stream(name: &str) -> bool {
    name.starts_with(PROPERTY_STREAM_PREFIX)
}

#[inline]
pub fn is_attachment_stream(name: &str) -> bool {
    name.starts_with(ATTACHMENT_PREFIX)
}

pub fn is_attachment_field(id: u16) -> bool {
    matches!(
        id,
        ATTACH_DATA | ATTACH_EXTENSION | ATTACH_FILENAME | ATTACH_LONG_FILENAME | ATTACH_MIME_TAG
    ) || ATTACH_OTHER_DATA.contains(&id)
}

/// Split a stream name into (property id, encoding id).
pub fn parse_stream_name(name: &str) -> Result<(u16, u16)> {
    let suffix = name
        .strip_prefix(PROPERTY_STREAM_PREFIX)
        .ok_or_else(|| Error::NotAPropertyStream(name.to_string()))?;
    let hex = suffix
        .get(..8)
        .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| Error::decode(name, "suffix is not 8 hex digits"))?;
    let id = u16::from_str_radix(&hex[..4], 16).map_err(|e| Error::decode(name, e.to_string()))?;
    let enc = u16::from_str_radix(&hex[4..], 16).map_err(|e| Error::decode(name, e.to_string()))?;
    Ok((id, enc))
}

/// Decode one property stream by the encoding id in its name.
pub fn decode_property(name: &str, data: &[u8]) -> Result<PropertyEntry> {
    let (id, encoding_code) = parse_stream_name(name)?;
    let value = match encoding_code {
        ENC_ASCII => PropertyValue::Text(decode_ascii(data)),
        ENC_UNICODE => PropertyValue::Text(decode_unicode(name, data)?),
        ENC_BINARY => PropertyValue::Binary(data.to_vec()),
        other => {
            match encoding_name(other) {
                Some(type_name) => debug!(property = %format!("{id:04X}"), encoding = type_name, "non-string property"),
                None => debug!(property = %format!("{id:04X}"), encoding = %format!("{other:04X}"), "unknown property encoding"),
            }
            PropertyValue::Binary(data.to_vec())
        }
    };
    Ok(PropertyEntry {
        id,
        encoding_code,
        value,
    })
}

/// 8-bit string property (Western single-byte).
pub fn decode_ascii(data: &[u8]) -> String {
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(data);
    text.trim_end_matches('\0').to_string()
}

/// UTF-16LE string property; a leading byte-order mark overrides the byte order.
pub fn decode_unicode(unit: &str, data: &[u8]) -> Result<String> {
    let (encoding, body): (&'static Encoding, &[u8]) = match Encoding::for_bom(data) {
        Some((enc, bom_len)) => (enc, &data[bom_len..]),
        None => (UTF_16LE, data),
    };
    if encoding != encoding_rs::UTF_8 && body.len() % 2 != 0 {
        return Err(Error::decode(
            unit,
            format!("odd byte count {} for UTF-16 text", body.len()),
        ));
    }
    let (text, _) = encoding.decode_without_bom_handling(body);
    Ok(text.trim_end_matches('\0').to_string())
}

/// PT_* name of an encoding id.
pub fn encoding_name(code: u16) -> Option<&'static str> {
    Some(match code {
        ENC_ASCII => "ASCII",
        ENC_UNICODE => "Unicode",
        ENC_BINARY => "Binary",
        0x0001 => "PT_NULL",
        0x0002 => "PT_SHORT",
        0x0003 => "PT_LONG",
        0x0004 => "PT_FLOAT",
        0x0005 => "PT_DOUBLE",
        0x0006 => "PT_CURRENCY",
        0x0007 => "PT_APPTIME",
        0x000A => "PT_ERROR",
        0x000B => "PT_BOOLEAN",
        0x000D => "PT_OBJECT",
        0x0014 => "PT_LONGLONG",
        0x0040 => "PT_SYSTIME",
        0x0048 => "OLEGUID",
        _ => return None,
    })
}

/// Canonical name for a property id.
pub fn property_name(id: u16) -> Option<&'static str> {
    PROPERTY_NAMES
        .binary_search_by_key(&id, |&(k, _)| k)
        .ok()
        .map(|i| PROPERTY_NAMES[i].1)
}

/// Sorted by id.
static PROPERTY_NAMES: &[(u16, &str)] = &[
    // 0x0001..0x0BFF message envelope
    (0x001A, "MessageClass"),
    (0x0037, "Subject"),
    (0x0039, "Client Submit Time"),
    (0x003A, "Report Name"),
    (0x003D, "Subject Prefix"),
    (0x0040, "Received by name"),
    (0x0042, "Sent Representing name"),
    (0x0044, "Received Representing name"),
    (0x0045, "Report Entry"),
    (0x004D, "Org Author Name"),
    (0x004F, "Reply Recipient Entries"),
    (0x0050, "Reply Recipient Names"),
    (0x005A, "Org Sender Name"),
    (0x0064, "Sent Representing Address Type"),
    (0x0065, "Sent Representing email"),
    (0x0070, "Topic"),
    (0x0075, "Received by address type"),
    (0x0076, "Received by email"),
    (0x0077, "Representing address type"),
    (0x0078, "Representing email"),
    (0x007D, "Message Headers"),
    (0x007F, "TNEF Correlation Key"),
    // 0x0C00..0x0DFF recipient
    (0x0C15, "Recipient Type"),
    (0x0C1A, "Sender name"),
    (0x0C1E, "Sender address type"),
    (0x0C1F, "Sender Email 2"),
    // 0x0E00..0x0FFF non-transmittable message
    (0x0E02, "Display BCC"),
    (0x0E03, "Display CC"),
    (0x0E04, "Display To"),
    (0x0E05, "Parent Display"),
    (0x0E06, "Message Delivery Time"),
    (0x0E07, "Message Flags"),
    (0x0E08, "Message Size"),
    (0x0E1D, "Subject Normalized"),
    (0x0E28, "Received account1"),
    (0x0E29, "Received account2"),
    // 0x1000..0x2FFF message content
    (0x1000, "Message body"),
    (0x1008, "RTF sync body tag"),
    (0x1009, "Body RTF"),
    (0x1013, "Body HTML"),
    (0x1015, "BodyContentId"),
    (0x1035, "MessageID"),
    (0x1039, "References"),
    (0x1042, "In Reply To"),
    (0x1046, "Sender Email"),
    // 0x3000..0x33FF common object
    (0x3001, "Display name"),
    (0x3002, "Address type"),
    (0x3003, "Email address"),
    (0x3007, "CreationTime"),
    (0x3008, "LastModificationTime"),
    // 0x3700..0x38FF attachment
    (0x3701, "Attachment data"),
    (0x3703, "Attachment file extension"),
    (0x3704, "Attachment Filename"),
    (0x3705, "Attachment method"),
    (0x3707, "Attachment long filename"),
    (0x370E, "Attachment MIME tag"),
    (0x3712, "Attachment ID"),
    // 0x3900..0x39FF address book
    (0x39FE, "Seven Bit Email"),
    (0x39FF, "Seven Bit Display Name"),
    // 0x3A00..0x3BFF messaging user
    (0x3A00, "Account"),
    (0x3A02, "Callback Phone number"),
    (0x3A05, "Generation"),
    (0x3A06, "Given name"),
    (0x3A08, "Business phone"),
    (0x3A09, "Home phone"),
    (0x3A0A, "Initials"),
    (0x3A0B, "Keyword"),
    (0x3A0C, "Language"),
    (0x3A0D, "Location"),
    (0x3A11, "Surname"),
    (0x3A15, "Postal address"),
    (0x3A16, "Company name"),
    (0x3A17, "Title"),
    (0x3A18, "Department"),
    (0x3A19, "Office location"),
    (0x3A1A, "Primary phone"),
    (0x3A1B, "Business phone2"),
    (0x3A1C, "Mobile phone"),
    (0x3A1D, "Radio phone number"),
    (0x3A1E, "Car phone number"),
    (0x3A1F, "Other phone"),
    (0x3A20, "Transmit display name"),
    (0x3A21, "Pager"),
    (0x3A22, "User certificate"),
    (0x3A23, "PrimaryFax"),
    (0x3A24, "BusinessFax"),
    (0x3A25, "Home Fax"),
    (0x3A26, "Country"),
    (0x3A27, "Locality"),
    (0x3A28, "State Or Province"),
    (0x3A29, "Street address"),
    (0x3A2A, "PostalCode"),
    (0x3A2B, "PostOfficeBox"),
    (0x3A2C, "Telex"),
    (0x3A2D, "ISDN"),
    (0x3A2E, "Assistant phone"),
    (0x3A2F, "Home phone 2"),
    (0x3A40, "Sender Rich Info"),
    (0x3A44, "Middle name"),
    (0x3A45, "Display name prefix"),
    (0x3A46, "Profession"),
    (0x3A48, "Spouse name"),
    (0x3A4B, "TTY TTD radio phone"),
    (0x3A4C, "FTP site"),
    (0x3A4E, "Manager name"),
    (0x3A4F, "Nickname"),
    (0x3A51, "Business homepage"),
    (0x3A57, "Company main phone"),
    (0x3A58, "Children's names"),
    (0x3A59, "Home City"),
    (0x3A5A, "Home Country"),
    (0x3A5B, "Home Postal Code"),
    (0x3A5C, "Home State Or Province"),
    (0x3A5D, "Home Street"),
    (0x3A5F, "Other address city"),
    (0x3A60, "Other address country"),
    (0x3A61, "Other address post code"),
    (0x3A62, "Other address province"),
    (0x3A63, "Other address street"),
    (0x3A64, "Other address PO Box"),
    // 0x3E00..0x3FFF status object
    (0x3FF7, "Server"),
    (0x3FF8, "Creator1"),
    (0x3FFA, "Creator2"),
    (0x3FFC, "To Email"),
    // 0x4000..0x57FF transport envelope
    (0x4022, "Creator Address Type"),
    (0x4023, "Creator Email Address"),
    (0x4024, "Last Modifier Address Type"),
    (0x4025, "Last Modifier Address"),
    (0x4030, "Sender Simple Display Name"),
    (0x4031, "Sent Representing Simple DisplayName"),
    (0x4034, "Received By Simple Display Name"),
    (0x4035, "Received By Representing Simple Display Name"),
    (0x4038, "Creator Simple Display Name"),
    (0x4039, "Last Modifier Simple Display Name"),
    (0x403D, "To address type"),
    (0x403E, "To Email2"),
    // 0x5800..0x5FFF transport recipient
    (0x5D01, "Sender SMTP Address"),
    (0x5D02, "Sent Representing SMTP email"),
    (0x5D07, "Received By SMTP Address"),
    (0x5D08, "Received By Representing SMTP Address"),
    (0x5D0A, "Creator SMTP Address"),
    (0x5D0B, "Last Modifier SMTP Address"),
    (0x5FF6, "To"),
    // 0x8000..0xFFFE named
    (0x8015, "Microsoft Information Protection (MSIP) Label"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn name_table_sorted_and_unique() {
        assert!(PROPERTY_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(PROPERTY_NAMES.len() >= 140);
    }

    #[test]
    fn resolves_known_ids() {
        assert_eq!(property_name(0x0037), Some("Subject"));
        assert_eq!(property_name(0x5D01), Some("Sender SMTP Address"));
        assert_eq!(property_name(0x8016), None);
    }

    #[test]
    fn splits_stream_name() {
        assert_eq!(parse_stream_name("__substg1.0_0C1A001F").unwrap(), (0x0C1A, 0x001F));
        assert!(matches!(
            parse_stream_name("__properties_version1.0"),
            Err(Error::NotAPropertyStream(_))
        ));
        assert!(matches!(
            parse_stream_name("__substg1.0_00ZZ"),
            Err(Error::DecodeFailure { .. })
        ));
    }

    #[test]
    fn unicode_strips_trailing_nul() {
        let mut raw = utf16("Quarterly report");
        raw.extend_from_slice(&[0, 0]);
        let p = decode_property("__substg1.0_0037001F", &raw).unwrap();
        assert_eq!(p.value, PropertyValue::Text("Quarterly report".into()));
    }

    #[test]
    fn unicode_bom_overrides_byte_order() {
        let mut raw = vec![0xFE, 0xFF];
        raw.extend("Hi".encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(decode_unicode("t", &raw).unwrap(), "Hi");
    }

    #[test]
    fn odd_unicode_length_is_decode_failure() {
        let err = decode_property("__substg1.0_0037001F", &[0x41, 0x00, 0x42]).unwrap_err();
        assert!(matches!(err, Error::DecodeFailure { .. }));
    }

    #[test]
    fn ascii_is_single_byte_western() {
        let p = decode_property("__substg1.0_0037001E", b"caf\xe9").unwrap();
        assert_eq!(p.text_value(), "café");
    }

    #[test]
    fn binary_renders_as_base64() {
        let p = decode_property("__substg1.0_10090102", b"hello").unwrap();
        assert_eq!(p.name(), Some("Body RTF"));
        assert_eq!(p.text_value(), "aGVsbG8=");
    }

    #[test]
    fn encoding_names() {
        assert_eq!(encoding_name(0x0040), Some("PT_SYSTIME"));
        assert_eq!(encoding_name(0x1234), None);
    }

    #[test]
    fn attachment_fields() {
        assert!(is_attachment_field(ATTACH_DATA));
        assert!(is_attachment_field(0x371D));
        assert!(!is_attachment_field(0x3712));
        assert!(is_attachment_stream("__substg1.0_3704001F"));
        assert!(!is_attachment_stream("__substg1.0_0037001F"));
    }
}
