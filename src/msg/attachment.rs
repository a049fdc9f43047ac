//! Groups contiguous attachment-family streams into [`Attachment`] records.

use tracing::{debug, warn};

use super::property::{
    decode_property, is_attachment_field, is_attachment_stream, ATTACH_DATA, ATTACH_EXTENSION,
    ATTACH_FILENAME, ATTACH_LONG_FILENAME, ATTACH_MIME_TAG, ATTACH_OTHER_DATA,
};
use crate::document::Attachment;
use crate::error::Result;

/// Embedded object (attached message storage).
const PT_OBJECT: u16 = 0x000D;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssemblerState {
    #[default]
    Idle,
    InAttachment(Attachment),
}

/// What [`AttachmentAssembler::feed`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle → InAttachment; the entry started a new record.
    Opened,
    /// Stayed InAttachment; the entry was merged.
    Merged,
    /// InAttachment → Idle; the record was emitted, the entry was not consumed.
    Closed,
    /// Idle, entry unrelated to attachments.
    Passed,
}

impl Transition {
    /// True when the entry became part of an attachment.
    pub fn consumed(self) -> bool {
        matches!(self, Transition::Opened | Transition::Merged)
    }
}

#[derive(Debug, Default)]
pub struct AttachmentAssembler {
    state: AssemblerState,
    done: Vec<Attachment>,
}

impl AttachmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AssemblerState {
        &self.state
    }

    pub fn feed(&mut self, name: &str, data: &[u8]) -> Transition {
        if is_attachment_stream(name) {
            let transition = match self.state {
                AssemblerState::Idle => {
                    self.state = AssemblerState::InAttachment(Attachment::default());
                    Transition::Opened
                }
                AssemblerState::InAttachment(_) => Transition::Merged,
            };
            if let AssemblerState::InAttachment(att) = &mut self.state {
                if let Err(e) = merge_field(att, name, data) {
                    warn!(entry = name, error = %e, "error processing attachment entry");
                }
            }
            return transition;
        }

        match std::mem::take(&mut self.state) {
            AssemblerState::InAttachment(att) => {
                self.close(att);
                Transition::Closed
            }
            AssemblerState::Idle => Transition::Passed,
        }
    }

    /// End of container: emit any open record and return all of them in order.
    pub fn finish(mut self) -> Vec<Attachment> {
        if let AssemblerState::InAttachment(att) = std::mem::take(&mut self.state) {
            self.close(att);
        }
        self.done
    }

    fn close(&mut self, att: Attachment) {
        debug!(
            index = self.done.len(),
            name = att.display_name(),
            size = att.size,
            "attachment assembled"
        );
        self.done.push(att);
    }
}

fn set_text(slot: &mut String, value: String) {
    if !value.is_empty() {
        *slot = value;
    }
}

fn merge_field(att: &mut Attachment, name: &str, data: &[u8]) -> Result<()> {
    let entry = decode_property(name, data)?;
    if entry.encoding_code == PT_OBJECT {
        debug!(entry = name, "embedded object attachment");
        return Ok(());
    }
    if !is_attachment_field(entry.id) {
        debug!(entry = name, "unknown attachment entry, skipping");
        return Ok(());
    }
    match entry.id {
        ATTACH_FILENAME => set_text(&mut att.filename, entry.into_text()),
        ATTACH_LONG_FILENAME => set_text(&mut att.long_filename, entry.into_text()),
        ATTACH_MIME_TAG => set_text(&mut att.mime_tag, entry.into_text()),
        ATTACH_EXTENSION => set_text(&mut att.unicode_extension, entry.into_text()),
        ATTACH_DATA => {
            if !data.is_empty() {
                att.bytes = entry.into_bytes();
                att.size = att.bytes.len();
            }
        }
        id if ATTACH_OTHER_DATA.contains(&id) => {
            if !data.is_empty() {
                att.other_bytes = entry.into_bytes();
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn idle_passes_unrelated_entries() {
        let mut a = AttachmentAssembler::new();
        assert_eq!(a.feed("__substg1.0_0037001F", &utf16("x")), Transition::Passed);
        assert_eq!(a.state(), &AssemblerState::Idle);
        assert!(a.finish().is_empty());
    }

    #[test]
    fn open_merge_close() {
        let mut a = AttachmentAssembler::new();
        assert_eq!(a.feed("__substg1.0_3704001F", &utf16("a.txt")), Transition::Opened);
        assert_eq!(a.feed("__substg1.0_37010102", b"payload"), Transition::Merged);
        assert_eq!(a.feed("__properties_version1.0", &[]), Transition::Closed);
        assert_eq!(a.state(), &AssemblerState::Idle);
        let out = a.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].filename, "a.txt");
        assert_eq!(out[0].bytes, b"payload");
        assert_eq!(out[0].size, 7);
    }

    #[test]
    fn end_of_container_closes_open_record() {
        let mut a = AttachmentAssembler::new();
        a.feed("__substg1.0_3707001F", &utf16("long name.docx"));
        let out = a.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].display_name(), "long name.docx");
    }

    #[test]
    fn empty_value_never_overwrites() {
        let mut a = AttachmentAssembler::new();
        a.feed("__substg1.0_3704001F", &utf16("keep.pdf"));
        a.feed("__substg1.0_3704001F", &[]);
        a.feed("__substg1.0_37010102", b"%PDF");
        a.feed("__substg1.0_37010102", &[]);
        let out = a.finish();
        assert_eq!(out[0].filename, "keep.pdf");
        assert_eq!(out[0].bytes, b"%PDF");
    }

    #[test]
    fn decode_failure_keeps_record() {
        let mut a = AttachmentAssembler::new();
        a.feed("__substg1.0_3704001F", &utf16("ok.bin"));
        assert_eq!(a.feed("__substg1.0_370E001F", &[0x41]), Transition::Merged);
        let out = a.finish();
        assert_eq!(out[0].filename, "ok.bin");
        assert!(out[0].mime_tag.is_empty());
    }

    #[test]
    fn non_attachment_fields_are_ignored() {
        let mut a = AttachmentAssembler::new();
        a.feed("__substg1.0_3704001F", &utf16("logo.png"));
        assert_eq!(a.feed("__substg1.0_3712001F", &utf16("cid-1")), Transition::Merged);
        let out = a.finish();
        assert_eq!(out[0].filename, "logo.png");
        assert!(out[0].bytes.is_empty());
        assert!(out[0].other_bytes.is_empty());
    }

    #[test]
    fn separated_groups_become_separate_records() {
        let mut a = AttachmentAssembler::new();
        a.feed("__substg1.0_3704001F", &utf16("one"));
        a.feed("__attach_version1.0_#00000001", &[]);
        a.feed("__substg1.0_3704001F", &utf16("two"));
        a.feed("__substg1.0_371D0102", b"aux");
        let out = a.finish();
        let names: Vec<_> = out.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["one", "two"]);
        assert_eq!(out[1].other_bytes, b"aux");
    }
}
