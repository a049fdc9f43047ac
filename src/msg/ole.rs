//! Compound File Binary (OLE2) reader.
//!
//! Validates the header, assembles the FAT (header DIFAT slots plus the DIFAT
//! chain), the MiniFAT and the mini stream, then walks the directory tree in
//! storage order. Only structure the format itself enforces is checked.
//! See [MS-CFB].

use std::io::Cursor;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// OLE/CFB signature (DOCFILE).
pub const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Header is 512 bytes (padded to a full sector in v4 files).
const HEADER_LEN: usize = 512;

/// Special sector indices (MS-CFB).
const ENDOFCHAIN: u32 = 0xFFFFFFFE;
const FREESECT: u32 = 0xFFFFFFFF;
const FATSECT: u32 = 0xFFFFFFFD;
const DIFSECT: u32 = 0xFFFFFFFC;
/// Directory sibling/child terminator.
const NOSTREAM: u32 = 0xFFFFFFFF;

const DIR_ENTRY_LEN: usize = 128;
const HEADER_DIFAT_SLOTS: usize = 109;
const MINI_SECTOR_LEN: usize = 64;

#[inline]
fn le_u16(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

#[inline]
fn le_u32(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

#[inline]
fn le_u64(b: &[u8], off: usize) -> u64 {
    let mut v = [0u8; 8];
    v.copy_from_slice(&b[off..off + 8]);
    u64::from_le_bytes(v)
}

/// True if the data starts with the compound file signature.
#[inline]
pub fn is_ole(data: &[u8]) -> bool {
    data.len() >= OLE_SIGNATURE.len() && &data[..OLE_SIGNATURE.len()] == OLE_SIGNATURE
}

/// Directory entry type (MS-CFB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum OleEntryType {
    Empty,
    Storage,
    Stream,
    Root,
}

#[derive(Debug, Clone)]
struct Header {
    major: u16,
    sector_shift: u16,
    num_fat_sectors: u32,
    first_dir_sector: u32,
    mini_cutoff: u32,
    first_mini_fat: u32,
    num_mini_fat: u32,
    first_difat: u32,
    num_difat: u32,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self> {
        let corrupt = |why: &str| Error::ContainerCorrupt(why.to_string());
        if data.len() < HEADER_LEN {
            return Err(corrupt("shorter than the 512-byte header"));
        }
        if !is_ole(data) {
            return Err(corrupt("missing compound file signature"));
        }
        let major = le_u16(data, 26);
        if major != 3 && major != 4 {
            return Err(Error::ContainerCorrupt(format!("unsupported major version {major}")));
        }
        if le_u16(data, 28) != 0xFFFE {
            return Err(corrupt("byte order mark is not 0xFFFE"));
        }
        let sector_shift = le_u16(data, 30);
        let expected_shift = if major == 3 { 9u16 } else { 12u16 };
        if sector_shift != expected_shift {
            return Err(Error::ContainerCorrupt(format!(
                "sector shift {sector_shift} does not match version {major}"
            )));
        }
        if le_u16(data, 32) != 6 {
            return Err(corrupt("mini sector shift is not 6"));
        }
        if major == 3 && le_u32(data, 40) != 0 {
            return Err(corrupt("version 3 file declares directory sectors"));
        }
        let num_fat_sectors = le_u32(data, 44);
        if num_fat_sectors == 0 {
            return Err(corrupt("no FAT sectors declared"));
        }
        let mini_cutoff = le_u32(data, 56);
        if mini_cutoff != 0x1000 {
            return Err(Error::ContainerCorrupt(format!("mini stream cutoff {mini_cutoff:#x}")));
        }
        Ok(Self {
            major,
            sector_shift,
            num_fat_sectors,
            first_dir_sector: le_u32(data, 48),
            mini_cutoff,
            first_mini_fat: le_u32(data, 60),
            num_mini_fat: le_u32(data, 64),
            first_difat: le_u32(data, 68),
            num_difat: le_u32(data, 72),
        })
    }

    fn sector_size(&self) -> usize {
        1usize << self.sector_shift
    }
}

#[derive(Debug, Clone)]
struct DirEntry {
    name: String,
    entry_type: OleEntryType,
    left: u32,
    right: u32,
    child: u32,
    start_sector: u32,
    size: u64,
}

/// Directory entry position in storage order, with the storage path above it.
#[derive(Debug, Clone)]
struct Node {
    index: usize,
    path: Vec<String>,
}

/// Sequential reader over the named entries of a compound file.
pub struct OleReader<'a> {
    data: &'a [u8],
    header: Header,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    mini_stream: Vec<u8>,
    entries: Vec<DirEntry>,
    order: Vec<Node>,
    cursor: usize,
}

impl<'a> OleReader<'a> {
    /// Parse header, allocation tables and directory. Fails with `ContainerCorrupt`
    /// when any of them is unusable.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let mut reader = Self {
            data,
            header,
            fat: Vec::new(),
            mini_fat: Vec::new(),
            mini_stream: Vec::new(),
            entries: Vec::new(),
            order: Vec::new(),
            cursor: 0,
        };
        reader.fat = reader.load_fat()?;
        reader.entries = reader.load_directory()?;
        reader.load_mini_stream()?;
        reader.order = reader.storage_order();
        debug!(
            version = reader.header.major,
            entries = reader.order.len(),
            fat_entries = reader.fat.len(),
            "compound file opened"
        );
        Ok(reader)
    }

    /// Number of entries the walk will yield (storages and streams, root excluded).
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Next entry in storage order, or `None` at the end of the container.
    pub fn next_entry(&mut self) -> Option<OleEntry<'_, 'a>> {
        let idx = self.cursor;
        if idx >= self.order.len() {
            return None;
        }
        self.cursor += 1;
        let reader: &OleReader<'a> = self;
        Some(OleEntry {
            reader,
            node: &reader.order[idx],
        })
    }

    fn sector(&self, sec: u32) -> Option<&'a [u8]> {
        let size = self.header.sector_size();
        let start = (sec as usize).checked_add(1)?.checked_mul(size)?;
        if start >= self.data.len() {
            return None;
        }
        // A short final sector is tolerated; the stream size bounds what is used.
        let end = start.saturating_add(size).min(self.data.len());
        Some(&self.data[start..end])
    }

    fn load_fat(&self) -> Result<Vec<u32>> {
        let num_fat = self.header.num_fat_sectors as usize;
        let mut fat_sectors = Vec::<u32>::with_capacity(num_fat.min(4096));

        for slot in 0..HEADER_DIFAT_SLOTS {
            if fat_sectors.len() >= num_fat {
                break;
            }
            let sec = le_u32(self.data, 76 + slot * 4);
            match sec {
                FREESECT | ENDOFCHAIN => continue,
                FATSECT | DIFSECT => {
                    return Err(Error::ContainerCorrupt(
                        "special marker in header DIFAT".to_string(),
                    ))
                }
                _ => fat_sectors.push(sec),
            }
        }

        let per_sector = self.header.sector_size() / 4;
        let mut next = self.header.first_difat;
        // The header count is untrusted; the file's sector count also bounds the walk.
        let max_walk = (self.header.num_difat.max(1) as usize)
            .saturating_mul(2)
            .saturating_add(1)
            .min(self.data.len() / self.header.sector_size() + 1);
        let mut walked = 0usize;
        while fat_sectors.len() < num_fat && next != ENDOFCHAIN && next != FREESECT {
            walked += 1;
            if walked > max_walk {
                return Err(Error::ContainerCorrupt("DIFAT chain does not terminate".to_string()));
            }
            let s = self
                .sector(next)
                .ok_or_else(|| Error::ContainerCorrupt(format!("DIFAT sector {next} out of range")))?;
            if s.len() < per_sector * 4 {
                return Err(Error::ContainerCorrupt("truncated DIFAT sector".to_string()));
            }
            for k in 0..per_sector - 1 {
                let sec = le_u32(s, k * 4);
                if sec == FREESECT || sec == ENDOFCHAIN {
                    continue;
                }
                fat_sectors.push(sec);
                if fat_sectors.len() >= num_fat {
                    break;
                }
            }
            next = le_u32(s, (per_sector - 1) * 4);
        }

        if fat_sectors.is_empty() {
            return Err(Error::ContainerCorrupt("no FAT sectors listed in DIFAT".to_string()));
        }

        let mut fat = Vec::with_capacity(fat_sectors.len() * per_sector);
        for sec in fat_sectors {
            let s = self
                .sector(sec)
                .ok_or_else(|| Error::ContainerCorrupt(format!("FAT sector {sec} out of range")))?;
            fat.extend(s.chunks_exact(4).map(|c| le_u32(c, 0)));
        }
        Ok(fat)
    }

    /// Sector ids of a chain through `table`. Loops and out-of-table links are errors.
    fn chain(table: &[u32], start: u32) -> std::result::Result<Vec<u32>, String> {
        let mut out = Vec::new();
        let mut cur = start;
        while cur != ENDOFCHAIN {
            if cur as usize >= table.len() {
                return Err(format!("sector {cur:#x} outside allocation table"));
            }
            if out.len() >= table.len() {
                return Err("sector chain loops".to_string());
            }
            out.push(cur);
            cur = table[cur as usize];
        }
        Ok(out)
    }

    fn read_chain(&self, start: u32) -> std::result::Result<Vec<u8>, String> {
        let sectors = Self::chain(&self.fat, start)?;
        let mut out = Vec::with_capacity(sectors.len() * self.header.sector_size());
        for sec in sectors {
            let s = self
                .sector(sec)
                .ok_or_else(|| format!("sector {sec} beyond end of file"))?;
            out.extend_from_slice(s);
        }
        Ok(out)
    }

    fn load_directory(&self) -> Result<Vec<DirEntry>> {
        let first = self.header.first_dir_sector;
        if matches!(first, ENDOFCHAIN | FREESECT | FATSECT | DIFSECT) {
            return Err(Error::ContainerCorrupt("no directory sector".to_string()));
        }
        let raw = self
            .read_chain(first)
            .map_err(|e| Error::ContainerCorrupt(format!("directory chain: {e}")))?;

        let entries: Vec<DirEntry> = raw
            .chunks_exact(DIR_ENTRY_LEN)
            .map(|e| self.parse_dir_entry(e))
            .collect();

        match entries.first() {
            Some(root) if root.entry_type == OleEntryType::Root => Ok(entries),
            _ => Err(Error::ContainerCorrupt("first directory entry is not the root".to_string())),
        }
    }

    fn parse_dir_entry(&self, e: &[u8]) -> DirEntry {
        let name_len = le_u16(e, 64) as usize;
        let entry_type = match e[66] {
            1 => OleEntryType::Storage,
            2 => OleEntryType::Stream,
            5 => OleEntryType::Root,
            _ => OleEntryType::Empty,
        };
        let mut size = le_u64(e, 120);
        if self.header.major == 3 {
            // High dword is undefined in version 3 files.
            size &= 0xFFFF_FFFF;
        }
        DirEntry {
            name: decode_utf16le_name(&e[..64], name_len.min(64)),
            entry_type,
            left: le_u32(e, 68),
            right: le_u32(e, 72),
            child: le_u32(e, 76),
            start_sector: le_u32(e, 116),
            size,
        }
    }

    fn load_mini_stream(&mut self) -> Result<()> {
        if self.header.num_mini_fat == 0 || self.header.first_mini_fat == ENDOFCHAIN {
            return Ok(());
        }
        let raw = self
            .read_chain(self.header.first_mini_fat)
            .map_err(|e| Error::ContainerCorrupt(format!("MiniFAT chain: {e}")))?;
        self.mini_fat = raw.chunks_exact(4).map(|c| le_u32(c, 0)).collect();

        let root = &self.entries[0];
        let mut mini = self
            .read_chain(root.start_sector)
            .map_err(|e| Error::ContainerCorrupt(format!("mini stream chain: {e}")))?;
        mini.truncate(root.size.min(mini.len() as u64) as usize);
        self.mini_stream = mini;
        Ok(())
    }

    /// Left subtree, entry, entry's children, right subtree; root excluded, cycles broken.
    fn storage_order(&self) -> Vec<Node> {
        enum Task {
            Tree(u32, Vec<String>),
            Emit(usize, Vec<String>),
        }

        let mut order = Vec::new();
        let mut visited = vec![false; self.entries.len()];
        visited[0] = true;
        let mut stack = vec![Task::Tree(self.entries[0].child, Vec::new())];

        while let Some(task) = stack.pop() {
            match task {
                Task::Tree(id, path) => {
                    if id == NOSTREAM {
                        continue;
                    }
                    let idx = id as usize;
                    if idx >= self.entries.len() {
                        warn!(entry = id, "directory link points outside the directory");
                        continue;
                    }
                    if visited[idx] {
                        warn!(entry = id, "directory tree cycle broken");
                        continue;
                    }
                    visited[idx] = true;
                    let e = &self.entries[idx];
                    stack.push(Task::Tree(e.right, path.clone()));
                    stack.push(Task::Emit(idx, path.clone()));
                    stack.push(Task::Tree(e.left, path));
                }
                Task::Emit(idx, path) => {
                    let e = &self.entries[idx];
                    if e.entry_type == OleEntryType::Empty {
                        continue;
                    }
                    if e.entry_type == OleEntryType::Storage {
                        let mut child_path = path.clone();
                        child_path.push(e.name.clone());
                        stack.push(Task::Tree(e.child, child_path));
                    }
                    order.push(Node { index: idx, path });
                }
            }
        }
        order
    }

    fn read_entry(&self, e: &DirEntry) -> Result<Vec<u8>> {
        if e.entry_type != OleEntryType::Stream || e.size == 0 {
            return Ok(Vec::new());
        }
        let size = e.size as usize;
        let fail = |reason: String| Error::decode(e.name.clone(), reason);

        let mut out = if e.size < u64::from(self.header.mini_cutoff) {
            let sectors = Self::chain(&self.mini_fat, e.start_sector).map_err(fail)?;
            let mut out = Vec::with_capacity(sectors.len() * MINI_SECTOR_LEN);
            for sec in sectors {
                let start = sec as usize * MINI_SECTOR_LEN;
                let end = (start + MINI_SECTOR_LEN).min(self.mini_stream.len());
                if start >= end {
                    return Err(fail(format!("mini sector {sec} beyond mini stream")));
                }
                out.extend_from_slice(&self.mini_stream[start..end]);
            }
            out
        } else {
            self.read_chain(e.start_sector).map_err(fail)?
        };

        if out.len() < size {
            return Err(fail(format!("stream truncated: {} of {} bytes", out.len(), size)));
        }
        out.truncate(size);
        Ok(out)
    }
}

/// One entry yielded by [`OleReader::next_entry`].
pub struct OleEntry<'r, 'a> {
    reader: &'r OleReader<'a>,
    node: &'r Node,
}

impl<'r, 'a> OleEntry<'r, 'a> {
    fn dir(&self) -> &'r DirEntry {
        &self.reader.entries[self.node.index]
    }

    pub fn name(&self) -> &'r str {
        &self.dir().name
    }

    /// Names of the storages containing this entry (empty for root-level entries).
    pub fn path(&self) -> &'r [String] {
        &self.node.path
    }

    pub fn entry_type(&self) -> OleEntryType {
        self.dir().entry_type
    }

    pub fn is_stream(&self) -> bool {
        self.entry_type() == OleEntryType::Stream
    }

    pub fn size(&self) -> u64 {
        self.dir().size
    }

    /// Full stream content; empty for storages. A broken chain fails this entry only.
    pub fn read_data(&self) -> Result<Vec<u8>> {
        self.reader.read_entry(self.dir())
    }

    pub fn reader(&self) -> Result<Cursor<Vec<u8>>> {
        self.read_data().map(Cursor::new)
    }
}

fn decode_utf16le_name(b: &[u8], len: usize) -> String {
    let units = b[..len.min(b.len())]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0);
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
