//! TIFF/IFD codec for the EXIF payload of a JPEG APP1 segment.
//!
//! [`decode`] resolves every entry to its raw value bytes, whether the value
//! sits inline in the entry or behind an offset. [`encode`] lays out a fresh
//! block (header, IFD0, linked IFDs, out-of-line values, thumbnail) with
//! entries in ascending tag order, so the same directories always produce the
//! same bytes.

use std::collections::BTreeMap;
use std::fmt;

use super::tags;
use crate::error::{Error, Result};

/// Length of the TIFF header (`II`/`MM`, magic, first IFD offset).
pub const TIFF_HEADER_LEN: usize = 8;
const TIFF_MAGIC: u16 = 42;
const ENTRY_LEN: usize = 12;
const INLINE_LEN: usize = 4;

/// Byte order of every multi-byte field in a TIFF block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// `MM` (Motorola). Used for blocks created from scratch.
    #[default]
    BigEndian,
    /// `II` (Intel).
    LittleEndian,
}

impl ByteOrder {
    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match &marker {
            b"MM" => Some(Self::BigEndian),
            b"II" => Some(Self::LittleEndian),
            _ => None,
        }
    }

    pub fn marker(self) -> [u8; 2] {
        match self {
            Self::BigEndian => *b"MM",
            Self::LittleEndian => *b"II",
        }
    }

    /// Decode a `u16` from the first two bytes of `b`.
    pub fn read_u16(self, b: &[u8]) -> u16 {
        let raw = [b[0], b[1]];
        match self {
            Self::BigEndian => u16::from_be_bytes(raw),
            Self::LittleEndian => u16::from_le_bytes(raw),
        }
    }

    /// Decode a `u32` from the first four bytes of `b`.
    pub fn read_u32(self, b: &[u8]) -> u32 {
        let raw = [b[0], b[1], b[2], b[3]];
        match self {
            Self::BigEndian => u32::from_be_bytes(raw),
            Self::LittleEndian => u32::from_le_bytes(raw),
        }
    }

    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Self::BigEndian => value.to_be_bytes(),
            Self::LittleEndian => value.to_le_bytes(),
        }
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::BigEndian => value.to_be_bytes(),
            Self::LittleEndian => value.to_le_bytes(),
        }
    }
}

/// TIFF field types (TIFF 6.0 codes 1-12, plus 13 for IFD offsets).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    Ifd = 13,
}

impl FieldType {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::Byte,
            2 => Self::Ascii,
            3 => Self::Short,
            4 => Self::Long,
            5 => Self::Rational,
            6 => Self::SByte,
            7 => Self::Undefined,
            8 => Self::SShort,
            9 => Self::SLong,
            10 => Self::SRational,
            11 => Self::Float,
            12 => Self::Double,
            13 => Self::Ifd,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Size in bytes of a single value of this type.
    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::Ascii | Self::SByte | Self::Undefined => 1,
            Self::Short | Self::SShort => 2,
            Self::Long | Self::SLong | Self::Float | Self::Ifd => 4,
            Self::Rational | Self::SRational | Self::Double => 8,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Byte => "BYTE",
            Self::Ascii => "ASCII",
            Self::Short => "SHORT",
            Self::Long => "LONG",
            Self::Rational => "RATIONAL",
            Self::SByte => "SBYTE",
            Self::Undefined => "UNDEFINED",
            Self::SShort => "SSHORT",
            Self::SLong => "SLONG",
            Self::SRational => "SRATIONAL",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Ifd => "IFD",
        };
        f.write_str(name)
    }
}

/// The directories an EXIF block can hold.
///
/// The declaration order is also the order directories are laid out in by
/// [`encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectoryKind {
    Ifd0,
    Exif,
    Gps,
    Interop,
    /// IFD1, chained from IFD0's next pointer. Carries the embedded thumbnail.
    Thumbnail,
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ifd0 => "IFD0",
            Self::Exif => "Exif IFD",
            Self::Gps => "GPS IFD",
            Self::Interop => "Interop IFD",
            Self::Thumbnail => "IFD1",
        })
    }
}

/// A typed value for building a new entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Byte(Vec<u8>),
    /// Stored with a trailing NUL, which counts towards the entry count.
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    Undefined(Vec<u8>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Byte(_) => FieldType::Byte,
            Self::Ascii(_) => FieldType::Ascii,
            Self::Short(_) => FieldType::Short,
            Self::Long(_) => FieldType::Long,
            Self::Rational(_) => FieldType::Rational,
            Self::Undefined(_) => FieldType::Undefined,
            Self::SLong(_) => FieldType::SLong,
            Self::SRational(_) => FieldType::SRational,
        }
    }

    /// Serialize into an entry using `order` for multi-byte values.
    pub fn into_entry(self, tag: u16, order: ByteOrder) -> IfdEntry {
        let field_type = self.field_type();
        let data: Vec<u8> = match self {
            Self::Byte(bytes) | Self::Undefined(bytes) => bytes,
            Self::Ascii(text) => {
                let mut bytes = text.into_bytes();
                bytes.push(0);
                bytes
            }
            Self::Short(values) => values.iter().flat_map(|&v| order.u16_bytes(v)).collect(),
            Self::Long(values) => values.iter().flat_map(|&v| order.u32_bytes(v)).collect(),
            Self::Rational(values) => values
                .iter()
                .flat_map(|&(n, d)| [order.u32_bytes(n), order.u32_bytes(d)])
                .flatten()
                .collect(),
            Self::SLong(values) => values
                .iter()
                .flat_map(|&v| order.u32_bytes(v as u32))
                .collect(),
            Self::SRational(values) => values
                .iter()
                .flat_map(|&(n, d)| [order.u32_bytes(n as u32), order.u32_bytes(d as u32)])
                .flatten()
                .collect(),
        };
        let count = (data.len() / field_type.size()) as u32;
        IfdEntry {
            tag,
            field_type,
            count,
            data,
        }
    }
}

/// One directory entry with its value resolved to raw bytes.
///
/// `data` is in the byte order of the block it came from (or is headed to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: FieldType,
    pub count: u32,
    pub data: Vec<u8>,
}

impl IfdEntry {
    /// ASCII value up to the first NUL, if the entry is ASCII and valid UTF-8.
    pub fn as_ascii(&self) -> Option<&str> {
        if self.field_type != FieldType::Ascii {
            return None;
        }
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        std::str::from_utf8(&self.data[..end]).ok()
    }

    /// First value of a SHORT, LONG or IFD entry.
    pub fn as_u32(&self, order: ByteOrder) -> Option<u32> {
        match self.field_type {
            FieldType::Short if self.data.len() >= 2 => Some(order.read_u16(&self.data) as u32),
            FieldType::Long | FieldType::Ifd if self.data.len() >= 4 => {
                Some(order.read_u32(&self.data))
            }
            _ => None,
        }
    }

    /// Every value of a SHORT, LONG or IFD entry.
    pub fn as_u32_values(&self, order: ByteOrder) -> Option<Vec<u32>> {
        match self.field_type {
            FieldType::Short => Some(
                self.data
                    .chunks_exact(2)
                    .map(|b| order.read_u16(b) as u32)
                    .collect(),
            ),
            FieldType::Long | FieldType::Ifd => {
                Some(self.data.chunks_exact(4).map(|b| order.read_u32(b)).collect())
            }
            _ => None,
        }
    }
}

/// Image data referenced by offset from an IFD1 directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailData {
    /// JPEGInterchangeFormat / JPEGInterchangeFormatLength.
    Jpeg(Vec<u8>),
    /// StripOffsets / StripByteCounts, one buffer per strip.
    Strips(Vec<Vec<u8>>),
}

impl ThumbnailData {
    fn pieces(&self) -> Vec<&[u8]> {
        match self {
            Self::Jpeg(blob) => vec![blob.as_slice()],
            Self::Strips(strips) => strips.iter().map(Vec::as_slice).collect(),
        }
    }

    /// Total bytes referenced.
    pub fn byte_len(&self) -> usize {
        self.pieces().iter().map(|p| p.len()).sum()
    }

    /// Offset and length entries for this data, offsets zeroed until layout.
    fn placeholder_entries(&self, order: ByteOrder) -> Result<[IfdEntry; 2]> {
        let lengths = self
            .pieces()
            .iter()
            .map(|p| u32::try_from(p.len()).map_err(|_| Error::ExifTooLarge(p.len())))
            .collect::<Result<Vec<u32>>>()?;
        let (offset_tag, length_tag) = match self {
            Self::Jpeg(_) => (
                tags::JPEG_INTERCHANGE_FORMAT.id,
                tags::JPEG_INTERCHANGE_FORMAT_LENGTH.id,
            ),
            Self::Strips(_) => (tags::STRIP_OFFSETS.id, tags::STRIP_BYTE_COUNTS.id),
        };
        Ok([
            FieldValue::Long(vec![0; lengths.len()]).into_entry(offset_tag, order),
            FieldValue::Long(lengths).into_entry(length_tag, order),
        ])
    }
}

/// An image file directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdDirectory {
    pub kind: DirectoryKind,
    pub entries: Vec<IfdEntry>,
    /// Next-IFD pointer as read from the source. Ignored by [`encode`], which
    /// recomputes the chain.
    pub next_ifd_offset: Option<u32>,
    /// Thumbnail image data referenced by an IFD1 directory.
    pub thumbnail: Option<ThumbnailData>,
}

impl IfdDirectory {
    pub fn new(kind: DirectoryKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            next_ifd_offset: None,
            thumbnail: None,
        }
    }

    pub fn find(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Insert `entry`, discarding any existing entry with the same tag.
    pub fn set_entry(&mut self, entry: IfdEntry) {
        self.remove_entry(entry.tag);
        self.entries.push(entry);
    }

    /// Remove the entry for `tag`, if there is one.
    pub fn remove_entry(&mut self, tag: u16) -> Option<IfdEntry> {
        let index = self.entries.iter().position(|e| e.tag == tag)?;
        Some(self.entries.remove(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub first_ifd_offset: u32,
}

/// A decoded TIFF block: its header and every reachable directory, keyed by
/// the offset it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffBlock {
    pub header: TiffHeader,
    pub directories: BTreeMap<u32, IfdDirectory>,
}

impl TiffBlock {
    pub fn directory(&self, kind: DirectoryKind) -> Option<&IfdDirectory> {
        self.directories.values().find(|d| d.kind == kind)
    }
}

fn malformed(message: String) -> Error {
    Error::MalformedTiff(message)
}

/// Decode a TIFF block.
///
/// Follows IFD0, the Exif/GPS pointers in IFD0, the Interop pointer in the
/// Exif IFD and IFD0's next pointer to IFD1. A directory offset reached twice
/// is read once.
pub fn decode(data: &[u8]) -> Result<TiffBlock> {
    if data.len() < TIFF_HEADER_LEN {
        return Err(malformed(format!(
            "{} bytes is too short for a TIFF header",
            data.len()
        )));
    }

    let order = ByteOrder::from_marker([data[0], data[1]]).ok_or_else(|| {
        malformed(format!(
            "unknown byte-order marker {:02X} {:02X}",
            data[0], data[1]
        ))
    })?;

    let magic = order.read_u16(&data[2..4]);
    if magic != TIFF_MAGIC {
        return Err(malformed(format!("magic number is {magic}, not 42")));
    }

    let header = TiffHeader {
        byte_order: order,
        first_ifd_offset: order.read_u32(&data[4..8]),
    };

    let mut directories = BTreeMap::new();
    let mut pending = vec![(header.first_ifd_offset, DirectoryKind::Ifd0)];

    while let Some((offset, kind)) = pending.pop() {
        if offset == 0 {
            continue;
        }
        if directories.contains_key(&offset) {
            log::warn!("{kind} at offset {offset} was already read, ignoring the second reference");
            continue;
        }

        let dir = read_directory(data, order, offset, kind)?;

        for &(pointer, child) in tags::child_pointers(kind) {
            if let Some(target) = dir.find(pointer).and_then(|e| e.as_u32(order)) {
                pending.push((target, child));
            }
        }
        match (kind, dir.next_ifd_offset) {
            (DirectoryKind::Ifd0, Some(next)) => pending.push((next, DirectoryKind::Thumbnail)),
            (DirectoryKind::Thumbnail, Some(next)) => {
                log::debug!("Ignoring IFD chained after IFD1 at offset {next}");
            }
            _ => {}
        }

        log::trace!("Read {kind} at offset {offset} with {} entries", dir.entries.len());
        directories.insert(offset, dir);
    }

    Ok(TiffBlock {
        header,
        directories,
    })
}

fn read_directory(
    data: &[u8],
    order: ByteOrder,
    offset: u32,
    kind: DirectoryKind,
) -> Result<IfdDirectory> {
    let start = offset as usize;
    let count_bytes = data.get(start..start.saturating_add(2)).ok_or_else(|| {
        malformed(format!(
            "{kind} offset {offset} lies outside the {}-byte block",
            data.len()
        ))
    })?;
    let count = order.read_u16(count_bytes) as usize;

    let entries_start = start + 2;
    let entries_end = entries_start + count * ENTRY_LEN;
    if entries_end > data.len() {
        return Err(malformed(format!(
            "{kind} at offset {offset} declares {count} entries, which reads past the end of the {}-byte block",
            data.len()
        )));
    }

    let mut entries: Vec<IfdEntry> = Vec::with_capacity(count);
    for raw in data[entries_start..entries_end].chunks_exact(ENTRY_LEN) {
        let tag = order.read_u16(&raw[0..2]);
        let code = order.read_u16(&raw[2..4]);
        let value_count = order.read_u32(&raw[4..8]);

        let Some(field_type) = FieldType::from_code(code) else {
            log::warn!("Dropping tag {tag:#06x} in {kind}: unknown field type {code}");
            continue;
        };
        if entries.iter().any(|e| e.tag == tag) {
            log::warn!("Dropping duplicate tag {tag:#06x} in {kind}");
            continue;
        }

        let len = field_type.size() as u64 * value_count as u64;
        let value = if len <= INLINE_LEN as u64 {
            raw[8..8 + len as usize].to_vec()
        } else {
            let value_offset = order.read_u32(&raw[8..12]) as u64;
            let value_end = value_offset + len;
            if value_end > data.len() as u64 {
                return Err(malformed(format!(
                    "tag {tag:#06x} in {kind} points at {value_offset}..{value_end}, outside the {}-byte block",
                    data.len()
                )));
            }
            data[value_offset as usize..value_end as usize].to_vec()
        };

        entries.push(IfdEntry {
            tag,
            field_type,
            count: value_count,
            data: value,
        });
    }

    // Some writers drop the trailing next pointer on the last directory.
    let next_ifd_offset = data
        .get(entries_end..entries_end + 4)
        .map(|b| order.read_u32(b))
        .filter(|&next| next != 0);

    let mut dir = IfdDirectory {
        kind,
        entries,
        next_ifd_offset,
        thumbnail: None,
    };
    if kind == DirectoryKind::Thumbnail {
        dir.thumbnail = read_jpeg_thumbnail(data, order, &dir)
            .map(ThumbnailData::Jpeg)
            .or_else(|| read_strips(data, order, &dir).map(ThumbnailData::Strips));
        if dir.thumbnail.is_none() {
            // Offsets into data we did not keep would dangle after relocation.
            dir.entries.retain(|e| !tags::is_structural(kind, e.tag));
        }
    }
    Ok(dir)
}

fn thumbnail_bytes(data: &[u8], start: u32, len: u32) -> Option<Vec<u8>> {
    let (start, len) = (start as usize, len as usize);
    let bytes = data.get(start..start.saturating_add(len)).map(<[u8]>::to_vec);
    if bytes.is_none() {
        log::warn!(
            "Thumbnail data at {start}..{} lies outside the EXIF block, dropping it",
            start.saturating_add(len)
        );
    }
    bytes
}

fn read_jpeg_thumbnail(data: &[u8], order: ByteOrder, dir: &IfdDirectory) -> Option<Vec<u8>> {
    let start = dir.find(tags::JPEG_INTERCHANGE_FORMAT.id)?.as_u32(order)?;
    let len = dir
        .find(tags::JPEG_INTERCHANGE_FORMAT_LENGTH.id)?
        .as_u32(order)?;
    thumbnail_bytes(data, start, len)
}

fn read_strips(data: &[u8], order: ByteOrder, dir: &IfdDirectory) -> Option<Vec<Vec<u8>>> {
    let offsets = dir.find(tags::STRIP_OFFSETS.id)?.as_u32_values(order)?;
    let counts = dir.find(tags::STRIP_BYTE_COUNTS.id)?.as_u32_values(order)?;
    if offsets.is_empty() || offsets.len() != counts.len() {
        log::warn!(
            "IFD1 has {} strip offsets and {} strip byte counts, dropping the strips",
            offsets.len(),
            counts.len()
        );
        return None;
    }
    offsets
        .iter()
        .zip(&counts)
        .map(|(&start, &len)| thumbnail_bytes(data, start, len))
        .collect()
}

fn word_align(offset: usize) -> usize {
    offset + (offset & 1)
}

/// Encode `directories` into a fresh TIFF block.
///
/// IFD0 is always written. The Exif IFD is written whenever it or the Interop
/// IFD is present, since Interop is only reachable through it. Pointer tags
/// and the thumbnail offsets and lengths are regenerated from the layout.
///
/// Out-of-line values move to new offsets. A MakerNote that stores absolute
/// offsets into the block will no longer resolve after encoding.
pub fn encode(
    directories: &BTreeMap<DirectoryKind, IfdDirectory>,
    order: ByteOrder,
) -> Result<Vec<u8>> {
    use DirectoryKind::{Exif, Gps, Ifd0, Interop, Thumbnail};

    let present = |kind| directories.contains_key(&kind);
    let mut kinds = vec![Ifd0];
    if present(Exif) || present(Interop) {
        kinds.push(Exif);
    }
    kinds.extend([Gps, Interop, Thumbnail].into_iter().filter(|&k| present(k)));

    let thumbnail = directories
        .get(&Thumbnail)
        .and_then(|d| d.thumbnail.as_ref());

    // Entry lists with placeholders for every structural tag.
    let mut layout: Vec<(DirectoryKind, Vec<IfdEntry>)> = Vec::with_capacity(kinds.len());
    for &kind in &kinds {
        let mut entries: Vec<IfdEntry> = directories
            .get(&kind)
            .map(|d| {
                d.entries
                    .iter()
                    .filter(|e| !tags::is_structural(kind, e.tag))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for &(pointer, child) in tags::child_pointers(kind) {
            if kinds.contains(&child) {
                entries.push(FieldValue::Long(vec![0]).into_entry(pointer, order));
            }
        }
        if let (Thumbnail, Some(data)) = (kind, thumbnail) {
            entries.extend(data.placeholder_entries(order)?);
        }

        if entries.len() > u16::MAX as usize {
            return Err(malformed(format!(
                "{kind} has {} entries, more than a directory can hold",
                entries.len()
            )));
        }
        entries.sort_by_key(|e| e.tag);
        layout.push((kind, entries));
    }

    // Directory offsets depend only on entry counts.
    let mut cursor = TIFF_HEADER_LEN;
    let mut dir_offsets: BTreeMap<DirectoryKind, usize> = BTreeMap::new();
    for (kind, entries) in &layout {
        dir_offsets.insert(*kind, cursor);
        cursor += 2 + entries.len() * ENTRY_LEN + 4;
    }

    // Out-of-line values follow all directories, each on a word boundary.
    let mut value_offsets: Vec<Vec<usize>> = Vec::with_capacity(layout.len());
    for (_, entries) in &layout {
        let mut offsets = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.data.len() > INLINE_LEN {
                cursor = word_align(cursor);
                offsets.push(cursor);
                cursor += entry.data.len();
            } else {
                offsets.push(0);
            }
        }
        value_offsets.push(offsets);
    }
    // Thumbnail pieces go last, back to back.
    let thumbnail_pieces = thumbnail.map(ThumbnailData::pieces).unwrap_or_default();
    if !thumbnail_pieces.is_empty() {
        cursor = word_align(cursor);
    }
    let thumbnail_offsets: Vec<usize> = thumbnail_pieces
        .iter()
        .map(|piece| {
            let at = cursor;
            cursor += piece.len();
            at
        })
        .collect();

    let total = cursor;
    if u32::try_from(total).is_err() {
        return Err(Error::ExifTooLarge(total));
    }

    // Offsets are now known; fill in the placeholders.
    for (kind, entries) in &mut layout {
        for entry in entries.iter_mut() {
            let child = tags::child_pointers(*kind)
                .iter()
                .find(|&&(pointer, _)| pointer == entry.tag)
                .and_then(|(_, child)| dir_offsets.get(child).copied());
            let targets = match child {
                Some(offset) => vec![offset],
                None if *kind == Thumbnail
                    && (entry.tag == tags::JPEG_INTERCHANGE_FORMAT.id
                        || entry.tag == tags::STRIP_OFFSETS.id) =>
                {
                    thumbnail_offsets.clone()
                }
                None => continue,
            };
            entry.data = targets
                .iter()
                .flat_map(|&t| order.u32_bytes(t as u32))
                .collect();
        }
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&order.marker());
    out.extend_from_slice(&order.u16_bytes(TIFF_MAGIC));
    out.extend_from_slice(&order.u32_bytes(TIFF_HEADER_LEN as u32));

    for ((kind, entries), offsets) in layout.iter().zip(&value_offsets) {
        debug_assert_eq!(out.len(), dir_offsets[kind]);
        out.extend_from_slice(&order.u16_bytes(entries.len() as u16));
        for (entry, &value_offset) in entries.iter().zip(offsets) {
            out.extend_from_slice(&order.u16_bytes(entry.tag));
            out.extend_from_slice(&order.u16_bytes(entry.field_type.code()));
            out.extend_from_slice(&order.u32_bytes(entry.count));
            if entry.data.len() > INLINE_LEN {
                out.extend_from_slice(&order.u32_bytes(value_offset as u32));
            } else {
                let mut inline = [0u8; INLINE_LEN];
                inline[..entry.data.len()].copy_from_slice(&entry.data);
                out.extend_from_slice(&inline);
            }
        }
        let next = match kind {
            Ifd0 => dir_offsets.get(&Thumbnail).copied().unwrap_or(0),
            _ => 0,
        };
        out.extend_from_slice(&order.u32_bytes(next as u32));
    }

    for ((_, entries), offsets) in layout.iter().zip(&value_offsets) {
        for (entry, &value_offset) in entries.iter().zip(offsets) {
            if entry.data.len() > INLINE_LEN {
                out.resize(value_offset, 0);
                out.extend_from_slice(&entry.data);
            }
        }
    }
    for (piece, &at) in thumbnail_pieces.iter().zip(&thumbnail_offsets) {
        out.resize(at, 0);
        out.extend_from_slice(piece);
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// IFD0 { Make (offset), Orientation (inline), ExifIFD pointer }
    /// Exif { DateTimeOriginal (offset) }
    fn sample_block(order: ByteOrder) -> Vec<u8> {
        let u16b = |v: u16| order.u16_bytes(v);
        let u32b = |v: u32| order.u32_bytes(v);
        let mut b = Vec::new();
        b.extend_from_slice(&order.marker());
        b.extend_from_slice(&u16b(42));
        b.extend_from_slice(&u32b(8));

        // IFD0 at 8, three entries, ends at 50
        b.extend_from_slice(&u16b(3));
        b.extend_from_slice(&u16b(0x010F));
        b.extend_from_slice(&u16b(2));
        b.extend_from_slice(&u32b(6));
        b.extend_from_slice(&u32b(68));
        b.extend_from_slice(&u16b(0x0112));
        b.extend_from_slice(&u16b(3));
        b.extend_from_slice(&u32b(1));
        b.extend_from_slice(&u16b(6));
        b.extend_from_slice(&[0, 0]);
        b.extend_from_slice(&u16b(0x8769));
        b.extend_from_slice(&u16b(4));
        b.extend_from_slice(&u32b(1));
        b.extend_from_slice(&u32b(50));
        b.extend_from_slice(&u32b(0));
        assert_eq!(b.len(), 50);

        // Exif IFD at 50, one entry, ends at 68
        b.extend_from_slice(&u16b(1));
        b.extend_from_slice(&u16b(0x9003));
        b.extend_from_slice(&u16b(2));
        b.extend_from_slice(&u32b(20));
        b.extend_from_slice(&u32b(74));
        b.extend_from_slice(&u32b(0));
        assert_eq!(b.len(), 68);

        b.extend_from_slice(b"Canon\0");
        b.extend_from_slice(b"2019:05:04 10:11:12\0");
        b
    }

    /// IFD0 (empty) -> IFD1 { StripOffsets, StripByteCounts }, two 2-byte
    /// strips at 44
    fn strip_thumbnail_block(order: ByteOrder) -> Vec<u8> {
        let u16b = |v: u16| order.u16_bytes(v);
        let u32b = |v: u32| order.u32_bytes(v);
        let mut b = Vec::new();
        b.extend_from_slice(&order.marker());
        b.extend_from_slice(&u16b(42));
        b.extend_from_slice(&u32b(8));

        b.extend_from_slice(&u16b(0));
        b.extend_from_slice(&u32b(14));

        // IFD1 at 14, ends at 44
        b.extend_from_slice(&u16b(2));
        b.extend_from_slice(&u16b(0x0111));
        b.extend_from_slice(&u16b(3));
        b.extend_from_slice(&u32b(2));
        b.extend_from_slice(&u16b(44));
        b.extend_from_slice(&u16b(46));
        b.extend_from_slice(&u16b(0x0117));
        b.extend_from_slice(&u16b(3));
        b.extend_from_slice(&u32b(2));
        b.extend_from_slice(&u16b(2));
        b.extend_from_slice(&u16b(2));
        b.extend_from_slice(&u32b(0));
        assert_eq!(b.len(), 44);

        b.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        b
    }

    fn by_kind(block: TiffBlock) -> BTreeMap<DirectoryKind, IfdDirectory> {
        block
            .directories
            .into_values()
            .map(|d| (d.kind, d))
            .collect()
    }

    // ── decode ───────────────────────────────────────────────────────

    #[test]
    fn decode_resolves_inline_and_offset_values() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let block = decode(&sample_block(order)).unwrap();
            assert_eq!(block.header.byte_order, order);
            assert_eq!(block.header.first_ifd_offset, 8);
            assert_eq!(block.directories.len(), 2);

            let ifd0 = block.directory(DirectoryKind::Ifd0).unwrap();
            assert_eq!(ifd0.find(0x010F).unwrap().as_ascii(), Some("Canon"));
            assert_eq!(ifd0.find(0x0112).unwrap().as_u32(order), Some(6));

            let exif = &block.directories[&50];
            assert_eq!(exif.kind, DirectoryKind::Exif);
            assert_eq!(
                exif.find(0x9003).unwrap().as_ascii(),
                Some("2019:05:04 10:11:12")
            );
        }
    }

    #[test]
    fn decode_rejects_unknown_byte_order() {
        let mut data = sample_block(ByteOrder::BigEndian);
        data[0] = b'X';
        data[1] = b'X';
        assert!(matches!(decode(&data), Err(Error::MalformedTiff(_))));
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut data = sample_block(ByteOrder::BigEndian);
        data[3] = 43;
        assert!(matches!(decode(&data), Err(Error::MalformedTiff(_))));
    }

    #[test]
    fn decode_rejects_short_header() {
        assert!(matches!(decode(b"MM\0*"), Err(Error::MalformedTiff(_))));
    }

    #[test]
    fn decode_rejects_entry_count_past_end() {
        let mut data = sample_block(ByteOrder::BigEndian);
        // IFD0 claims 200 entries
        data[8..10].copy_from_slice(&200u16.to_be_bytes());
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, Error::MalformedTiff(ref m) if m.contains("200 entries")));
    }

    #[test]
    fn decode_rejects_value_offset_outside_block() {
        let mut data = sample_block(ByteOrder::LittleEndian);
        // Make value offset lives at 8 + 2 + 8
        data[18..22].copy_from_slice(&5000u32.to_le_bytes());
        assert!(matches!(decode(&data), Err(Error::MalformedTiff(_))));
    }

    #[test]
    fn decode_rejects_directory_offset_outside_block() {
        let mut data = sample_block(ByteOrder::BigEndian);
        data[4..8].copy_from_slice(&9999u32.to_be_bytes());
        assert!(matches!(decode(&data), Err(Error::MalformedTiff(_))));
    }

    #[test]
    fn decode_drops_entries_with_unknown_type() {
        let mut data = sample_block(ByteOrder::BigEndian);
        // Orientation entry type field at 8 + 2 + 12 + 2
        data[24..26].copy_from_slice(&99u16.to_be_bytes());
        let block = decode(&data).unwrap();
        let ifd0 = block.directory(DirectoryKind::Ifd0).unwrap();
        assert!(ifd0.find(0x0112).is_none());
        assert!(ifd0.find(0x010F).is_some());
    }

    // ── encode ───────────────────────────────────────────────────────

    #[test]
    fn encode_round_trips_logical_entries() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let source = by_kind(decode(&sample_block(order)).unwrap());
            let encoded = encode(&source, order).unwrap();
            let again = by_kind(decode(&encoded).unwrap());

            for kind in [DirectoryKind::Ifd0, DirectoryKind::Exif] {
                let strip = |d: &IfdDirectory| -> Vec<IfdEntry> {
                    d.entries
                        .iter()
                        .filter(|e| !tags::is_structural(kind, e.tag))
                        .cloned()
                        .collect()
                };
                assert_eq!(strip(&source[&kind]), strip(&again[&kind]));
            }
        }
    }

    #[test]
    fn encode_writes_entries_in_ascending_tag_order() {
        let order = ByteOrder::LittleEndian;
        let mut exif = IfdDirectory::new(DirectoryKind::Exif);
        exif.set_entry(FieldValue::Ascii("2021:01:20 17:00:00".into()).into_entry(0x9004, order));
        exif.set_entry(FieldValue::Short(vec![1]).into_entry(0xA001, order));
        exif.set_entry(FieldValue::Ascii("2021:01:20 17:00:00".into()).into_entry(0x9003, order));
        let mut dirs = BTreeMap::new();
        dirs.insert(DirectoryKind::Exif, exif);

        let encoded = encode(&dirs, order).unwrap();
        let block = decode(&encoded).unwrap();
        let tags: Vec<u16> = block
            .directory(DirectoryKind::Exif)
            .unwrap()
            .entries
            .iter()
            .map(|e| e.tag)
            .collect();
        assert_eq!(tags, vec![0x9003, 0x9004, 0xA001]);
    }

    #[test]
    fn encode_is_deterministic() {
        let dirs = by_kind(decode(&sample_block(ByteOrder::BigEndian)).unwrap());
        let a = encode(&dirs, ByteOrder::BigEndian).unwrap();
        let b = encode(&dirs, ByteOrder::BigEndian).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encode_places_values_on_even_offsets() {
        let order = ByteOrder::BigEndian;
        let mut ifd0 = IfdDirectory::new(DirectoryKind::Ifd0);
        ifd0.set_entry(FieldValue::Ascii("odd".into()).into_entry(0x010F, order));
        // nine bytes with the NUL, so the next value needs padding
        ifd0.set_entry(FieldValue::Ascii("Model XY".into()).into_entry(0x0110, order));
        ifd0.set_entry(FieldValue::Ascii("Editor 1".into()).into_entry(0x0131, order));
        let mut dirs = BTreeMap::new();
        dirs.insert(DirectoryKind::Ifd0, ifd0);

        let encoded = encode(&dirs, order).unwrap();
        let block = decode(&encoded).unwrap();
        let ifd0 = block.directory(DirectoryKind::Ifd0).unwrap();
        assert_eq!(ifd0.find(0x010F).unwrap().as_ascii(), Some("odd"));
        assert_eq!(ifd0.find(0x0110).unwrap().as_ascii(), Some("Model XY"));
        assert_eq!(ifd0.find(0x0131).unwrap().as_ascii(), Some("Editor 1"));

        // Software's value follows Model's odd-length value
        let entry_offset = 8 + 2 + ENTRY_LEN * 2 + 8;
        let value_offset = order.read_u32(&encoded[entry_offset..]) as usize;
        assert_eq!(value_offset, 60);
    }

    #[test]
    fn encode_creates_exif_for_interop_only_sets() {
        let order = ByteOrder::BigEndian;
        let mut interop = IfdDirectory::new(DirectoryKind::Interop);
        interop.set_entry(FieldValue::Ascii("R98".into()).into_entry(0x0001, order));
        let mut dirs = BTreeMap::new();
        dirs.insert(DirectoryKind::Interop, interop);

        let block = decode(&encode(&dirs, order).unwrap()).unwrap();
        assert!(block.directory(DirectoryKind::Exif).is_some());
        let interop = block.directory(DirectoryKind::Interop).unwrap();
        assert_eq!(interop.find(0x0001).unwrap().as_ascii(), Some("R98"));
    }

    #[test]
    fn encode_relocates_thumbnail() {
        let order = ByteOrder::LittleEndian;
        let jpeg_thumb = vec![0xFF, 0xD8, 1, 2, 3, 4, 5, 0xFF, 0xD9];

        let mut thumb = IfdDirectory::new(DirectoryKind::Thumbnail);
        thumb.set_entry(FieldValue::Short(vec![6]).into_entry(0x0103, order));
        thumb.thumbnail = Some(ThumbnailData::Jpeg(jpeg_thumb.clone()));
        let mut dirs = BTreeMap::new();
        dirs.insert(DirectoryKind::Ifd0, IfdDirectory::new(DirectoryKind::Ifd0));
        dirs.insert(DirectoryKind::Thumbnail, thumb);

        let encoded = encode(&dirs, order).unwrap();
        let block = decode(&encoded).unwrap();
        let ifd0 = block.directory(DirectoryKind::Ifd0).unwrap();
        assert!(ifd0.next_ifd_offset.is_some());

        let thumb = block.directory(DirectoryKind::Thumbnail).unwrap();
        assert_eq!(thumb.thumbnail, Some(ThumbnailData::Jpeg(jpeg_thumb.clone())));
        assert_eq!(
            thumb.find(0x0202).unwrap().as_u32(order),
            Some(jpeg_thumb.len() as u32)
        );
    }

    #[test]
    fn encode_relocates_strip_thumbnail() {
        let order = ByteOrder::BigEndian;
        let strips = ThumbnailData::Strips(vec![vec![0xAA, 0xBB], vec![0xCC, 0xDD]]);
        let mut dirs = by_kind(decode(&strip_thumbnail_block(order)).unwrap());
        assert_eq!(dirs[&DirectoryKind::Thumbnail].thumbnail, Some(strips.clone()));

        // An Exif IFD in front pushes IFD1 and its strips further back
        let mut exif = IfdDirectory::new(DirectoryKind::Exif);
        exif.set_entry(FieldValue::Ascii("2021:01:20 17:00:00".into()).into_entry(0x9003, order));
        dirs.insert(DirectoryKind::Exif, exif);

        let encoded = encode(&dirs, order).unwrap();
        let block = decode(&encoded).unwrap();
        let thumb = block.directory(DirectoryKind::Thumbnail).unwrap();
        assert_eq!(thumb.thumbnail, Some(strips));

        let offsets = thumb.find(0x0111).unwrap().as_u32_values(order).unwrap();
        assert_eq!(offsets.len(), 2);
        assert_ne!(offsets[0], 44);
        assert_eq!(&encoded[offsets[0] as usize..][..2], &[0xAA, 0xBB]);
        assert_eq!(&encoded[offsets[1] as usize..][..2], &[0xCC, 0xDD]);
        assert_eq!(
            thumb.find(0x0117).unwrap().as_u32_values(order),
            Some(vec![2, 2])
        );
    }

    #[test]
    fn decode_drops_strip_tags_pointing_outside_block() {
        let order = ByteOrder::LittleEndian;
        let mut data = strip_thumbnail_block(order);
        // first strip offset, inline in the StripOffsets entry
        data[24..26].copy_from_slice(&order.u16_bytes(900));

        let block = decode(&data).unwrap();
        let thumb = block.directory(DirectoryKind::Thumbnail).unwrap();
        assert_eq!(thumb.thumbnail, None);
        assert!(thumb.find(0x0111).is_none());
        assert!(thumb.find(0x0117).is_none());
    }

    #[test]
    fn encode_without_directories_writes_empty_ifd0() {
        let encoded = encode(&BTreeMap::new(), ByteOrder::BigEndian).unwrap();
        assert_eq!(&encoded[..4], b"MM\0*");
        let block = decode(&encoded).unwrap();
        assert!(block.directory(DirectoryKind::Ifd0).unwrap().entries.is_empty());
    }

    // ── entries ──────────────────────────────────────────────────────

    #[test]
    fn set_entry_replaces_existing_tag() {
        let order = ByteOrder::BigEndian;
        let mut dir = IfdDirectory::new(DirectoryKind::Exif);
        dir.set_entry(FieldValue::Ascii("old value".into()).into_entry(0x9003, order));
        dir.set_entry(FieldValue::Ascii("new".into()).into_entry(0x9003, order));
        assert_eq!(dir.entries.len(), 1);
        assert_eq!(dir.find(0x9003).unwrap().as_ascii(), Some("new"));
        assert_eq!(dir.find(0x9003).unwrap().count, 4);
    }

    #[test]
    fn field_values_serialize_in_byte_order() {
        let be = FieldValue::Rational(vec![(1, 2)]).into_entry(0x011A, ByteOrder::BigEndian);
        assert_eq!(be.data, vec![0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(be.count, 1);
        let le = FieldValue::Short(vec![1, 2]).into_entry(0x0112, ByteOrder::LittleEndian);
        assert_eq!(le.data, vec![1, 0, 2, 0]);
        assert_eq!(le.count, 2);
    }
}
