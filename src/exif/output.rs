//! The set of directories that will be written back into an image.
//!
//! An [`OutputSet`] starts as a copy of the source EXIF block (or empty), is
//! edited in memory and is then handed to the rewriter, which encodes it once.

use std::collections::BTreeMap;

use super::tags;
use super::tiff::{self, ByteOrder, DirectoryKind, FieldValue, IfdDirectory, TiffBlock};
use crate::error::{Error, Result};
use crate::timestamp::ExifDateTime;

/// Directories staged for encoding, keyed by kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputSet {
    byte_order: ByteOrder,
    directories: BTreeMap<DirectoryKind, IfdDirectory>,
}

impl OutputSet {
    /// An empty set. Nothing but an empty IFD0 would be encoded from it.
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            directories: BTreeMap::new(),
        }
    }

    /// Build from the TIFF bytes of a source EXIF segment, or an empty
    /// big-endian set when the source has none.
    pub fn from_source_exif(tiff_bytes: Option<&[u8]>) -> Result<Self> {
        match tiff_bytes {
            Some(bytes) => Ok(Self::from_block(tiff::decode(bytes)?)),
            None => Ok(Self::default()),
        }
    }

    /// Copy every decoded entry. Pointer tags and the thumbnail offsets and
    /// lengths are dropped here and regenerated by the encoder.
    pub fn from_block(block: TiffBlock) -> Self {
        let byte_order = block.header.byte_order;
        let directories = block
            .directories
            .into_values()
            .map(|mut dir| {
                let kind = dir.kind;
                dir.entries.retain(|e| !tags::is_structural(kind, e.tag));
                dir.next_ifd_offset = None;
                (kind, dir)
            })
            .collect();
        Self {
            byte_order,
            directories,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn directory(&self, kind: DirectoryKind) -> Option<&IfdDirectory> {
        self.directories.get(&kind)
    }

    pub fn get_or_create_directory(&mut self, kind: DirectoryKind) -> &mut IfdDirectory {
        self.directories
            .entry(kind)
            .or_insert_with(|| IfdDirectory::new(kind))
    }

    /// Replace `tag` in directory `kind` with `value`.
    ///
    /// Tags the registry knows for that directory must be given one of their
    /// declared types. Pointer tags belong to the encoder and are refused.
    pub fn set_field(&mut self, kind: DirectoryKind, tag: u16, value: FieldValue) -> Result<()> {
        if tags::is_structural(kind, tag) {
            return Err(Error::UnsupportedMetadata(format!(
                "{} in {kind} is generated when the block is encoded",
                tags::display_name(kind, tag)
            )));
        }
        if let Some(info) = tags::lookup_in(kind, tag) {
            let found = value.field_type();
            if !info.accepts(found) {
                let expected = info
                    .types
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" or ");
                return Err(Error::FieldTypeMismatch {
                    tag,
                    expected,
                    found,
                });
            }
        }

        let entry = value.into_entry(tag, self.byte_order);
        self.get_or_create_directory(kind).set_entry(entry);
        Ok(())
    }

    pub fn remove_field(&mut self, kind: DirectoryKind, tag: u16) {
        if let Some(dir) = self.directories.get_mut(&kind) {
            dir.remove_entry(tag);
        }
    }

    /// Stamp `when` into DateTimeOriginal and DateTimeDigitized. IFD0's
    /// DateTime is left alone.
    pub fn set_capture_time(&mut self, when: &ExifDateTime) -> Result<()> {
        for info in [tags::DATE_TIME_ORIGINAL, tags::DATE_TIME_DIGITIZED] {
            self.set_field(
                info.directory,
                info.id,
                FieldValue::Ascii(when.as_str().to_string()),
            )?;
        }
        Ok(())
    }

    /// Encode into a TIFF block in the set's byte order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        tiff::encode(&self.directories, self.byte_order)
    }
}
