use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::output::OutputSet;
use crate::error::{Error, Result};
use crate::jpeg::{self, APP1, EXIF_SIGNATURE, JpegLayout};
use crate::timestamp::ExifDateTime;

/// Largest value the APP1 length field can hold. The field counts itself and
/// the signature as well as the TIFF block.
const MAX_SEGMENT_LEN: usize = u16::MAX as usize;

/// Offset right after SOI, where a new EXIF segment goes.
const AFTER_SOI: usize = 2;

/// Result of rewriting one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// The source already carried an EXIF segment, which was replaced.
    pub replaced_existing: bool,
    pub bytes_written: usize,
}

/// Wrap a TIFF block as a complete APP1 segment, marker included.
pub fn build_exif_segment(tiff: &[u8]) -> Result<Vec<u8>> {
    let length = 2 + EXIF_SIGNATURE.len() + tiff.len();
    if length > MAX_SEGMENT_LEN {
        return Err(Error::ExifTooLarge(length));
    }
    let mut segment = Vec::with_capacity(2 + length);
    segment.extend_from_slice(&APP1.to_be_bytes());
    segment.extend_from_slice(&(length as u16).to_be_bytes());
    segment.extend_from_slice(EXIF_SIGNATURE);
    segment.extend_from_slice(tiff);
    Ok(segment)
}

/// Rebuild `original` with its EXIF segment replaced by `output`.
///
/// Every byte outside the EXIF segment is copied unchanged. A source without
/// EXIF gets the new segment right after SOI.
pub fn rewrite(original: &[u8], output: &OutputSet) -> Result<Vec<u8>> {
    let layout = jpeg::scan(original)?;
    splice(original, &layout, output)
}

fn splice(original: &[u8], layout: &JpegLayout<'_>, output: &OutputSet) -> Result<Vec<u8>> {
    let segment = build_exif_segment(&output.encode()?)?;
    let (start, end) = match layout.exif_segment() {
        Some(existing) => (existing.offset, existing.end()),
        None => (AFTER_SOI, AFTER_SOI),
    };

    let mut out = Vec::with_capacity(original.len() - (end - start) + segment.len());
    out.extend_from_slice(&original[..start]);
    out.extend_from_slice(&segment);
    out.extend_from_slice(&original[end..]);
    Ok(out)
}

/// Stamp `when` into DateTimeOriginal and DateTimeDigitized of a JPEG held in
/// memory, keeping every other tag.
pub fn restamp(original: &[u8], when: &ExifDateTime) -> Result<Vec<u8>> {
    restamp_inner(original, when).map(|(bytes, _)| bytes)
}

fn restamp_inner(original: &[u8], when: &ExifDateTime) -> Result<(Vec<u8>, bool)> {
    if !jpeg::is_jpeg(original) {
        return Err(Error::UnsupportedMetadata("not a JPEG file".to_string()));
    }
    let layout = jpeg::scan(original)?;
    let source_tiff = layout.exif_segment().and_then(|s| s.exif_tiff());

    let mut output = OutputSet::from_source_exif(source_tiff)?;
    output.set_capture_time(when)?;
    Ok((splice(original, &layout, &output)?, source_tiff.is_some()))
}

/// Write `bytes` to `dest` through a temporary file in the same directory.
///
/// `dest` only appears once the data has been synced to disk. On failure the
/// temporary file is removed and `dest` is left as it was.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Read `src`, stamp `when` and write the result to `dest`.
pub fn restamp_file(src: &Path, dest: &Path, when: &ExifDateTime) -> Result<WriteResult> {
    let original = std::fs::read(src)?;
    let (bytes, replaced_existing) = restamp_inner(&original, when)?;
    write_atomic(dest, &bytes)?;
    log::debug!(
        "Wrote {} bytes to {} ({} EXIF segment)",
        bytes.len(),
        dest.display(),
        if replaced_existing { "replaced" } else { "new" }
    );
    Ok(WriteResult {
        replaced_existing,
        bytes_written: bytes.len(),
    })
}
