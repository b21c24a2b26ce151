use std::path::Path;

use serde::Serialize;

use super::tags;
use super::tiff::{self, DirectoryKind, TiffBlock};
use crate::error::{Error, Result};
use crate::jpeg;

/// The three date fields this tool reports on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureDates {
    pub date_time: Option<String>,
    pub date_time_original: Option<String>,
    pub date_time_digitized: Option<String>,
}

impl CaptureDates {
    fn from_block(block: &TiffBlock) -> Self {
        let ascii = |info: tags::TagInfo| {
            block
                .directory(info.directory)
                .and_then(|d| d.find(info.id))
                .and_then(|e| e.as_ascii())
                .map(str::to_string)
        };
        Self {
            date_time: ascii(tags::DATE_TIME),
            date_time_original: ascii(tags::DATE_TIME_ORIGINAL),
            date_time_digitized: ascii(tags::DATE_TIME_DIGITIZED),
        }
    }
}

/// Read the date fields from JPEG bytes.
///
/// A JPEG without an EXIF segment gives empty dates. Anything that is not a
/// JPEG is [`Error::UnsupportedMetadata`].
pub fn read_capture_dates(data: &[u8]) -> Result<CaptureDates> {
    if !jpeg::is_jpeg(data) {
        return Err(Error::UnsupportedMetadata("not a JPEG file".to_string()));
    }
    let layout = jpeg::scan(data)?;
    let Some(tiff_bytes) = layout.exif_segment().and_then(|s| s.exif_tiff()) else {
        log::debug!("No EXIF segment found");
        return Ok(CaptureDates::default());
    };

    let block = tiff::decode(tiff_bytes)?;
    log_block(&block);
    Ok(CaptureDates::from_block(&block))
}

/// Read the date fields from a JPEG file.
pub fn read_exif(path: &Path) -> Result<CaptureDates> {
    let data = std::fs::read(path)?;
    read_capture_dates(&data)
}

fn log_block(block: &TiffBlock) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let order = block.header.byte_order;
    for dir in block.directories.values() {
        log::debug!("{} ({} entries, {order:?})", dir.kind, dir.entries.len());
        for entry in &dir.entries {
            let value = match entry.as_ascii() {
                Some(text) => format!("{text:?}"),
                None => match entry.as_u32(order) {
                    Some(n) if entry.count == 1 => n.to_string(),
                    _ => format!("{} x {}", entry.count, entry.field_type),
                },
            };
            log::debug!("  {} = {value}", tags::display_name(dir.kind, entry.tag));
        }
        if let (DirectoryKind::Thumbnail, Some(thumb)) = (dir.kind, &dir.thumbnail) {
            log::debug!("  thumbnail: {} bytes", thumb.byte_len());
        }
    }
}
