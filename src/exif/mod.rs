//! EXIF metadata: tag registry, TIFF codec, editing and lossless rewriting.
//!
//! - [`read_exif`] / [`read_capture_dates`] report the date fields of a JPEG
//! - [`restamp`] / [`restamp_file`] stamp a capture time, keeping every other tag
//!
//! Lower-level pieces are public for callers that need to edit other tags:
//! [`OutputSet`] stages directories, [`rewrite`] splices them into a JPEG.

mod output;
mod reader;
pub mod tags;
pub mod tiff;
mod writer;

pub use output::OutputSet;
pub use reader::{CaptureDates, read_capture_dates, read_exif};
pub use tiff::{
    ByteOrder, DirectoryKind, FieldType, FieldValue, IfdDirectory, IfdEntry, ThumbnailData,
};
pub use writer::{WriteResult, build_exif_segment, restamp, restamp_file, rewrite, write_atomic};
