//! Error types for the metadata rewrite engine.

use thiserror::Error;

use crate::exif::FieldType;

/// Errors raised while scanning, decoding, editing or writing image metadata.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad JPEG marker structure or a truncated segment.
    #[error("Malformed JPEG: {0}")]
    MalformedJpeg(String),

    /// Bad TIFF byte-order marker, out-of-range offset or entry count.
    #[error("Malformed TIFF: {0}")]
    MalformedTiff(String),

    /// The file is not a JPEG, or carries no metadata this tool can edit.
    #[error("Unsupported metadata: {0}")]
    UnsupportedMetadata(String),

    /// A value did not match the type the tag registry declares for the tag.
    #[error("Tag {tag:#06x} expects {expected}, got {found}")]
    FieldTypeMismatch {
        tag: u16,
        expected: String,
        found: FieldType,
    },

    /// The encoded EXIF block does not fit in a single APP1 segment.
    #[error("EXIF block of {0} bytes does not fit in a JPEG APP1 segment")]
    ExifTooLarge(usize),

    /// Unparsable start instant, or a timestamp that overflows the calendar.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Unparsable ISO-8601 duration.
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;
