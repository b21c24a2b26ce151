//! # exif-restamp
//!
//! Batch-stamps capture dates into JPEG files by editing their EXIF block in
//! place. Only the EXIF APP1 segment changes; every other byte of the file,
//! including the compressed image data, is copied as is.
//!
//! ## Quick Start
//!
//! The pipeline module runs the whole collect → restamp → write flow:
//!
//! ```rust,no_run
//! use exif_restamp::config::Config;
//! use exif_restamp::pipeline::run_batch;
//! use exif_restamp::timestamp::Schedule;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!
//!     // First file gets 17:00, the next 17:10, then 17:20, ...
//!     let schedule = Schedule::parse("2021-01-20T17:00:00Z", "PT10M")?;
//!
//!     let report = run_batch(&config, Path::new("./photos"), Path::new("./out"), &schedule)?;
//!     println!("{} written, {} skipped", report.written(), report.skipped());
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! For a single file, or to edit tags other than the capture date:
//!
//! ```rust,no_run
//! use exif_restamp::exif::{self, DirectoryKind, FieldValue, OutputSet};
//! use exif_restamp::jpeg;
//!
//! fn main() -> exif_restamp::Result<()> {
//!     let original = std::fs::read("photo.jpg")?;
//!
//!     // 1. Stamp DateTimeOriginal and DateTimeDigitized
//!     let restamped = exif::restamp(&original, &"2021:01:20 17:00:00".parse()?)?;
//!
//!     // 2. Or stage arbitrary edits on top of the existing EXIF
//!     let layout = jpeg::scan(&original)?;
//!     let mut output = OutputSet::from_source_exif(
//!         layout.exif_segment().and_then(|s| s.exif_tiff()),
//!     )?;
//!     output.set_field(DirectoryKind::Ifd0, 0x0131, FieldValue::Ascii("exif-restamp".into()))?;
//!     let edited = exif::rewrite(&original, &output)?;
//!
//!     exif::write_atomic("restamped.jpg".as_ref(), &restamped)?;
//!     exif::write_atomic("edited.jpg".as_ref(), &edited)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`jpeg`]: JPEG marker segment scanner
//! - [`exif`]: Tag registry, TIFF codec, output set, reader and lossless writer
//! - [`timestamp`]: ISO 8601 start/increment parsing and per-file EXIF dates
//! - [`pipeline`]: File collection, destination planning and parallel batch processing
//! - [`config`]: JSON configuration
//! - [`error`]: Error type for the metadata engine

pub mod config;
pub mod error;
pub mod exif;
pub mod jpeg;
pub mod pipeline;
pub mod timestamp;

pub use error::{Error, Result};
