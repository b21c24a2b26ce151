//! JPEG marker segment scanner.
//!
//! Walks the length-prefixed segments between SOI and the start of scan. From
//! the SOS marker to the end of the file everything is treated as one opaque
//! tail, so entropy-coded data is never looked at.

use crate::error::{Error, Result};

/// Start of Image
pub const SOI: u16 = 0xFFD8;
/// End of Image
pub const EOI: u16 = 0xFFD9;
/// Start of Scan
pub const SOS: u16 = 0xFFDA;
/// APP1 (Exif, XMP)
pub const APP1: u16 = 0xFFE1;
/// Temporary private use, no length field.
const TEM: u16 = 0xFF01;

/// Signature that opens the payload of an EXIF APP1 segment.
pub const EXIF_SIGNATURE: &[u8; 6] = b"Exif\0\0";

/// Bytes taken by the marker and the length field.
const SEGMENT_HEADER_LEN: usize = 4;

/// A length-prefixed segment, borrowed from the file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegSegment<'a> {
    pub marker: u16,
    /// Offset of the marker's 0xFF byte in the file.
    pub offset: usize,
    /// Segment data, excluding marker and length bytes.
    pub payload: &'a [u8],
}

impl<'a> JpegSegment<'a> {
    /// Offset one past the last byte of the segment.
    pub fn end(&self) -> usize {
        self.offset + SEGMENT_HEADER_LEN + self.payload.len()
    }

    /// Checks if this segment contains Exif data.
    pub fn is_exif(&self) -> bool {
        self.marker == APP1 && self.payload.starts_with(EXIF_SIGNATURE)
    }

    /// The TIFF block following the Exif signature.
    pub fn exif_tiff(&self) -> Option<&'a [u8]> {
        if !self.is_exif() {
            return None;
        }
        Some(&self.payload[EXIF_SIGNATURE.len()..])
    }
}

/// Whether `data` starts with the SOI marker.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&SOI.to_be_bytes())
}

/// Lazy iterator over the segments of a JPEG stream.
///
/// Yields segments until SOS or EOI is reached; [`Segments::tail_offset`]
/// then reports where the remaining bytes start. The first error ends the
/// iteration.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    data: &'a [u8],
    pos: usize,
    tail_offset: Option<usize>,
    failed: bool,
}

impl<'a> Segments<'a> {
    /// Offset of the SOS (or EOI) marker, once iteration has reached it.
    /// A stream with neither ends at the end of the buffer.
    pub fn tail_offset(&self) -> Option<usize> {
        self.tail_offset
    }

    fn fail(&mut self, message: String) -> Option<Result<JpegSegment<'a>>> {
        self.failed = true;
        Some(Err(Error::MalformedJpeg(message)))
    }
}

/// Start iterating over the segments of `data`.
pub fn segments(data: &[u8]) -> Result<Segments<'_>> {
    if !is_jpeg(data) {
        return Err(Error::MalformedJpeg("missing SOI marker".to_string()));
    }
    Ok(Segments {
        data,
        pos: 2,
        tail_offset: None,
        failed: false,
    })
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<JpegSegment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.tail_offset.is_some() {
            return None;
        }
        let data = self.data;

        loop {
            let pos = self.pos;
            if pos >= data.len() {
                log::debug!("No start of scan before end of file");
                self.tail_offset = Some(data.len());
                return None;
            }
            if data[pos] != 0xFF {
                return self.fail(format!(
                    "expected a marker at offset {pos}, found {:#04x}",
                    data[pos]
                ));
            }

            // Any number of 0xFF fill bytes may precede a marker code.
            let mut code_at = pos + 1;
            while data.get(code_at) == Some(&0xFF) {
                code_at += 1;
            }
            let Some(&code) = data.get(code_at) else {
                return self.fail(format!("truncated marker at offset {pos}"));
            };
            let offset = code_at - 1;
            let marker = 0xFF00 | code as u16;

            match marker {
                SOS | EOI => {
                    self.tail_offset = Some(offset);
                    return None;
                }
                0xFFD0..=0xFFD7 | TEM => {
                    self.pos = code_at + 1;
                    continue;
                }
                0xFF00 | SOI => {
                    return self.fail(format!(
                        "unexpected marker {marker:#06x} at offset {offset}"
                    ));
                }
                _ => {}
            }

            let Some(len_bytes) = data.get(offset + 2..offset + SEGMENT_HEADER_LEN) else {
                return self.fail(format!(
                    "segment {marker:#06x} at offset {offset} is cut off before its length"
                ));
            };
            let length = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
            if length < 2 {
                return self.fail(format!(
                    "segment {marker:#06x} at offset {offset} declares length {length}"
                ));
            }
            let end = offset + 2 + length;
            if end > data.len() {
                return self.fail(format!(
                    "segment {marker:#06x} at offset {offset} declares {length} bytes but only {} remain",
                    data.len() - offset - 2
                ));
            }

            self.pos = end;
            return Some(Ok(JpegSegment {
                marker,
                offset,
                payload: &data[offset + SEGMENT_HEADER_LEN..end],
            }));
        }
    }
}

/// Segments of a JPEG file up to the start of scan, plus where the tail begins.
#[derive(Debug, Clone)]
pub struct JpegLayout<'a> {
    data: &'a [u8],
    pub segments: Vec<JpegSegment<'a>>,
    pub tail_offset: usize,
}

impl<'a> JpegLayout<'a> {
    /// The first EXIF APP1 segment, if any.
    pub fn exif_segment(&self) -> Option<&JpegSegment<'a>> {
        self.segments.iter().find(|s| s.is_exif())
    }

    /// Everything from the SOS marker to the end of the file.
    pub fn scan_data(&self) -> &'a [u8] {
        &self.data[self.tail_offset..]
    }
}

/// Scan `data` up to the start of scan.
pub fn scan(data: &[u8]) -> Result<JpegLayout<'_>> {
    let mut iter = segments(data)?;
    let segments = iter.by_ref().collect::<Result<Vec<_>>>()?;
    let tail_offset = iter.tail_offset().unwrap_or(data.len());

    let exif_count = segments.iter().filter(|s| s.is_exif()).count();
    if exif_count > 1 {
        log::warn!("Found {exif_count} EXIF segments, only the first is used");
    }

    Ok(JpegLayout {
        data,
        segments,
        tail_offset,
    })
}
