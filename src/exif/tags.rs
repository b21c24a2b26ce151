//! Static registry of the TIFF/EXIF tags this crate knows by name.
//!
//! Each tag records the field types it may be stored as and the directory that
//! owns it. The codec never branches on individual tags; ownership and the
//! structural pointer tags are looked up here instead.

use super::tiff::{DirectoryKind, FieldType};

/// Registry record for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagInfo {
    pub id: u16,
    pub name: &'static str,
    /// Accepted field types; the first one is the canonical type.
    pub types: &'static [FieldType],
    pub directory: DirectoryKind,
}

impl TagInfo {
    const fn new(
        id: u16,
        name: &'static str,
        types: &'static [FieldType],
        directory: DirectoryKind,
    ) -> Self {
        Self {
            id,
            name,
            types,
            directory,
        }
    }

    /// Whether a value of `field_type` may be stored under this tag.
    pub fn accepts(&self, field_type: FieldType) -> bool {
        self.types.contains(&field_type)
    }
}

use DirectoryKind::{Exif, Gps, Ifd0, Interop, Thumbnail};
use FieldType::{Ascii, Byte, Ifd, Long, Rational, SRational, Short, Undefined};

const ASCII: &[FieldType] = &[Ascii];
const SHORT: &[FieldType] = &[Short];
const SHORT_OR_LONG: &[FieldType] = &[Short, Long];
const LONG: &[FieldType] = &[Long];
const POINTER: &[FieldType] = &[Long, Ifd];
const RATIONAL: &[FieldType] = &[Rational];
const SRATIONAL: &[FieldType] = &[SRational];
const BYTE: &[FieldType] = &[Byte];
const UNDEFINED: &[FieldType] = &[Undefined];

// Date fields written by this tool.
pub const DATE_TIME: TagInfo = TagInfo::new(0x0132, "DateTime", ASCII, Ifd0);
pub const DATE_TIME_ORIGINAL: TagInfo = TagInfo::new(0x9003, "DateTimeOriginal", ASCII, Exif);
pub const DATE_TIME_DIGITIZED: TagInfo = TagInfo::new(0x9004, "DateTimeDigitized", ASCII, Exif);

// Structural tags, regenerated by the encoder.
pub const EXIF_IFD_POINTER: TagInfo = TagInfo::new(0x8769, "ExifIFDPointer", POINTER, Ifd0);
pub const GPS_IFD_POINTER: TagInfo = TagInfo::new(0x8825, "GPSInfoIFDPointer", POINTER, Ifd0);
pub const INTEROP_IFD_POINTER: TagInfo =
    TagInfo::new(0xA005, "InteroperabilityIFDPointer", POINTER, Exif);
pub const JPEG_INTERCHANGE_FORMAT: TagInfo =
    TagInfo::new(0x0201, "JPEGInterchangeFormat", LONG, Thumbnail);
pub const JPEG_INTERCHANGE_FORMAT_LENGTH: TagInfo =
    TagInfo::new(0x0202, "JPEGInterchangeFormatLength", LONG, Thumbnail);
pub const STRIP_OFFSETS: TagInfo = TagInfo::new(0x0111, "StripOffsets", SHORT_OR_LONG, Thumbnail);
pub const STRIP_BYTE_COUNTS: TagInfo =
    TagInfo::new(0x0117, "StripByteCounts", SHORT_OR_LONG, Thumbnail);

static REGISTRY: &[TagInfo] = &[
    // IFD0
    TagInfo::new(0x0100, "ImageWidth", SHORT_OR_LONG, Ifd0),
    TagInfo::new(0x0101, "ImageLength", SHORT_OR_LONG, Ifd0),
    TagInfo::new(0x0103, "Compression", SHORT, Ifd0),
    TagInfo::new(0x010E, "ImageDescription", ASCII, Ifd0),
    TagInfo::new(0x010F, "Make", ASCII, Ifd0),
    TagInfo::new(0x0110, "Model", ASCII, Ifd0),
    TagInfo::new(0x0112, "Orientation", SHORT, Ifd0),
    TagInfo::new(0x011A, "XResolution", RATIONAL, Ifd0),
    TagInfo::new(0x011B, "YResolution", RATIONAL, Ifd0),
    TagInfo::new(0x0128, "ResolutionUnit", SHORT, Ifd0),
    TagInfo::new(0x0131, "Software", ASCII, Ifd0),
    DATE_TIME,
    TagInfo::new(0x013B, "Artist", ASCII, Ifd0),
    TagInfo::new(0x0213, "YCbCrPositioning", SHORT, Ifd0),
    TagInfo::new(0x8298, "Copyright", ASCII, Ifd0),
    EXIF_IFD_POINTER,
    GPS_IFD_POINTER,
    // IFD1
    STRIP_OFFSETS,
    STRIP_BYTE_COUNTS,
    JPEG_INTERCHANGE_FORMAT,
    JPEG_INTERCHANGE_FORMAT_LENGTH,
    // Exif IFD
    TagInfo::new(0x829A, "ExposureTime", RATIONAL, Exif),
    TagInfo::new(0x829D, "FNumber", RATIONAL, Exif),
    TagInfo::new(0x8822, "ExposureProgram", SHORT, Exif),
    TagInfo::new(0x8827, "ISOSpeedRatings", SHORT, Exif),
    TagInfo::new(0x9000, "ExifVersion", UNDEFINED, Exif),
    DATE_TIME_ORIGINAL,
    DATE_TIME_DIGITIZED,
    TagInfo::new(0x9010, "OffsetTime", ASCII, Exif),
    TagInfo::new(0x9011, "OffsetTimeOriginal", ASCII, Exif),
    TagInfo::new(0x9012, "OffsetTimeDigitized", ASCII, Exif),
    TagInfo::new(0x9201, "ShutterSpeedValue", SRATIONAL, Exif),
    TagInfo::new(0x9202, "ApertureValue", RATIONAL, Exif),
    TagInfo::new(0x9204, "ExposureBiasValue", SRATIONAL, Exif),
    TagInfo::new(0x9207, "MeteringMode", SHORT, Exif),
    TagInfo::new(0x9209, "Flash", SHORT, Exif),
    TagInfo::new(0x920A, "FocalLength", RATIONAL, Exif),
    TagInfo::new(0x927C, "MakerNote", UNDEFINED, Exif),
    TagInfo::new(0x9286, "UserComment", UNDEFINED, Exif),
    TagInfo::new(0x9290, "SubSecTime", ASCII, Exif),
    TagInfo::new(0x9291, "SubSecTimeOriginal", ASCII, Exif),
    TagInfo::new(0x9292, "SubSecTimeDigitized", ASCII, Exif),
    TagInfo::new(0xA000, "FlashpixVersion", UNDEFINED, Exif),
    TagInfo::new(0xA001, "ColorSpace", SHORT, Exif),
    TagInfo::new(0xA002, "PixelXDimension", SHORT_OR_LONG, Exif),
    TagInfo::new(0xA003, "PixelYDimension", SHORT_OR_LONG, Exif),
    INTEROP_IFD_POINTER,
    TagInfo::new(0xA434, "LensModel", ASCII, Exif),
    // GPS IFD
    TagInfo::new(0x0000, "GPSVersionID", BYTE, Gps),
    TagInfo::new(0x0001, "GPSLatitudeRef", ASCII, Gps),
    TagInfo::new(0x0002, "GPSLatitude", RATIONAL, Gps),
    TagInfo::new(0x0003, "GPSLongitudeRef", ASCII, Gps),
    TagInfo::new(0x0004, "GPSLongitude", RATIONAL, Gps),
    TagInfo::new(0x0005, "GPSAltitudeRef", BYTE, Gps),
    TagInfo::new(0x0006, "GPSAltitude", RATIONAL, Gps),
    TagInfo::new(0x0007, "GPSTimeStamp", RATIONAL, Gps),
    TagInfo::new(0x001D, "GPSDateStamp", ASCII, Gps),
    // Interoperability IFD
    TagInfo::new(0x0001, "InteroperabilityIndex", ASCII, Interop),
    TagInfo::new(0x0002, "InteroperabilityVersion", UNDEFINED, Interop),
];

/// Look a tag up by id alone.
///
/// GPS and Interoperability ids overlap; the GPS record wins here. Use
/// [`lookup_in`] when the owning directory is known.
pub fn lookup(id: u16) -> Option<&'static TagInfo> {
    REGISTRY.iter().find(|t| t.id == id)
}

/// Look a tag up within one directory. IFD1 accepts IFD0 tags as well.
pub fn lookup_in(kind: DirectoryKind, id: u16) -> Option<&'static TagInfo> {
    REGISTRY.iter().find(|t| {
        t.id == id && (t.directory == kind || (kind == Thumbnail && t.directory == Ifd0))
    })
}

/// Human-readable tag name, or the hex id for tags outside the registry.
pub fn display_name(kind: DirectoryKind, id: u16) -> String {
    match lookup_in(kind, id) {
        Some(info) => info.name.to_string(),
        None => format!("Tag({id:#06x})"),
    }
}

/// Sub-directories reachable from `kind`, with the tag that points at each.
pub(crate) fn child_pointers(kind: DirectoryKind) -> &'static [(u16, DirectoryKind)] {
    match kind {
        Ifd0 => &[(EXIF_IFD_POINTER.id, Exif), (GPS_IFD_POINTER.id, Gps)],
        Exif => &[(INTEROP_IFD_POINTER.id, Interop)],
        Gps | Interop | Thumbnail => &[],
    }
}

/// Offset/length tags that locate IFD1's image data.
const THUMBNAIL_LOCATORS: [u16; 4] = [
    JPEG_INTERCHANGE_FORMAT.id,
    JPEG_INTERCHANGE_FORMAT_LENGTH.id,
    STRIP_OFFSETS.id,
    STRIP_BYTE_COUNTS.id,
];

/// Whether `id` carries layout information in `kind` that the encoder rewrites.
pub(crate) fn is_structural(kind: DirectoryKind, id: u16) -> bool {
    child_pointers(kind).iter().any(|&(tag, _)| tag == id)
        || (kind == Thumbnail && THUMBNAIL_LOCATORS.contains(&id))
}
