use std::fs;
use std::io::Cursor;
use std::path::Path;

use exif_restamp::config::Config;
use exif_restamp::exif::{self, DirectoryKind, FieldValue, OutputSet};
use exif_restamp::jpeg;
use exif_restamp::pipeline::{Outcome, run_batch};
use exif_restamp::timestamp::Schedule;
use tempfile::TempDir;

fn jpeg_bytes(seed: u8) -> Vec<u8> {
    let img = image::RgbImage::from_fn(24, 16, |x, y| {
        image::Rgb([seed.wrapping_add(x as u8 * 9), y as u8 * 12, seed])
    });
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

/// A JPEG that already carries camera EXIF.
fn camera_jpeg(seed: u8) -> Vec<u8> {
    let mut output = OutputSet::new(exif::ByteOrder::LittleEndian);
    output
        .set_field(DirectoryKind::Ifd0, 0x010F, FieldValue::Ascii("Canon".into()))
        .unwrap();
    output
        .set_field(DirectoryKind::Ifd0, 0x0132, FieldValue::Ascii("2019:05:04 10:11:12".into()))
        .unwrap();
    output
        .set_field(DirectoryKind::Exif, 0x9003, FieldValue::Ascii("2019:05:04 10:11:12".into()))
        .unwrap();
    output
        .set_field(DirectoryKind::Gps, 0x0001, FieldValue::Ascii("N".into()))
        .unwrap();
    exif::rewrite(&jpeg_bytes(seed), &output).unwrap()
}

fn png_bytes() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn schedule() -> Schedule {
    Schedule::parse("2021-01-20T17:00:00Z", "PT10M").unwrap()
}

fn read_with_nom_exif(path: &Path) -> nom_exif::Exif {
    let mut parser = nom_exif::MediaParser::new();
    let ms = nom_exif::MediaSource::file_path(path).unwrap();
    let iter: nom_exif::ExifIter = parser.parse(ms).unwrap();
    iter.into()
}

/// from/: a.jpg (camera EXIF), b.jpg (no EXIF), c.png, d.jpg (camera EXIF)
fn sample_batch() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let from = tmp.path().join("from");
    let to = tmp.path().join("to");
    fs::create_dir(&from).unwrap();
    fs::write(from.join("a.jpg"), camera_jpeg(10)).unwrap();
    fs::write(from.join("b.jpg"), jpeg_bytes(20)).unwrap();
    fs::write(from.join("c.png"), png_bytes()).unwrap();
    fs::write(from.join("d.jpg"), camera_jpeg(40)).unwrap();
    (tmp, from, to)
}

#[test]
fn batch_stamps_jpegs_in_order_and_skips_png() {
    let (_tmp, from, to) = sample_batch();
    let report = run_batch(&Config::default(), &from, &to, &schedule()).unwrap();

    assert_eq!(report.results.len(), 4);
    assert_eq!(report.written(), 3);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 0);
    assert!(matches!(report.results[2].outcome, Outcome::Skipped(_)));
    assert_eq!(report.results[2].timestamp, None);

    // the PNG does not use up a timestamp
    let expected = [
        ("a.jpg", "2021:01:20 17:00:00"),
        ("b.jpg", "2021:01:20 17:10:00"),
        ("d.jpg", "2021:01:20 17:20:00"),
    ];
    for (name, when) in expected {
        let dates = exif::read_exif(&to.join(name)).unwrap();
        assert_eq!(dates.date_time_original.as_deref(), Some(when), "{name}");
        assert_eq!(dates.date_time_digitized.as_deref(), Some(when), "{name}");
    }
    assert!(!to.join("c.png").exists());

    // IFD0 DateTime is left as the camera wrote it
    let a = exif::read_exif(&to.join("a.jpg")).unwrap();
    assert_eq!(a.date_time.as_deref(), Some("2019:05:04 10:11:12"));
    assert_eq!(exif::read_exif(&to.join("b.jpg")).unwrap().date_time, None);
}

#[test]
fn batch_output_keeps_scan_data_and_pixels() {
    let (_tmp, from, to) = sample_batch();
    run_batch(&Config::default(), &from, &to, &schedule()).unwrap();

    for name in ["a.jpg", "b.jpg", "d.jpg"] {
        let source = fs::read(from.join(name)).unwrap();
        let written = fs::read(to.join(name)).unwrap();

        let before = jpeg::scan(&source).unwrap();
        let after = jpeg::scan(&written).unwrap();
        assert_eq!(before.scan_data(), after.scan_data(), "{name}");

        let non_exif = |layout: &jpeg::JpegLayout<'_>| -> Vec<Vec<u8>> {
            layout
                .segments
                .iter()
                .filter(|s| !s.is_exif())
                .map(|s| s.payload.to_vec())
                .collect()
        };
        assert_eq!(non_exif(&before), non_exif(&after), "{name}");

        let source_pixels = image::load_from_memory(&source).unwrap().to_rgb8();
        let written_pixels = image::load_from_memory(&written).unwrap().to_rgb8();
        assert_eq!(source_pixels, written_pixels, "{name}");
    }
}

#[test]
fn batch_output_is_readable_by_another_exif_reader() {
    let (_tmp, from, to) = sample_batch();
    run_batch(&Config::default(), &from, &to, &schedule()).unwrap();

    for name in ["a.jpg", "b.jpg", "d.jpg"] {
        let exif = read_with_nom_exif(&to.join(name));
        assert!(exif.get(nom_exif::ExifTag::DateTimeOriginal).is_some(), "{name}");
        assert!(exif.get(nom_exif::ExifTag::CreateDate).is_some(), "{name}");
    }
    let a = read_with_nom_exif(&to.join("a.jpg"));
    assert!(a.get(nom_exif::ExifTag::Make).is_some());
}

#[test]
fn batch_results_do_not_depend_on_thread_count() {
    let (_tmp, from, to) = sample_batch();
    let serial_to = to.with_file_name("serial");

    run_batch(&Config::default(), &from, &to, &schedule()).unwrap();
    let serial = Config {
        jobs: 1,
        ..Config::default()
    };
    run_batch(&serial, &from, &serial_to, &schedule()).unwrap();

    for name in ["a.jpg", "b.jpg", "d.jpg"] {
        assert_eq!(
            fs::read(to.join(name)).unwrap(),
            fs::read(serial_to.join(name)).unwrap(),
            "{name}"
        );
    }
}

#[test]
fn debug_batch_writes_nothing() {
    let (_tmp, from, to) = sample_batch();
    let mut config = Config::default();
    config.output.debug = true;

    let report = run_batch(&config, &from, &to, &schedule()).unwrap();
    assert_eq!(report.inspected(), 3);
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        report.results[0].before.as_ref().unwrap().date_time_original.as_deref(),
        Some("2019:05:04 10:11:12")
    );
    assert_eq!(fs::read_dir(&to).unwrap().count(), 0);
}

#[test]
fn malformed_exif_fails_only_that_file() {
    let (_tmp, from, to) = sample_batch();

    // An EXIF segment whose IFD0 entry count runs past the block
    let mut broken = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x12];
    broken.extend_from_slice(jpeg::EXIF_SIGNATURE);
    broken.extend_from_slice(b"MM\0*\0\0\0\x08\0\x20");
    broken.extend_from_slice(&jpeg_bytes(30)[2..]);
    fs::write(from.join("bb.jpg"), broken).unwrap();

    let report = run_batch(&Config::default(), &from, &to, &schedule()).unwrap();
    assert_eq!(report.written(), 3);
    assert_eq!(report.failed(), 1);

    let failed = &report.results[2];
    assert!(failed.path.ends_with("bb.jpg"));
    assert!(matches!(&failed.outcome, Outcome::Failed(m) if m.contains("Malformed TIFF")));
    assert!(!to.join("bb.jpg").exists());

    // bb.jpg starts with SOI, so it keeps its timestamp and d.jpg is fourth
    let d = exif::read_exif(&to.join("d.jpg")).unwrap();
    assert_eq!(d.date_time_original.as_deref(), Some("2021:01:20 17:30:00"));
}

#[test]
fn pattern_selects_files() {
    let (_tmp, from, to) = sample_batch();
    let config = Config {
        pattern: "*.jpg".to_string(),
        ..Config::default()
    };
    let report = run_batch(&config, &from, &to, &schedule()).unwrap();
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.skipped(), 0);

    let d = exif::read_exif(&to.join("d.jpg")).unwrap();
    assert_eq!(d.date_time_original.as_deref(), Some("2021:01:20 17:20:00"));
}

#[test]
fn renamed_duplicates_land_side_by_side() {
    let tmp = TempDir::new().unwrap();
    let from = tmp.path().join("from");
    let to = tmp.path().join("to");
    fs::create_dir_all(from.join("day1")).unwrap();
    fs::create_dir_all(from.join("day2")).unwrap();
    fs::write(from.join("day1").join("img.jpg"), jpeg_bytes(1)).unwrap();
    fs::write(from.join("day2").join("img.jpg"), jpeg_bytes(2)).unwrap();

    let config = Config {
        pattern: "**/*.jpg".to_string(),
        ..Config::default()
    };
    let report = run_batch(&config, &from, &to, &schedule()).unwrap();
    assert_eq!(report.written(), 2);

    let first = exif::read_exif(&to.join("img.jpg")).unwrap();
    let second = exif::read_exif(&to.join("img-1.jpg")).unwrap();
    assert_eq!(first.date_time_original.as_deref(), Some("2021:01:20 17:00:00"));
    assert_eq!(second.date_time_original.as_deref(), Some("2021:01:20 17:10:00"));
}
