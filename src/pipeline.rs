use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{CollisionPolicy, Config};
use crate::error::Error;
use crate::exif::{self, CaptureDates};
use crate::jpeg;
use crate::timestamp::Schedule;

/// The destination directory could not be created. Fatal for the whole batch.
#[derive(Debug, thiserror::Error)]
#[error("Failed to create destination directory {}: {source}", path.display())]
pub struct DestinationDirError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Where one source file goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Write(PathBuf),
    /// Not written; the reason is reported with the result.
    Skip { path: PathBuf, reason: String },
}

impl Destination {
    pub fn path(&self) -> &Path {
        match self {
            Self::Write(path) | Self::Skip { path, .. } => path,
        }
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Position in the sorted list of collected files.
    pub index: usize,
    /// Position among the JPEG files only; this fixes the timestamp. `None`
    /// for files that did not start with SOI when the batch was planned.
    pub slot: Option<usize>,
    pub source: PathBuf,
    pub destination: Destination,
}

/// How processing one file ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Written,
    /// Read and reported only.
    Inspected,
    Skipped(String),
    Failed(String),
}

/// The result of processing a single image.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub index: usize,
    pub path: PathBuf,
    pub destination: Option<PathBuf>,
    /// The EXIF date stamped (or that would be stamped) into this file.
    pub timestamp: Option<String>,
    pub before: Option<CaptureDates>,
    pub after: Option<CaptureDates>,
    pub outcome: Outcome,
}

impl ProcessResult {
    fn new(job: &Job) -> Self {
        Self {
            index: job.index,
            path: job.source.clone(),
            destination: Some(job.destination.path().to_path_buf()),
            timestamp: None,
            before: None,
            after: None,
            outcome: Outcome::Inspected,
        }
    }
}

/// Results of a whole batch, in source order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<ProcessResult>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Written))
    }

    pub fn inspected(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Inspected))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }
}

/// Collect the regular files under `from_dir` whose path relative to
/// `from_dir` matches `pattern`, sorted by path.
///
/// The walk is recursive (following symlinks), but `*` and `?` never match
/// `/`, so `*` only selects top-level files and `**/*.jpg` reaches into
/// subdirectories.
///
/// ```rust,no_run
/// use exif_restamp::pipeline::collect_images;
/// use std::path::Path;
///
/// let images = collect_images(Path::new("./photos"), "*.jpg").unwrap();
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(from_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !from_dir.is_dir() {
        anyhow::bail!("Source directory {} does not exist", from_dir.display());
    }
    let matcher = glob::Pattern::new(pattern)
        .with_context(|| format!("Invalid file pattern {pattern:?}"))?;
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut images = Vec::new();
    for entry in WalkDir::new(from_dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(from_dir).unwrap_or(entry.path());
        if matcher.matches_path_with(relative, options) {
            images.push(entry.into_path());
        } else {
            log::trace!("Not matched: {}", relative.display());
        }
    }

    images.sort();
    Ok(images)
}

/// Decide the destination of every source, in order, so that two sources
/// never race for the same file.
pub fn plan_destinations(
    images: &[PathBuf],
    to_dir: &Path,
    policy: CollisionPolicy,
) -> Vec<Destination> {
    let names: Vec<OsString> = images
        .iter()
        .map(|p| p.file_name().map(OsString::from).unwrap_or_default())
        .collect();

    match policy {
        CollisionPolicy::Overwrite => names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let path = to_dir.join(name);
                match names[i + 1..].iter().position(|n| n == name) {
                    Some(later) => Destination::Skip {
                        path,
                        reason: format!(
                            "overwritten by {}",
                            images[i + 1 + later].display()
                        ),
                    },
                    None => Destination::Write(path),
                }
            })
            .collect(),
        CollisionPolicy::Skip => {
            let mut first_use: Vec<(&OsString, usize)> = Vec::new();
            names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let path = to_dir.join(name);
                    match first_use.iter().find(|(n, _)| *n == name) {
                        Some(&(_, first)) => Destination::Skip {
                            path,
                            reason: format!(
                                "file name already used by {}",
                                images[first].display()
                            ),
                        },
                        None => {
                            first_use.push((name, i));
                            Destination::Write(path)
                        }
                    }
                })
                .collect()
        }
        CollisionPolicy::Rename => {
            let mut claimed: HashSet<OsString> = HashSet::new();
            names
                .iter()
                .zip(images)
                .map(|(name, source)| {
                    let mut candidate = name.clone();
                    let mut n = 0;
                    while claimed.contains(&candidate) {
                        n += 1;
                        candidate = numbered_name(Path::new(name), n);
                    }
                    if n > 0 {
                        log::info!(
                            "{} shares its name with an earlier file, writing it as {}",
                            source.display(),
                            candidate.to_string_lossy()
                        );
                    }
                    claimed.insert(candidate.clone());
                    Destination::Write(to_dir.join(candidate))
                })
                .collect()
        }
    }
}

/// `photo.jpg` -> `photo-2.jpg`
fn numbered_name(name: &Path, n: usize) -> OsString {
    let mut out = name.file_stem().map(OsString::from).unwrap_or_default();
    out.push(format!("-{n}"));
    if let Some(ext) = name.extension() {
        out.push(".");
        out.push(ext);
    }
    out
}

/// Whether the file at `path` starts with the JPEG SOI marker.
fn starts_with_soi(path: &Path) -> std::io::Result<bool> {
    let mut head = Vec::with_capacity(2);
    File::open(path)?.take(2).read_to_end(&mut head)?;
    Ok(jpeg::is_jpeg(&head))
}

/// Number the JPEG files among `images` consecutively.
///
/// Only the first two bytes of each file are read. Files that are not JPEGs,
/// or cannot be read, get `None` and do not use up a timestamp.
pub fn assign_slots(images: &[PathBuf]) -> Vec<Option<usize>> {
    let mut next = 0;
    images
        .iter()
        .map(|path| match starts_with_soi(path) {
            Ok(true) => {
                next += 1;
                Some(next - 1)
            }
            Ok(false) => None,
            Err(e) => {
                log::debug!("Could not read {}: {e}", path.display());
                None
            }
        })
        .collect()
}

fn outcome_for(err: Error) -> Outcome {
    match err {
        Error::UnsupportedMetadata(reason) => Outcome::Skipped(reason),
        other => Outcome::Failed(other.to_string()),
    }
}

fn log_dates(label: &str, dates: &CaptureDates, loud: bool) {
    let level = if loud { log::Level::Info } else { log::Level::Debug };
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "Not Found.".to_string());
    log::log!(level, "  {label} DateTime: {}", show(&dates.date_time));
    log::log!(level, "  {label} DateTimeOriginal: {}", show(&dates.date_time_original));
    log::log!(level, "  {label} DateTimeDigitized: {}", show(&dates.date_time_digitized));
}

/// Process one image: read its dates, and unless `debug` is set, write the
/// restamped copy and read the dates back from it.
///
/// Never returns an error; failures end up in [`ProcessResult::outcome`].
pub fn process_image(job: &Job, schedule: &Schedule, debug: bool) -> ProcessResult {
    let mut result = ProcessResult::new(job);

    let Some(slot) = job.slot else {
        // Reading again gives the real error for unreadable files.
        result.outcome = match exif::read_exif(&job.source) {
            Err(e) => outcome_for(e),
            Ok(_) => Outcome::Skipped("not a JPEG file when the batch was planned".to_string()),
        };
        return result;
    };

    let when = match schedule.timestamp_for(slot) {
        Ok(when) => when,
        Err(e) => {
            result.outcome = outcome_for(e);
            return result;
        }
    };
    result.timestamp = Some(when.to_string());

    match exif::read_exif(&job.source) {
        Ok(dates) => {
            log_dates("Before", &dates, debug);
            result.before = Some(dates);
        }
        Err(e) => {
            result.outcome = outcome_for(e);
            return result;
        }
    }

    if debug {
        result.outcome = Outcome::Inspected;
        return result;
    }

    let dest = match &job.destination {
        Destination::Write(dest) => dest,
        Destination::Skip { reason, .. } => {
            result.outcome = Outcome::Skipped(reason.clone());
            return result;
        }
    };

    match exif::restamp_file(&job.source, dest, &when) {
        Ok(_) => result.outcome = Outcome::Written,
        Err(e) => {
            result.outcome = outcome_for(e);
            return result;
        }
    }

    match exif::read_exif(dest) {
        Ok(dates) => {
            log_dates("After", &dates, false);
            result.after = Some(dates);
        }
        Err(e) => log::warn!("Could not read back {}: {e}", dest.display()),
    }
    result
}

/// Run the whole batch: collect, plan, then process every file on a worker
/// pool. Results come back in source order whatever order files finish in.
pub fn run_batch(
    config: &Config,
    from_dir: &Path,
    to_dir: &Path,
    schedule: &Schedule,
) -> Result<BatchReport> {
    std::fs::create_dir_all(to_dir).map_err(|source| DestinationDirError {
        path: to_dir.to_path_buf(),
        source,
    })?;

    let images = collect_images(from_dir, &config.pattern)?;
    log::info!(
        "Found {} file(s) matching {:?} in {}",
        images.len(),
        config.pattern,
        from_dir.display()
    );

    let slots = assign_slots(&images);
    let jobs: Vec<Job> = images
        .iter()
        .zip(slots)
        .zip(plan_destinations(&images, to_dir, config.on_collision))
        .enumerate()
        .map(|(index, ((source, slot), destination))| Job {
            index,
            slot,
            source: source.clone(),
            destination,
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()
        .context("Failed to start worker threads")?;

    let total = jobs.len();
    let debug = config.output.debug;
    let results = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                log::info!(
                    "[{}/{}] Processing: {}",
                    job.index + 1,
                    total,
                    job.source.display()
                );
                let result = process_image(job, schedule, debug);
                match &result.outcome {
                    Outcome::Written => log::info!(
                        "  {} -> {} ({})",
                        job.source.display(),
                        job.destination.path().display(),
                        result.timestamp.as_deref().unwrap_or_default()
                    ),
                    Outcome::Inspected => {}
                    Outcome::Skipped(reason) => {
                        log::warn!("  Skipped {}: {reason}", job.source.display())
                    }
                    Outcome::Failed(err) => log::error!("  {}: {err}", job.source.display()),
                }
                result
            })
            .collect::<Vec<_>>()
    });

    Ok(BatchReport { results })
}
