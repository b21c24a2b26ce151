use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use exif_restamp::config::{self, CollisionPolicy};
use exif_restamp::pipeline::{self, DestinationDirError};
use exif_restamp::timestamp::Schedule;

#[derive(Parser, Debug)]
#[command(
    name = "exif-restamp",
    version,
    about = "Sets the date-taken on a directory of JPEG files without touching the image data"
)]
struct Cli {
    /// The directory that contains the JPEG files
    #[arg(value_name = "FROM_DIR", required_unless_present = "init")]
    from_dir: Option<PathBuf>,

    /// The directory to write the restamped files to
    #[arg(value_name = "TO_DIR", required_unless_present = "init")]
    to_dir: Option<PathBuf>,

    /// Start time in ISO 8601, e.g. 2021-01-20T17:00:01Z or 2021-01-20T17:00:01-05:00
    #[arg(value_name = "START", required_unless_present = "init", allow_hyphen_values = true)]
    start: Option<String>,

    /// ISO 8601 duration added for each successive file, e.g. PT10M
    #[arg(value_name = "INCREMENT", required_unless_present = "init", allow_hyphen_values = true)]
    increment: Option<String>,

    /// Glob pattern selecting files, relative to FROM_DIR (e.g. *.jpg, **/*.jpg)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Only read the files and report their dates, do not write anything
    #[arg(short, long)]
    debug: bool,

    /// Path to config file (default: exif-restamp.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config file and exit
    #[arg(long)]
    init: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Worker threads (0 = one per core)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// What to do when two files share a name
    #[arg(long, value_enum, value_name = "POLICY")]
    on_collision: Option<CollisionPolicy>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            if err.downcast_ref::<DestinationDirError>().is_some() {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    // Handle --init
    if cli.init {
        let path = config::Config::default().save(cli.config.as_deref())?;
        println!("Default config written to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(from_dir), Some(to_dir), Some(start), Some(increment)) =
        (cli.from_dir, cli.to_dir, cli.start, cli.increment)
    else {
        anyhow::bail!("FROM_DIR, TO_DIR, START and INCREMENT are required. Use --help for usage.");
    };

    // Load config; flags override it
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(pattern) = cli.pattern {
        config.pattern = pattern;
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(policy) = cli.on_collision {
        config.on_collision = policy;
    }
    if cli.debug {
        config.output.debug = true;
    }
    if cli.json {
        config.output.json = true;
    }

    let schedule = Schedule::parse(&start, &increment)?;
    log::info!(
        "Parameters - FROM: {}, TO: {}, START: {}, BY: {}, pattern: {}",
        from_dir.display(),
        to_dir.display(),
        schedule.start(),
        schedule.increment(),
        config.pattern
    );
    if config.output.debug {
        log::info!("DEBUG - files are read only, nothing will be written");
    }

    let report = pipeline::run_batch(&config, &from_dir, &to_dir, &schedule)?;

    // JSON output
    if config.output.json {
        println!("{}", serde_json::to_string_pretty(&report.results)?);
    }

    // Summary
    let total = report.results.len();
    if config.output.debug {
        log::info!(
            "Done: {} inspected, {} skipped, {} failed out of {total} files",
            report.inspected(),
            report.skipped(),
            report.failed()
        );
    } else {
        log::info!(
            "Done: {} written, {} skipped, {} failed out of {total} files",
            report.written(),
            report.skipped(),
            report.failed()
        );
    }
    Ok(ExitCode::SUCCESS)
}
