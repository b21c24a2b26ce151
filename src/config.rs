use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Batch settings that are not positional arguments.
///
/// Every field has a default, so a config file only needs the keys it
/// changes. Command-line flags override whatever is loaded.
///
/// ```rust
/// use exif_restamp::config::{CollisionPolicy, Config};
///
/// let config: Config = serde_json::from_str(r#"{ "pattern": "*.jpg" }"#).unwrap();
/// assert_eq!(config.pattern, "*.jpg");
/// assert_eq!(config.on_collision, CollisionPolicy::Rename);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glob matched against each file's path relative to the source
    /// directory. `*` does not cross `/`.
    pub pattern: String,
    /// What to do when two sources share a file name.
    pub on_collision: CollisionPolicy,
    /// Worker threads. `0` uses one per core.
    pub jobs: usize,
    pub output: OutputConfig,
}

/// Handling of source files that would land on the same destination name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// The last source in path order wins.
    Overwrite,
    /// Only the first source is written; later ones are reported as skipped.
    Skip,
    /// Later sources get `-1`, `-2`, ... appended to the file stem.
    #[default]
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Only read and report the date fields, write nothing.
    pub debug: bool,
    /// Print results as JSON.
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            on_collision: CollisionPolicy::default(),
            jobs: 0,
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location: `exif-restamp.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("exif-restamp.json"))
    }

    /// Load config from `path`, which must exist, or from the default
    /// location, falling back to defaults when nothing is there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = Self::config_path()?;
                if !default_path.exists() {
                    log::debug!(
                        "No config file at {}, using defaults",
                        default_path.display()
                    );
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(config_path)
    }
}
