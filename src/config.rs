use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::ResolutionPolicy;

/// Process settings, read once at startup from `TOURBOOK_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub season: String,
    pub compact_threshold: u64,
    pub metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            season: "default".into(),
            compact_threshold: 1000,
            metrics: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("TOURBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            season: lookup("TOURBOOK_SEASON").unwrap_or(defaults.season),
            compact_threshold: lookup("TOURBOOK_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics: lookup("TOURBOOK_METRICS")
                .is_some_and(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Toml(PathBuf, toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {e}", path.display()),
            ConfigError::Toml(path, e) => write!(f, "invalid policy file {}: {e}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a resolution policy from TOML. Missing keys take their defaults.
///
/// ```toml
/// preferred_track_order = ["Blue", "Green"]
/// max_shift_days = 3
/// immovable_ids = ["X"]
/// ```
pub fn parse_policy(text: &str) -> Result<ResolutionPolicy, toml::de::Error> {
    toml::from_str(text)
}

pub fn load_policy(path: &Path) -> Result<ResolutionPolicy, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    parse_policy(&text).map_err(|e| ConfigError::Toml(path.to_path_buf(), e))
}
