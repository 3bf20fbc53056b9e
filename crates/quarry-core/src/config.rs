//! Configuration management for Quarry.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.
//! Once loaded, a `Config` is treated as immutable and handed to the indexer,
//! searcher and daemon at construction time.

use crate::error::{QuarryError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for Quarry.
///
/// ## Example Configuration File (quarry.toml)
///
/// ```toml
/// [general]
/// data_dir = "/var/lib/quarry"
/// log_level = "info"
///
/// [extensions]
/// allowed = ["txt", "md", "json"]
/// ignored = ["png", "zip"]
///
/// [scoring]
/// k1 = 1.5
/// k3 = 1.5
/// b = 0.75
///
/// [search]
/// fuzzy_candidates = 3
/// snippet_width = 60
///
/// [daemon]
/// interval_secs = 5
/// max_files_per_path = 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Which file extensions are indexed
    pub extensions: ExtensionsConfig,

    /// BM25 constants
    pub scoring: ScoringConfig,

    /// Searcher behaviour
    pub search: SearchConfig,

    /// Filesystem daemon settings
    pub daemon: DaemonConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Database directory (None = default data directory)
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// File extension filters.
///
/// Extensions are compared lowercased and without the leading dot. A file
/// with no extension is matched against the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Extensions picked up when a directory is walked (empty = anything not ignored)
    pub allowed: Vec<String>,

    /// Extensions never indexed, even when named directly
    pub ignored: Vec<String>,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        let allowed = [
            "txt", "md", "markdown", "rst", "json", "csv", "tsv", "log", "html", "htm", "xml",
            "yaml", "yml", "toml", "ini", "cfg", "conf", "sh", "py", "rs", "c", "h", "cpp", "hpp",
            "java", "js", "ts", "go", "sql",
        ];
        let ignored = [
            "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "pdf", "zip", "gz", "tgz",
            "bz2", "xz", "tar", "7z", "rar", "exe", "dll", "so", "dylib", "o", "a", "class", "jar",
            "bin", "iso", "mp3", "mp4", "avi", "mov", "wav", "flac", "ds_store", "lock",
        ];
        ExtensionsConfig {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            ignored: ignored.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExtensionsConfig {
    /// Check whether a path's extension is on the ignore list.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        self.ignored.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }

    /// Check whether a path found while walking a directory should be indexed.
    pub fn is_allowed(&self, path: &Path) -> bool {
        if self.is_ignored(path) {
            return false;
        }
        if self.allowed.is_empty() {
            return true;
        }
        let ext = extension_of(path);
        self.allowed.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }
}

/// Lowercased extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// BM25 scoring constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Term-frequency saturation
    pub k1: f64,

    /// Query-frequency saturation
    pub k3: f64,

    /// Document length normalization
    pub b: f64,

    /// Scores are multiplied by this before being rounded to an integer key
    pub granularity: f64,

    /// Query-frequency saturation only applies at or above this many distinct terms
    pub long_query_terms: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            k1: 1.5,
            k3: 1.5,
            b: 0.75,
            granularity: 1_000_000.0,
            long_query_terms: 10,
        }
    }
}

/// Searcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Completions tried for a single-word query
    pub fuzzy_candidates: usize,

    /// Results kept per completion
    pub fuzzy_limit: usize,

    /// Total snippet width in bytes
    pub snippet_width: usize,

    /// Highlights returned per document
    pub max_highlights: usize,

    /// Longest accepted query in bytes (0 = unlimited)
    pub max_query_size: usize,

    /// Deepest accepted nesting of parenthesised expressions
    pub max_parser_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            fuzzy_candidates: 3,
            fuzzy_limit: 10,
            snippet_width: 60,
            max_highlights: 8,
            max_query_size: 4096,
            max_parser_depth: 256,
        }
    }
}

/// Filesystem daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between sync ticks
    pub interval_secs: u64,

    /// Files indexed per watched path (0 = unlimited)
    pub max_files_per_path: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            interval_secs: 5,
            max_files_per_path: 5000,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| QuarryError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| QuarryError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "quarry").ok_or_else(|| QuarryError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("quarry.toml"))
    }

    /// Get the database directory (from config or default).
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.general.data_dir {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("", "", "quarry").ok_or_else(|| QuarryError::ConfigError {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().join("db"))
    }
}
