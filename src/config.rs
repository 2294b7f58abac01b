//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.howspaghetti.toml` files.

use crate::cli::OutputFormat;
use crate::models::{Metric, Scale};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".howspaghetti.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Catalog store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Rating settings.
    #[serde(default)]
    pub ratings: RatingsConfig,

    /// Catalog cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Which backend holds the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON table file on disk
    #[default]
    File,
    /// Spreadsheet web endpoint
    Http,
    /// In-process table seeded with the starter catalog
    Memory,
}

/// How a submission is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace only the rated row, failing if it changed since load
    #[default]
    Upsert,
    /// Rewrite the whole table (last writer wins)
    Overwrite,
}

/// Catalog store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Path of the table file (file backend).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Endpoint URL (http backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Request timeout in seconds (http backend).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Write-back strategy.
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            url: None,
            timeout_seconds: default_timeout(),
            write_mode: WriteMode::default(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("westerns.json")
}

fn default_timeout() -> u64 {
    30
}

/// Rating settings: which metrics are tracked and how missing columns
/// are filled in at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingsConfig {
    /// Tracked sub-metrics. Overall is always tracked.
    #[serde(default = "default_metrics")]
    pub metrics: Vec<Metric>,

    /// Value given to a metric column that is missing. Defaults to the
    /// midpoint of the scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f64>,

    /// Vote count given to a record without one.
    #[serde(default = "default_initial_vote_count")]
    pub initial_vote_count: u32,

    /// Rating scale.
    #[serde(default)]
    pub scale: Scale,
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
            default_value: None,
            initial_vote_count: default_initial_vote_count(),
            scale: Scale::default(),
        }
    }
}

fn default_metrics() -> Vec<Metric> {
    Metric::STANDARD.to_vec()
}

fn default_initial_vote_count() -> u32 {
    1
}

impl RatingsConfig {
    /// The legacy single-metric 0-5 catalog.
    pub fn legacy() -> Self {
        Self {
            metrics: vec![Metric::SpaghettiIntensity],
            default_value: None,
            initial_vote_count: default_initial_vote_count(),
            scale: Scale::Five,
        }
    }

    /// Value used for a missing metric column.
    pub fn midpoint(&self) -> f64 {
        self.default_value.unwrap_or_else(|| self.scale.midpoint())
    }

    /// Overall first, then the configured sub-metrics without duplicates.
    pub fn tracked_metrics(&self) -> Vec<Metric> {
        let mut tracked = vec![Metric::Overall];
        for metric in &self.metrics {
            if !tracked.contains(metric) {
                tracked.push(*metric);
            }
        }
        tracked
    }

    /// Whether submissions for `metric` are accepted.
    pub fn tracks(&self, metric: Metric) -> bool {
        metric == Metric::Overall || self.metrics.contains(&metric)
    }

    /// Default y axis of the Sauce Spectrum: `Spaghettiness`, or the legacy
    /// `Spaghetti_Intensity` when only that one is tracked.
    pub fn sauce_metric(&self) -> Metric {
        if !self.tracks(Metric::Spaghettiness) && self.tracks(Metric::SpaghettiIntensity) {
            Metric::SpaghettiIntensity
        } else {
            Metric::Spaghettiness
        }
    }
}

/// Catalog cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a loaded catalog stays fresh.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    60
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(backend) = args.store {
            self.store.backend = backend;
        }
        if let Some(ref path) = args.path {
            self.store.path = path.clone();
        }
        if let Some(ref url) = args.url {
            self.store.url = Some(url.clone());
        }
        if let Some(timeout) = args.timeout {
            self.store.timeout_seconds = timeout;
        }
        if let Some(mode) = args.write_mode {
            self.store.write_mode = mode;
        }

        if let Some(ttl) = args.cache_ttl {
            self.cache.ttl_seconds = ttl;
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
