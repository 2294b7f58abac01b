//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap, including
//! validation of rating inputs against the catalog's scale.

use crate::analysis::{MetricInputs, SortKey};
use crate::config::{StoreBackend, WriteMode};
use crate::models::{Metric, Scale, Viewing, WatchedCopy};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How Spaghetti? - the definitive taxonomy of the Western genre
///
/// Browse, chart and rate a shared catalog of Westerns. Every rating
/// updates a running average per metric in the shared sheet.
///
/// Examples:
///   howspaghetti list --type spaghetti --sort grit --desc
///   howspaghetti show 3
///   howspaghetti rate 3 --overall 8.5 -m grit=9 -m sound_score=10
///   howspaghetti chart --y-metric spaghettiness
///   howspaghetti --store http --url https://sheets.example.com/westerns list
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .howspaghetti.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Catalog backend (file, http, memory)
    #[arg(long, value_name = "BACKEND", global = true, env = "HOWSPAGHETTI_STORE")]
    pub store: Option<StoreBackend>,

    /// Catalog table file for the file backend
    #[arg(long, value_name = "FILE", global = true)]
    pub path: Option<PathBuf>,

    /// Sheet endpoint for the http backend
    #[arg(long, value_name = "URL", global = true, env = "HOWSPAGHETTI_URL")]
    pub url: Option<String>,

    /// Request timeout in seconds for the http backend
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// How ratings are written back
    ///
    /// upsert replaces only the rated row and fails if someone else changed
    /// it; overwrite rewrites the whole sheet (last writer wins).
    #[arg(long, value_name = "MODE", global = true)]
    pub write_mode: Option<WriteMode>,

    /// Seconds a loaded catalog is reused before reading the store again
    #[arg(long, value_name = "SECS", global = true)]
    pub cache_ttl: Option<u64>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Dashboard commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List films, optionally filtered and sorted
    List(ListArgs),

    /// Show every rating of one film
    Show {
        /// Catalog index from `list`
        index: usize,
    },

    /// Submit a rating for one film
    Rate(RateArgs),

    /// Export the Sauce Spectrum scatter series
    Chart {
        /// Metric on the y axis [default: Spaghettiness, or
        /// Spaghetti_Intensity in a legacy catalog]
        #[arg(long, value_name = "METRIC")]
        y_metric: Option<Metric>,

        /// Also write the series as JSON to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Films and mean rating per sub-genre
    Summary {
        /// Metric to average
        #[arg(long, default_value = "Overall", value_name = "METRIC")]
        metric: Metric,
    },

    /// Write the starter catalog to the table file
    Seed {
        /// Replace an existing table file
        #[arg(long)]
        force: bool,
    },

    /// Generate a default .howspaghetti.toml configuration file
    InitConfig,
}

/// Filters and ordering for `list`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only this sub-genre
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<String>,

    /// Earliest release year
    #[arg(long, value_name = "YEAR")]
    pub from: Option<i32>,

    /// Latest release year
    #[arg(long, value_name = "YEAR")]
    pub to: Option<i32>,

    /// Minimum overall rating
    #[arg(long, value_name = "RATING")]
    pub min_rating: Option<f64>,

    /// Title substring
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Sort by title, year or a metric name
    #[arg(long, default_value = "catalog", value_name = "KEY")]
    pub sort: SortKey,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Show at most this many films
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

/// Inputs for `rate`.
#[derive(clap::Args, Debug, Clone)]
pub struct RateArgs {
    /// Catalog index from `list`
    pub index: usize,

    /// Overall enjoyment, fractions allowed
    #[arg(long, value_name = "RATING")]
    pub overall: Option<f64>,

    /// A sub-metric rating, whole numbers only (repeatable)
    ///
    /// Example: -m grit=9 -m "Sound_Score=10"
    #[arg(short = 'm', long = "metric", value_name = "NAME=VALUE", value_parser = parse_metric_input)]
    pub metrics: Vec<(Metric, f64)>,

    /// Which copy you watched (standard, remastered)
    #[arg(long, value_name = "COPY")]
    pub copy: Option<WatchedCopy>,

    /// How much the remaster improves the picture, 1-5
    #[arg(long, value_name = "SCORE", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub visual_upgrade: Option<u8>,
}

impl RateArgs {
    /// Collect the submitted values. `--overall` wins over `-m overall=`.
    pub fn inputs(&self) -> MetricInputs {
        let mut inputs: MetricInputs = self.metrics.iter().copied().collect();
        if let Some(overall) = self.overall {
            inputs.insert(Metric::Overall, overall);
        }
        inputs
    }

    /// Viewing notes, if a copy was named.
    pub fn viewing(&self) -> Option<Viewing> {
        self.copy.map(|copy| Viewing {
            copy,
            visual_upgrade: self.visual_upgrade,
        })
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text tables (default)
    #[default]
    Text,
    /// JSON
    Json,
}

/// Parse a `NAME=VALUE` rating.
pub fn parse_metric_input(s: &str) -> Result<(Metric, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{}'", s))?;
    let metric: Metric = name.trim().parse()?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("Rating for {} is not a number: '{}'", metric, value.trim()))?;
    Ok((metric, value))
}

/// Check submitted values the way the rating widgets constrain them.
pub fn validate_inputs(inputs: &MetricInputs, scale: Scale) -> Result<(), String> {
    if inputs.is_empty() {
        return Err("Nothing to rate: pass --overall and/or --metric NAME=VALUE".to_string());
    }

    for (metric, value) in inputs {
        if !value.is_finite() || !scale.contains(*value) {
            return Err(format!(
                "{} must be between 0 and {} (got {})",
                metric,
                scale.max(),
                value
            ));
        }
        if metric.takes_whole_numbers() && value.fract() != 0.0 {
            return Err(format!("{} takes whole numbers (got {})", metric, value));
        }
    }

    Ok(())
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Sheet URL must start with 'http://' or 'https://'".to_string());
            }
        }

        match &self.command {
            Command::List(list) => {
                if let (Some(from), Some(to)) = (list.from, list.to) {
                    if from > to {
                        return Err(format!("--from {} is after --to {}", from, to));
                    }
                }
                if list.limit == Some(0) {
                    return Err("Limit must be at least 1".to_string());
                }
            }
            Command::Rate(rate) => {
                if rate.overall.is_none() && rate.metrics.is_empty() {
                    return Err(
                        "Nothing to rate: pass --overall and/or --metric NAME=VALUE".to_string()
                    );
                }
                if rate.visual_upgrade.is_some() && rate.copy != Some(WatchedCopy::Remastered) {
                    return Err("--visual-upgrade needs --copy remastered".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
