//! Data models for the Western catalog.
//!
//! This module contains the core data structures shared by the store,
//! the rating aggregator and the report renderers: metrics, rating
//! scales, catalog records and the row key used for keyed writes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// One raw row of the tabular store, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Column holding the film title.
pub const COL_TITLE: &str = "Title";
/// Column holding the release year.
pub const COL_YEAR: &str = "Year";
/// Column holding the sub-genre.
pub const COL_TYPE: &str = "Type";
/// Column holding the poster reference.
pub const COL_POSTER: &str = "Poster_URL";
/// Column holding the shared submission counter.
pub const COL_VOTE_COUNT: &str = "Vote_Count";
/// Legacy display-only column.
pub const COL_REMASTER: &str = "Remaster_Avail";

/// A rated dimension of a film.
///
/// The nine standard metrics are rated independently; `Overall` is the
/// distinguished enjoyment rating stored in `Avg_Rating`. `SpaghettiIntensity`
/// only exists in the legacy 0-5 catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "Overall", alias = "Avg_Rating")]
    Overall,
    #[serde(rename = "Classically_Mythic")]
    ClassicallyMythic,
    #[serde(rename = "Spaghettiness")]
    Spaghettiness,
    #[serde(rename = "Grit")]
    Grit,
    #[serde(rename = "Darkness")]
    Darkness,
    #[serde(rename = "Weird")]
    Weird,
    #[serde(rename = "Shenanigans")]
    Shenanigans,
    #[serde(rename = "Wild_Adventure")]
    WildAdventure,
    #[serde(rename = "Cinematography")]
    Cinematography,
    #[serde(rename = "Sound_Score")]
    SoundScore,
    #[serde(rename = "Spaghetti_Intensity")]
    SpaghettiIntensity,
}

impl Metric {
    /// The nine standard sub-metrics, in display order.
    pub const STANDARD: [Metric; 9] = [
        Metric::ClassicallyMythic,
        Metric::Spaghettiness,
        Metric::Grit,
        Metric::Darkness,
        Metric::Weird,
        Metric::Shenanigans,
        Metric::WildAdventure,
        Metric::Cinematography,
        Metric::SoundScore,
    ];

    const ALL: [Metric; 11] = [
        Metric::Overall,
        Metric::ClassicallyMythic,
        Metric::Spaghettiness,
        Metric::Grit,
        Metric::Darkness,
        Metric::Weird,
        Metric::Shenanigans,
        Metric::WildAdventure,
        Metric::Cinematography,
        Metric::SoundScore,
        Metric::SpaghettiIntensity,
    ];

    /// Column holding the running average.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Overall => "Avg_Rating",
            Metric::ClassicallyMythic => "Classically_Mythic",
            Metric::Spaghettiness => "Spaghettiness",
            Metric::Grit => "Grit",
            Metric::Darkness => "Darkness",
            Metric::Weird => "Weird",
            Metric::Shenanigans => "Shenanigans",
            Metric::WildAdventure => "Wild_Adventure",
            Metric::Cinematography => "Cinematography",
            Metric::SoundScore => "Sound_Score",
            Metric::SpaghettiIntensity => "Spaghetti_Intensity",
        }
    }

    /// Column holding the running sum.
    pub fn sum_column(&self) -> &'static str {
        match self {
            Metric::Overall => "Sum_Rating",
            Metric::ClassicallyMythic => "Sum_Classically_Mythic",
            Metric::Spaghettiness => "Sum_Spaghettiness",
            Metric::Grit => "Sum_Grit",
            Metric::Darkness => "Sum_Darkness",
            Metric::Weird => "Sum_Weird",
            Metric::Shenanigans => "Sum_Shenanigans",
            Metric::WildAdventure => "Sum_Wild_Adventure",
            Metric::Cinematography => "Sum_Cinematography",
            Metric::SoundScore => "Sum_Sound_Score",
            Metric::SpaghettiIntensity => "Sum_Spaghetti",
        }
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Overall => "Enjoyment",
            Metric::ClassicallyMythic => "Classically Mythic",
            Metric::Spaghettiness => "Spaghettiness",
            Metric::Grit => "Grit",
            Metric::Darkness => "Darkness",
            Metric::Weird => "Weird",
            Metric::Shenanigans => "Shenanigans",
            Metric::WildAdventure => "Wild Adventure",
            Metric::Cinematography => "Cinematography",
            Metric::SoundScore => "Sound & Score",
            Metric::SpaghettiIntensity => "How Spaghetti?",
        }
    }

    /// Sub-metrics are rated in whole steps; the overall rating takes fractions.
    pub fn takes_whole_numbers(&self) -> bool {
        !matches!(self, Metric::Overall | Metric::SpaghettiIntensity)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Overall => write!(f, "Overall"),
            other => write!(f, "{}", other.column()),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    /// Accepts column names, labels and a few shorthands, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        match wanted.as_str() {
            "overall" | "avgrating" | "rating" | "enjoyment" => return Ok(Metric::Overall),
            "spaghetti" => return Ok(Metric::SpaghettiIntensity),
            "sound" | "score" => return Ok(Metric::SoundScore),
            _ => {}
        }

        Metric::ALL
            .iter()
            .copied()
            .find(|m| normalize(m.column()) == wanted || normalize(m.label()) == wanted)
            .ok_or_else(|| format!("Unknown metric: {}", s))
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Rating scale of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Current catalog: every metric is rated 0-10.
    #[default]
    Ten,
    /// Legacy catalog: 0-5.
    Five,
}

impl Scale {
    /// Upper bound of the scale.
    pub fn max(&self) -> f64 {
        match self {
            Scale::Ten => 10.0,
            Scale::Five => 5.0,
        }
    }

    /// Midpoint of the scale, used as the default metric value.
    pub fn midpoint(&self) -> f64 {
        self.max() / 2.0
    }

    /// Whether `value` lies on the scale.
    pub fn contains(&self, value: f64) -> bool {
        (0.0..=self.max()).contains(&value)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0-{}", self.max())
    }
}

/// Which release of a film the rater watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WatchedCopy {
    /// Standard / original release
    #[default]
    Standard,
    /// Remastered / 4K release
    Remastered,
}

impl fmt::Display for WatchedCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchedCopy::Standard => write!(f, "Standard / Original"),
            WatchedCopy::Remastered => write!(f, "Remastered / 4K"),
        }
    }
}

/// Viewing notes attached to a rating. Shown back to the rater, never
/// written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewing {
    pub copy: WatchedCopy,
    /// 1-5, remastered copies only.
    pub visual_upgrade: Option<u8>,
}

/// Running statistics of one metric on one record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricStats {
    /// Current running average.
    pub value: f64,
    /// Running sum of every submitted value, seed included.
    pub sum: f64,
}

/// Identity of a catalog row, used for keyed writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub title: String,
    pub year: i32,
}

impl RowKey {
    /// Extract the key from a raw row. Returns `None` without a title.
    pub fn from_row(row: &Row) -> Option<Self> {
        let title = cell_str(row.get(COL_TITLE))?;
        if title.is_empty() {
            return None;
        }
        let year = cell_i32(row.get(COL_YEAR)).unwrap_or(0);
        Some(Self { title, year })
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.year)
    }
}

/// One film in the catalog with its rating statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub title: String,
    pub year: i32,
    /// Sub-genre (the `Type` column).
    pub kind: String,
    pub poster_url: String,
    /// Legacy display-only flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaster_available: Option<bool>,
    /// Submissions applied to this record, shared by every metric.
    pub vote_count: u32,
    pub metrics: BTreeMap<Metric, MetricStats>,
    /// Columns the catalog does not interpret, written back untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: Row,
    /// Identity columns the source row lacked. They show display defaults
    /// here and stay absent when the row is written back.
    #[serde(skip)]
    pub absent: BTreeSet<&'static str>,
}

impl CatalogRecord {
    /// Key used to address this record in the store.
    pub fn key(&self) -> RowKey {
        RowKey {
            title: self.title.clone(),
            year: self.year,
        }
    }

    /// Current running average of `metric`.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).map(|s| s.value)
    }

    /// Current running sum of `metric`.
    pub fn sum(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).map(|s| s.sum)
    }

    /// Overall enjoyment rating.
    pub fn overall(&self) -> f64 {
        self.value(Metric::Overall).unwrap_or(0.0)
    }
}

/// Read a cell as a number; spreadsheet cells may carry numbers as text.
pub fn cell_f64(cell: Option<&Value>) -> Option<f64> {
    let parsed = match cell? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Read a cell as an integer year or count.
pub fn cell_i32(cell: Option<&Value>) -> Option<i32> {
    cell_f64(cell).map(|v| v.round() as i32)
}

/// Read a cell as text.
pub fn cell_str(cell: Option<&Value>) -> Option<String> {
    match cell? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a cell as a checkbox.
pub fn cell_bool(cell: Option<&Value>) -> Option<bool> {
    match cell? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_from_str() {
        assert_eq!("grit".parse::<Metric>().unwrap(), Metric::Grit);
        assert_eq!("Sound_Score".parse::<Metric>().unwrap(), Metric::SoundScore);
        assert_eq!("wild-adventure".parse::<Metric>().unwrap(), Metric::WildAdventure);
        assert_eq!("Avg_Rating".parse::<Metric>().unwrap(), Metric::Overall);
        assert_eq!("overall".parse::<Metric>().unwrap(), Metric::Overall);
        assert_eq!(
            "Spaghetti_Intensity".parse::<Metric>().unwrap(),
            Metric::SpaghettiIntensity
        );
        assert!("tumbleweeds".parse::<Metric>().is_err());
    }

    #[test]
    fn test_metric_columns() {
        assert_eq!(Metric::Overall.column(), "Avg_Rating");
        assert_eq!(Metric::Overall.sum_column(), "Sum_Rating");
        assert_eq!(Metric::Grit.sum_column(), "Sum_Grit");
        assert_eq!(Metric::SpaghettiIntensity.sum_column(), "Sum_Spaghetti");
        for metric in Metric::STANDARD {
            assert_eq!(metric.sum_column(), format!("Sum_{}", metric.column()));
        }
    }

    #[test]
    fn test_scale() {
        assert_eq!(Scale::Ten.midpoint(), 5.0);
        assert_eq!(Scale::Five.max(), 5.0);
        assert!(Scale::Five.contains(5.0));
        assert!(!Scale::Five.contains(6.0));
        assert!(!Scale::Ten.contains(-1.0));
    }

    #[test]
    fn test_cell_parsing() {
        assert_eq!(cell_f64(Some(&json!(7.5))), Some(7.5));
        assert_eq!(cell_f64(Some(&json!(" 3 "))), Some(3.0));
        assert_eq!(cell_f64(Some(&json!(""))), None);
        assert_eq!(cell_f64(Some(&Value::Null)), None);
        assert_eq!(cell_f64(None), None);
        assert_eq!(cell_i32(Some(&json!("1966.0"))), Some(1966));
        assert_eq!(cell_bool(Some(&json!("TRUE"))), Some(true));
        assert_eq!(cell_bool(Some(&json!(0))), Some(false));
    }

    #[test]
    fn test_row_key() {
        let mut row = Row::new();
        row.insert(COL_TITLE.to_string(), json!("Django"));
        row.insert(COL_YEAR.to_string(), json!(1966));
        let key = RowKey::from_row(&row).unwrap();
        assert_eq!(key.to_string(), "Django (1966)");

        row.insert(COL_TITLE.to_string(), json!("  "));
        assert!(RowKey::from_row(&row).is_none());
    }
}
