//! Dashboard output generation.
//!
//! Text views are built as plain strings for the terminal; every view that
//! has a machine-readable form also has a JSON counterpart.

use crate::analysis::{Entry, MetricInputs, SpectrumPoint, TypeSummary};
use crate::catalog::Catalog;
use crate::models::{CatalogRecord, Metric, Scale, Viewing};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const TITLE_WIDTH: usize = 34;

/// Generate the catalog table for `list`.
pub fn generate_catalog_table(entries: &[Entry<'_>], columns: &[Metric]) -> String {
    let mut output = String::new();

    if entries.is_empty() {
        output.push_str("No films match.\n");
        return output;
    }

    output.push_str(&format!(
        "{:>4}  {:<width$} {:>4}  {:<12}",
        "#",
        "Title",
        "Year",
        "Type",
        width = TITLE_WIDTH
    ));
    for metric in columns {
        output.push_str(&format!(" {:>7}", short_label(*metric)));
    }
    output.push_str(&format!(" {:>6}\n", "Votes"));

    for (index, record) in entries {
        output.push_str(&format!(
            "{:>4}  {:<width$} {:>4}  {:<12}",
            index,
            truncate(&record.title, TITLE_WIDTH),
            record.year,
            truncate(&record.kind, 12),
            width = TITLE_WIDTH
        ));
        for metric in columns {
            match record.value(*metric) {
                Some(value) => output.push_str(&format!(" {:>7.2}", value)),
                None => output.push_str(&format!(" {:>7}", "-")),
            }
        }
        output.push_str(&format!(" {:>6}\n", record.vote_count));
    }

    output
}

/// Generate the drill-down view of one film.
pub fn generate_record_detail(
    index: usize,
    record: &CatalogRecord,
    catalog: &Catalog,
    scale: Scale,
) -> String {
    let mut section = String::new();

    section.push_str(&format!("🎬 {} ({})\n", record.title, record.year));
    section.push_str(&format!("   Index: {}\n", index));
    section.push_str(&format!("   Type: {}\n", record.kind));
    if !record.poster_url.is_empty() {
        section.push_str(&format!("   Poster: {}\n", record.poster_url));
    }
    if let Some(remaster) = record.remaster_available {
        section.push_str(&format!(
            "   Remaster available: {}\n",
            if remaster { "yes" } else { "no" }
        ));
    }
    section.push_str(&format!("   Votes: {}\n", record.vote_count));
    section.push('\n');

    section.push_str(&format!(
        "   {:<26} {:>8} {:>10}\n",
        format!("Rating (0-{})", scale.max()),
        "Average",
        "Sum"
    ));
    for (metric, stats) in &record.metrics {
        section.push_str(&format!(
            "   {:<26} {:>8.2} {:>10.2}\n",
            metric.label(),
            stats.value,
            stats.sum
        ));
    }

    section.push_str(&format!(
        "\n   Loaded {} (revision {})\n",
        catalog.loaded_at().format("%Y-%m-%d %H:%M:%S UTC"),
        catalog.revision()
    ));

    section
}

/// Generate the before/after receipt for a submitted rating.
pub fn generate_rating_receipt(
    before: &CatalogRecord,
    after: &CatalogRecord,
    inputs: &MetricInputs,
    viewing: Option<&Viewing>,
) -> String {
    let mut receipt = String::new();

    receipt.push_str(&format!("🗳️  Rated {} ({})\n", after.title, after.year));
    receipt.push_str(&format!(
        "   Votes: {} -> {}\n",
        before.vote_count, after.vote_count
    ));

    for (metric, input) in inputs {
        let old = before.value(*metric).unwrap_or(0.0);
        let new = after.value(*metric).unwrap_or(0.0);
        receipt.push_str(&format!(
            "   {:<26} you: {:>5.1}   avg: {:>5.2} -> {:>5.2}\n",
            metric.label(),
            input,
            old,
            new
        ));
    }

    if let Some(viewing) = viewing {
        receipt.push_str(&format!("   📼 Watched: {}\n", viewing.copy));
        if let Some(score) = viewing.visual_upgrade {
            receipt.push_str(&format!("   ✨ Visual upgrade: {}/5\n", score));
        }
    }

    receipt
}

/// Generate the per sub-genre summary.
pub fn generate_type_summary(summaries: &[TypeSummary], metric: Metric) -> String {
    let mut output = String::new();

    output.push_str(&format!("📊 {} by sub-genre\n\n", metric.label()));
    output.push_str(&format!("   {:<16} {:>5} {:>8}\n", "Type", "Films", "Mean"));

    for summary in summaries {
        let mean = summary
            .mean
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "   {:<16} {:>5} {:>8}\n",
            truncate(&summary.kind, 16),
            summary.films,
            mean
        ));
    }

    output
}

/// Generate a text rendition of the Sauce Spectrum series.
pub fn generate_spectrum_text(points: &[SpectrumPoint], metric: Metric) -> String {
    let mut output = String::new();

    output.push_str(&format!("🍝 Sauce Spectrum: {} vs. year\n\n", metric.label()));
    if points.is_empty() {
        output.push_str("   Nothing to plot.\n");
        return output;
    }

    let mut sorted: Vec<&SpectrumPoint> = points.iter().collect();
    sorted.sort_by_key(|p| p.year);

    for point in sorted {
        // one mark per whole point of sauce
        let bar = "█".repeat(point.sauce.round().max(0.0) as usize);
        output.push_str(&format!(
            "   {:>4}  {:<10} {:<24} {:>5.2} (overall {:.1})\n",
            point.year,
            bar,
            truncate(&point.title, 24),
            point.sauce,
            point.enjoyment
        ));
    }

    output
}

/// A listed record with its catalog index.
#[derive(Debug, Serialize)]
pub struct ListedRecord<'a> {
    pub index: usize,
    #[serde(flatten)]
    pub record: &'a CatalogRecord,
}

/// Generate the JSON listing for `list`.
pub fn generate_catalog_json(entries: &[Entry<'_>]) -> Result<String> {
    let listed: Vec<ListedRecord<'_>> = entries
        .iter()
        .map(|(index, record)| ListedRecord {
            index: *index,
            record: *record,
        })
        .collect();
    generate_json(&listed)
}

/// Serialize any view to pretty JSON.
pub fn generate_json<T: Serialize + ?Sized>(view: &T) -> Result<String> {
    serde_json::to_string_pretty(view).map_err(Into::into)
}

/// Write a JSON export to a file.
pub fn write_json<T: Serialize + ?Sized>(view: &T, path: &Path) -> Result<()> {
    let content = generate_json(view)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

fn short_label(metric: Metric) -> &'static str {
    match metric {
        Metric::Overall => "Overall",
        Metric::ClassicallyMythic => "Mythic",
        Metric::Spaghettiness => "Sauce",
        Metric::Grit => "Grit",
        Metric::Darkness => "Dark",
        Metric::Weird => "Weird",
        Metric::Shenanigans => "Shenan",
        Metric::WildAdventure => "Wild",
        Metric::Cinematography => "Cinema",
        Metric::SoundScore => "Sound",
        Metric::SpaghettiIntensity => "Sauce",
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
