//! How Spaghetti? - a crowd-rated taxonomy of Westerns
//!
//! A CLI dashboard over a shared catalog of Western films. Users browse and
//! chart the catalog and submit ratings, which update per-film running
//! averages in the shared sheet.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (store unreachable, malformed catalog, bad input, etc.)
//!   3 - Rating not saved because the film changed concurrently

mod analysis;
mod catalog;
mod cli;
mod config;
mod models;
mod report;
mod store;

use analysis::{CatalogFilter, MetricInputs};
use anyhow::{bail, Context, Result};
use catalog::{Phase, Session};
use cli::{Args, Command, ListArgs, OutputFormat, RateArgs};
use config::{Config, StoreBackend};
use indicatif::{ProgressBar, ProgressStyle};
use models::Metric;
use std::path::PathBuf;
use std::time::Duration;
use store::FileStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit code for a rating that lost to a concurrent change.
const EXIT_CONFLICT: i32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("How Spaghetti? v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .howspaghetti.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to choose the store, rating scale and cache window.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Dispatch the subcommand. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    debug!("Effective config: {:?}", config);

    // Seeding writes the table file and never reads it
    if let Command::Seed { force } = args.command {
        return handle_seed(&config, force).await;
    }

    let store = store::open_store(&config.store).context("Failed to open the catalog store")?;
    let source = store.describe();

    let spinner = (!args.quiet).then(|| loading_spinner(&format!("Loading catalog from {}", source)));
    let opened = Session::open(store, &config).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let mut session = opened.context("Could not load the catalog")?;

    let format = config.general.format;
    match args.command {
        Command::List(ref list) => handle_list(&mut session, list, format).await,
        Command::Show { index } => handle_show(&mut session, index, format).await,
        Command::Rate(ref rate) => handle_rate(&mut session, rate, format).await,
        Command::Chart {
            y_metric,
            ref output,
        } => {
            let y_metric = y_metric.unwrap_or_else(|| session.ratings().sauce_metric());
            handle_chart(&mut session, y_metric, output.as_ref(), format).await
        }
        Command::Summary { metric } => handle_summary(&mut session, metric, format).await,
        Command::Seed { .. } | Command::InitConfig => Ok(0),
    }
}

/// Columns shown by `list`: overall enjoyment plus the sauce metrics the
/// catalog tracks.
fn list_columns(session: &Session) -> Vec<Metric> {
    [
        Metric::Overall,
        Metric::Spaghettiness,
        Metric::SpaghettiIntensity,
        Metric::Grit,
        Metric::Weird,
    ]
    .into_iter()
    .filter(|m| session.ratings().tracks(*m))
    .collect()
}

async fn handle_list(session: &mut Session, list: &ListArgs, format: OutputFormat) -> Result<i32> {
    let columns = list_columns(session);
    let filter = CatalogFilter {
        kind: list.kind.clone(),
        year_from: list.from,
        year_to: list.to,
        min_overall: list.min_rating,
        title_contains: list.search.clone(),
    };

    let catalog = session.catalog().await?;
    let mut entries = analysis::filter_records(catalog.records(), &filter);
    analysis::sort_entries(&mut entries, list.sort, list.desc);
    if let Some(limit) = list.limit {
        entries.truncate(limit);
    }
    info!("{} of {} films match", entries.len(), catalog.len());

    match format {
        OutputFormat::Json => println!("{}", report::generate_catalog_json(&entries)?),
        OutputFormat::Text => {
            println!("{}", report::generate_catalog_table(&entries, &columns));
            println!("   {} of {} films", entries.len(), catalog.len());
            if catalog.backfilled() > 0 {
                println!(
                    "   ({} films had missing rating columns filled with defaults)",
                    catalog.backfilled()
                );
            }
        }
    }

    Ok(0)
}

async fn handle_show(session: &mut Session, index: usize, format: OutputFormat) -> Result<i32> {
    let scale = session.ratings().scale;
    let record = session.select(index).await?.clone();

    match format {
        OutputFormat::Json => println!("{}", report::generate_json(&record)?),
        OutputFormat::Text => {
            let catalog = session.catalog().await?;
            println!(
                "{}",
                report::generate_record_detail(index, &record, catalog, scale)
            );
        }
    }

    Ok(0)
}

async fn handle_rate(session: &mut Session, rate: &RateArgs, format: OutputFormat) -> Result<i32> {
    let inputs: MetricInputs = rate.inputs();
    if let Err(e) = cli::validate_inputs(&inputs, session.ratings().scale) {
        eprintln!("Error: {}", e);
        return Ok(1);
    }

    let before = session.select(rate.index).await?.clone();
    println!("🤠 Submitting rating for {} ({})...", before.title, before.year);

    match session.submit(rate.index, &inputs).await {
        Ok(after) => {
            debug!("Session phase after rating: {:?}", session.phase());
            match format {
                OutputFormat::Json => println!("{}", report::generate_json(&after)?),
                OutputFormat::Text => {
                    let viewing = rate.viewing();
                    println!(
                        "{}",
                        report::generate_rating_receipt(&before, &after, &inputs, viewing.as_ref())
                    );
                    println!("✅ Rating saved.");
                    if session.phase() != Phase::Persisted {
                        println!("   The catalog could not be refreshed; the next command reloads it.");
                    }
                }
            }
            Ok(0)
        }
        Err(e) if e.is_conflict() => {
            warn!("{}", e);
            eprintln!(
                "\n⛔ {} was changed by someone else while you were rating. Nothing was saved; reload and try again.",
                before.title
            );
            Ok(EXIT_CONFLICT)
        }
        Err(e) => Err(e).context("Rating was not saved"),
    }
}

async fn handle_chart(
    session: &mut Session,
    y_metric: Metric,
    output: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<i32> {
    if !session.ratings().tracks(y_metric) {
        bail!("{} is not rated in this catalog", y_metric);
    }

    let catalog = session.catalog().await?;
    let points = analysis::sauce_spectrum(catalog.records(), y_metric);

    if let Some(path) = output {
        report::write_json(&points, path)
            .with_context(|| format!("Failed to write chart to {}", path.display()))?;
        info!("Chart series written to {}", path.display());
    }

    match format {
        OutputFormat::Json => println!("{}", report::generate_json(&points)?),
        OutputFormat::Text => println!("{}", report::generate_spectrum_text(&points, y_metric)),
    }

    Ok(0)
}

async fn handle_summary(session: &mut Session, metric: Metric, format: OutputFormat) -> Result<i32> {
    if !session.ratings().tracks(metric) {
        bail!("{} is not rated in this catalog", metric);
    }

    let catalog = session.catalog().await?;
    let summaries = analysis::type_summaries(catalog.records(), metric);

    match format {
        OutputFormat::Json => println!("{}", report::generate_json(&summaries)?),
        OutputFormat::Text => {
            println!("{}", report::generate_type_summary(&summaries, metric));

            let top = analysis::top_rated(catalog.records(), metric, 3);
            if !top.is_empty() {
                println!("🏆 Top {}:", metric.label());
                for (index, record) in top {
                    println!(
                        "   [{}] {} ({}) - {:.2}",
                        index,
                        record.title,
                        record.year,
                        record.value(metric).unwrap_or(0.0)
                    );
                }
            }
        }
    }

    Ok(0)
}

/// Handle seed: write the starter catalog to the table file.
async fn handle_seed(config: &Config, force: bool) -> Result<i32> {
    if config.store.backend != StoreBackend::File {
        bail!("seed writes a local table file; run it with --store file");
    }

    let rows = catalog::seed::starter_rows().context("Starter catalog is malformed")?;
    let count = rows.len();
    let store = FileStore::new(config.store.path.clone());

    if let Err(e) = store.create(rows, force).await {
        eprintln!("⚠️  {}. Pass --force to replace it.", e);
        return Ok(1);
    }

    println!(
        "✅ Wrote {} films to {}",
        count,
        store.path().display()
    );
    Ok(0)
}

fn loading_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
