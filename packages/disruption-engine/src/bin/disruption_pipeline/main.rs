//! Batch pipeline CLI
//!
//! `extract` turns an articles JSONL file into events; `validate` checks
//! an events file against one or more incident datasets.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use disruption_engine::ai::OpenAiGenerator;
use disruption_engine::output::{write_events_csv, write_jsonl, write_matches_csv};
use disruption_engine::{
    consolidate, Event, ExtractionEngine, JsonlArticleSource, MemoryStore, Store, ValidationEngine,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{credentials_from_env, dataset_adapter, PipelineConfig};

#[derive(Parser)]
#[command(name = "disruption-pipeline")]
#[command(about = "Extract supply-chain disruption events and validate them against incident datasets")]
#[command(version)]
struct Cli {
    /// JSON file with `extraction` and `validation` tuning sections
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract events from an articles JSONL file
    Extract {
        /// Articles, one JSON object per line
        #[arg(short, long)]
        articles: PathBuf,

        /// Directory for events.jsonl, events.csv, consolidated.jsonl and
        /// extraction_report.json
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Fail on the first undecodable line instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Persist events and cached responses (e.g. sqlite:./events.db?mode=rwc)
        #[cfg(feature = "sqlite")]
        #[arg(long)]
        db: Option<String>,
    },

    /// Validate events against external datasets
    Validate {
        /// Events, one JSON object per line
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Dataset as KIND=SOURCE, where KIND is acled, gdacs, maritime or
        /// political and SOURCE is a JSON file or URL. Repeatable.
        #[arg(short, long = "dataset", required = true)]
        datasets: Vec<String>,

        /// Directory for per-dataset match files and validation_run.json
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Read events from this store and attach match references to them
        #[cfg(feature = "sqlite")]
        #[arg(long)]
        db: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,disruption_engine=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let cancel = shutdown_token();

    match cli.command {
        Commands::Extract {
            articles,
            out_dir,
            strict,
            #[cfg(feature = "sqlite")]
            db,
        } => {
            let source = JsonlArticleSource::new(articles).strict(strict);

            #[cfg(feature = "sqlite")]
            if let Some(url) = db {
                let store = disruption_engine::SqliteStore::new(&url)
                    .await
                    .context("Failed to open event store")?;
                return extract(store, &source, config, &out_dir, &cancel).await;
            }

            extract(MemoryStore::new(), &source, config, &out_dir, &cancel).await
        }
        Commands::Validate {
            events,
            datasets,
            out_dir,
            #[cfg(feature = "sqlite")]
            db,
        } => {
            let mut engine = ValidationEngine::new(config.validation).context("Invalid validation config")?;
            for spec in &datasets {
                engine.register(Arc::from(dataset_adapter(spec)?));
            }

            #[cfg(feature = "sqlite")]
            if let Some(url) = db {
                let store = disruption_engine::SqliteStore::new(&url)
                    .await
                    .context("Failed to open event store")?;
                let events = disruption_engine::EventStore::collect_all(&store)
                    .await
                    .context("Failed to read events from store")?;
                let run = validate(&engine, &events, &out_dir).await?;
                let attached = disruption_engine::attach_matches(&store, &run).await?;
                info!(attached, "Match references attached to stored events");
                return Ok(());
            }

            let Some(path) = events else {
                anyhow::bail!("--events is required unless events are read from a store");
            };
            let events = read_events(&path)?;
            validate(&engine, &events, &out_dir).await.map(|_| ())
        }
    }
}

/// A token cancelled on Ctrl-C.
///
/// In-flight articles finish; articles not yet started are reported as
/// cancelled.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight articles");
            token.cancel();
        }
    });
    cancel
}

async fn extract<S: Store>(
    store: S,
    source: &JsonlArticleSource,
    config: PipelineConfig,
    out_dir: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let credentials = credentials_from_env()?;
    let generator = OpenAiGenerator::from_credentials(credentials);
    let dedup_window = config.extraction.dedup_window_days;

    let engine = ExtractionEngine::with_config(store, generator, config.extraction)
        .context("Invalid extraction config")?;
    let report = engine.run_source(source, cancel).await.context("Extraction run failed")?;

    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let events: Vec<Event> = report.events().cloned().collect();
    write_jsonl(create(&out_dir.join("events.jsonl"))?, &events)?;
    write_events_csv(create(&out_dir.join("events.csv"))?, &events)?;

    let consolidated = consolidate(&events, dedup_window);
    write_jsonl(create(&out_dir.join("consolidated.jsonl"))?, &consolidated)?;

    serde_json::to_writer_pretty(create(&out_dir.join("extraction_report.json"))?, &report)?;

    if !report.reconciles() {
        warn!(run_id = %report.run_id, "Report does not account for every article");
    }
    info!(
        run_id = %report.run_id,
        events = events.len(),
        consolidated = consolidated.len(),
        out_dir = %out_dir.display(),
        "Extraction output written"
    );
    Ok(())
}

async fn validate(
    engine: &ValidationEngine,
    events: &[Event],
    out_dir: &Path,
) -> Result<disruption_engine::ValidationRun> {
    let run = engine.validate_all(events).await.context("Validation run failed")?;

    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for report in &run.datasets {
        if report.is_skipped() {
            warn!(dataset = %report.dataset_name, status = ?report.status, "Dataset skipped");
            continue;
        }
        let name = &report.dataset_name;
        write_jsonl(create(&out_dir.join(format!("matches_{name}.jsonl")))?, &report.matches)?;
        write_matches_csv(create(&out_dir.join(format!("matches_{name}.csv")))?, &report.matches)?;
        info!(
            dataset = %name,
            tiers = ?report.tier_counts(),
            coverage = report.coverage.ratio(),
            mapping_gaps = report.mapping_gaps.len(),
            skipped_records = report.skipped_records.len(),
            "Dataset validated"
        );
    }

    serde_json::to_writer_pretty(create(&out_dir.join("validation_run.json"))?, &run)?;
    Ok(run)
}

/// Read events written by `extract`. Blank lines are ignored.
fn read_events(path: &Path) -> Result<Vec<Event>> {
    let body = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("{}:{}: invalid event", path.display(), i + 1))
        })
        .collect()
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}
