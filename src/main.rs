//! Streamify - activity log batch processor
//!
//! Aggregates raw activity events into per-video counts, uploads the
//! summary to object storage and archives the raw events. Meant to be run
//! on a fixed interval by an external scheduler.
//!
//! Exit codes:
//!   0 - Success (including "nothing to process")
//!   1 - Fatal error (configuration, aggregation, summary write)
//!   2 - Summary written but some raw records failed to archive

mod analysis;
mod archive;
mod batch;
mod cli;
mod config;
mod error;
mod models;
mod pending;
mod producer;
mod report;
mod storage;

use anyhow::{Context, Result};
use batch::{BatchConfig, BatchCoordinator, BatchOutcome};
use cli::Args;
use config::Config;
use pending::PendingArea;
use storage::{ObjectStore, Store};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Streamify v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Batch run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .streamify.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  .streamify.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .streamify.toml")?;

    println!("✅ Created .streamify.toml with default settings.");
    println!("   Set [storage].bucket before running a batch.");
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
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the selected mode. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let pending = PendingArea::new(config.paths.pending_dir.clone());

    // The producer only touches the pending directory.
    if let Some(count) = args.generate {
        return handle_generate(&config, count);
    }

    // Everything else needs a valid bucket before any work starts.
    config.validate()?;

    if args.dry_run {
        return handle_dry_run(&pending, &config);
    }

    let store = Store::from_config(&config.storage, args.access_token.clone())?;
    info!("Using bucket {}", store.location());

    if args.latest {
        return handle_latest(&store, &config).await;
    }

    println!("📥 Processing pending logs in {}", pending.dir().display());

    let mut batch_config = BatchConfig::from(&config);
    batch_config.show_progress = !args.quiet;

    let coordinator = BatchCoordinator::new(&store, &pending, batch_config);
    let outcome = coordinator.run().await?;

    match &outcome {
        BatchOutcome::Empty => {
            println!("✅ No new log files to process.");
        }
        BatchOutcome::Processed(run) => {
            println!("\n📊 Batch Summary:");
            println!("   Records: {}", run.batch_size);
            if run.unparsed > 0 {
                println!("   Unparseable (archived anyway): {}", run.unparsed);
            }
            println!("   Distinct {}: {}", config.aggregation.entity_field, run.summary.len());
            println!("   Counted events: {}", run.summary.total());
            if run.summary.is_empty() {
                warn!("No record carried a {}; the summary is empty", config.aggregation.entity_field);
            }
            println!(
                "   Summary: {}/{}",
                store.location(),
                run.summary_key
            );
            println!(
                "   Archived: {} of {}",
                run.archive.archived.len(),
                run.batch_size
            );

            if !run.archive.is_complete() {
                for (name, e) in &run.archive.failed {
                    warn!("Left in pending area: {} ({})", name, e);
                }
                eprintln!(
                    "\n⛔ {} raw records could not be archived; they remain pending (exit code 2).",
                    run.archive.failed.len()
                );
            }
        }
    }

    Ok(if outcome.is_success() { 0 } else { 2 })
}

/// Handle --generate: write synthetic events into the pending directory.
fn handle_generate(config: &Config, count: usize) -> Result<i32> {
    let dir = &config.paths.pending_dir;
    println!("🎬 Generating {} raw logs in {}", count, dir.display());

    let producer = producer::EventProducer::new(dir.clone());
    let receipts = producer.simulate(count)?;

    for (i, receipt) in receipts.iter().enumerate() {
        debug!(
            "{}/{}: event {} {} ({})",
            i + 1,
            count,
            receipt.event_id,
            receipt.status,
            receipt.path.display()
        );
    }

    println!("✅ Created {} events.", receipts.len());
    Ok(0)
}

/// Handle --dry-run: aggregate the pending batch, write and delete nothing.
fn handle_dry_run(pending: &PendingArea, config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: aggregating pending logs (nothing is uploaded or deleted)...\n");

    let batch = pending.list()?;
    if batch.is_empty() {
        println!("   No new log files to process.");
        return Ok(0);
    }

    let aggregation = analysis::aggregate(pending, batch, &config.aggregation.entity_field)?;

    let bytes: u64 = aggregation.batch.iter().map(|r| r.size).sum();
    println!("   Records: {} ({} bytes)", aggregation.batch.len(), bytes);
    println!("   Unparseable: {}", aggregation.unparsed.len());
    println!("   Distinct {}: {}", config.aggregation.entity_field, aggregation.summary.len());
    println!("\n   Top entries:");
    for (entity, count) in aggregation.summary.top(10) {
        println!("     {:>6}  {}", count, entity);
    }

    println!("\n✅ Dry run complete. No storage writes were made.");
    Ok(0)
}

/// Handle --latest: print the newest summary artifact.
async fn handle_latest<S: ObjectStore>(store: &S, config: &Config) -> Result<i32> {
    let prefix = format!("{}/", config.layout.processed_prefix);
    let keys = store.list(&prefix).await?;

    let Some(latest) = report::latest_artifact(&keys) else {
        println!("No summaries under {}/{}", store.location(), prefix);
        return Ok(0);
    };

    let body = store.get(latest).await?;
    let summary: models::AggregateSummary = serde_json::from_slice(&body)
        .with_context(|| format!("Summary {} is not a JSON object of counts", latest))?;

    println!("📄 {}/{}", store.location(), latest);
    println!("   Distinct entities: {}", summary.len());
    println!("   Total events: {}", summary.total());
    for (entity, count) in summary.top(10) {
        println!("     {:>6}  {}", count, entity);
    }
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // A file that exists but does not parse stops the run.
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use storage::testing::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_dry_run_leaves_pending_area_untouched() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("event_1.json"), r#"{"video_id": "v1"}"#).unwrap();
        fs::write(dir.path().join("event_2.json"), "not json").unwrap();
        let pending = PendingArea::new(dir.path().to_path_buf());

        assert_eq!(handle_dry_run(&pending, &Config::default()).unwrap(), 0);
        assert_eq!(pending.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_latest_reads_newest_summary() {
        let store = MemoryStore::default();
        for (key, body) in [
            ("processed/summary_20250101000000.json", "not json"),
            ("processed/summary_20250101001000.json", r#"{"v1":3}"#),
        ] {
            store
                .put(key, body.as_bytes().to_vec(), "application/json", storage::PutMode::Create)
                .await
                .unwrap();
        }

        assert_eq!(handle_latest(&store, &Config::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_latest_rejects_malformed_summary() {
        let store = MemoryStore::default();
        store
            .put(
                "processed/summary_20250101000000.json",
                b"[1, 2]".to_vec(),
                "application/json",
                storage::PutMode::Create,
            )
            .await
            .unwrap();

        assert!(handle_latest(&store, &Config::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_with_no_summaries() {
        let store = MemoryStore::default();
        assert_eq!(handle_latest(&store, &Config::default()).await.unwrap(), 0);
    }
}
