//! Batch coordination.
//!
//! One call to [`BatchCoordinator::run`] is one scheduled invocation:
//!
//! ```text
//! list -> [empty: done]
//!      -> aggregate -> write summary -> archive -> done
//! ```
//!
//! The summary must be durably written before any raw record is touched.
//! Any error in listing, aggregation or the summary write returns early,
//! leaving the pending area exactly as it was. Archival is best-effort
//! per record and its failures are reported in the outcome.
//!
//! Concurrent runs against the same pending directory are not excluded;
//! the scheduler interval is expected to be far longer than a run.

use crate::analysis::aggregate;
use crate::archive::{ArchiveReport, Archiver};
use crate::error::Result;
use crate::models::AggregateSummary;
use crate::pending::PendingArea;
use crate::report::SummaryWriter;
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

/// Settings for one coordinator.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub entity_field: String,
    pub processed_prefix: String,
    pub archive_prefix: String,
    pub staging_dir: Option<PathBuf>,
    pub show_progress: bool,
}

impl From<&crate::config::Config> for BatchConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            entity_field: config.aggregation.entity_field.clone(),
            processed_prefix: config.layout.processed_prefix.clone(),
            archive_prefix: config.layout.archive_prefix.clone(),
            staging_dir: config.paths.staging_dir.clone(),
            show_progress: false,
        }
    }
}

/// What a completed run did.
#[derive(Debug)]
pub enum BatchOutcome {
    /// The pending area was empty; nothing was written or moved.
    Empty,
    /// A summary was written and archival was attempted for the whole batch.
    Processed(BatchRun),
}

#[derive(Debug)]
pub struct BatchRun {
    /// Key of the summary artifact.
    pub summary_key: String,
    pub summary: AggregateSummary,
    /// Number of records in the batch.
    pub batch_size: usize,
    /// Records that could not be parsed (still archived).
    pub unparsed: usize,
    pub archive: ArchiveReport,
}

impl BatchOutcome {
    /// Whether every step, including archival of every record, succeeded.
    pub fn is_success(&self) -> bool {
        match self {
            BatchOutcome::Empty => true,
            BatchOutcome::Processed(run) => run.archive.is_complete(),
        }
    }
}

pub struct BatchCoordinator<'a, S> {
    store: &'a S,
    pending: &'a PendingArea,
    config: BatchConfig,
}

impl<'a, S: ObjectStore> BatchCoordinator<'a, S> {
    pub fn new(store: &'a S, pending: &'a PendingArea, config: BatchConfig) -> Self {
        Self {
            store,
            pending,
            config,
        }
    }

    /// Run one aggregate-write-archive cycle, stamping the summary with the
    /// current time.
    pub async fn run(&self) -> Result<BatchOutcome> {
        self.run_with_clock(Utc::now).await
    }

    /// Same as [`run`](Self::run) with an injected clock, read once just
    /// before the summary is written.
    pub async fn run_with_clock<C>(&self, clock: C) -> Result<BatchOutcome>
    where
        C: Fn() -> DateTime<Utc>,
    {
        let batch = self.pending.list()?;
        if batch.is_empty() {
            info!("No new log files to process in {}", self.pending.dir().display());
            return Ok(BatchOutcome::Empty);
        }
        info!("Processing batch of {} raw records", batch.len());

        let aggregation = aggregate(self.pending, batch, &self.config.entity_field)?;
        info!(
            "Aggregated {} entities from {} parsed records ({} unparsed, {} without {})",
            aggregation.summary.len(),
            aggregation.parsed,
            aggregation.unparsed.len(),
            aggregation.uncounted,
            self.config.entity_field
        );

        let writer = SummaryWriter::new(self.store, self.config.processed_prefix.clone())
            .with_staging_dir(self.config.staging_dir.clone());
        let summary_key = writer.write(&aggregation.summary, clock()).await?;

        let archive = Archiver::new(self.store, self.config.archive_prefix.clone())
            .with_progress(self.config.show_progress)
            .archive(self.pending, &aggregation.batch)
            .await;

        Ok(BatchOutcome::Processed(BatchRun {
            summary_key,
            summary: aggregation.summary,
            batch_size: aggregation.batch.len(),
            unparsed: aggregation.unparsed.len(),
            archive,
        }))
    }
}
