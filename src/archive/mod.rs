//! Archival of consumed raw records.
//!
//! Every record of a processed batch is uploaded to
//! `<archive_prefix>/<file name>` and only then deleted from the pending
//! area. Failures are per record: a record that could not be uploaded stays
//! pending for the next run, and the loop moves on to the next one.

use crate::error::BatchError;
use crate::pending::{PendingArea, PendingRecord};
use crate::report::JSON_CONTENT_TYPE;
use crate::storage::{object_key, ObjectStore, PutMode};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

/// Outcome of archiving one batch.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Object keys of records uploaded and removed from pending.
    pub archived: Vec<String>,
    /// Records that failed, with the error that stopped them.
    pub failed: Vec<(String, BatchError)>,
}

impl ArchiveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Moves raw records from the pending area into the archive prefix.
pub struct Archiver<'a, S> {
    store: &'a S,
    archive_prefix: String,
    show_progress: bool,
}

impl<'a, S: ObjectStore> Archiver<'a, S> {
    pub fn new(store: &'a S, archive_prefix: impl Into<String>) -> Self {
        Self {
            store,
            archive_prefix: archive_prefix.into(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Archive every record in `batch`, continuing past failures.
    pub async fn archive(&self, pending: &PendingArea, batch: &[PendingRecord]) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        let progress_bar = self.progress_bar(batch.len() as u64);

        for record in batch {
            match self.archive_one(pending, record).await {
                Ok(key) => report.archived.push(key),
                Err(e) => {
                    error!("Failed to archive {}: {}", record.name, e);
                    report.failed.push((record.name.clone(), e));
                }
            }
            progress_bar.inc(1);
        }

        progress_bar.finish_and_clear();
        info!(
            "Archived {} of {} raw records to {}/{}/",
            report.archived.len(),
            batch.len(),
            self.store.location(),
            self.archive_prefix
        );
        report
    }

    /// Upload one record, then delete it. Never deletes without a confirmed upload.
    async fn archive_one(
        &self,
        pending: &PendingArea,
        record: &PendingRecord,
    ) -> Result<String, BatchError> {
        let key = object_key(&self.archive_prefix, &record.name);
        let body = pending.read(record)?;

        // Overwrite: a record uploaded by a run that died before deleting it
        // is archived again under the same key.
        self.store
            .put(&key, body, JSON_CONTENT_TYPE, PutMode::Overwrite)
            .await?;

        pending.remove(record)?;
        debug!("Archived {} -> {}", record.name, key);
        Ok(key)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} archived")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
