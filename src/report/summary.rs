//! Summary artifact writing.
//!
//! Each batch produces exactly one artifact,
//! `<processed_prefix>/summary_<YYYYMMDDHHMMSS>.json`. The write is
//! create-only: an existing artifact with the same name is never replaced.

use crate::error::{BatchError, Result};
use crate::models::AggregateSummary;
use crate::storage::{object_key, ObjectStore, PutMode};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Content type of summary artifacts.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Artifact file name for a summary written at `at`.
///
/// Resolution is whole seconds, so two runs within the same second
/// produce the same name.
pub fn artifact_name(at: DateTime<Utc>) -> String {
    format!("summary_{}.json", at.format("%Y%m%d%H%M%S"))
}

/// The newest summary artifact among `keys`.
///
/// Timestamped names sort chronologically, so the newest is the greatest.
/// Keys that are not summary artifacts are ignored.
pub fn latest_artifact(keys: &[String]) -> Option<&str> {
    keys.iter()
        .map(String::as_str)
        .filter(|key| {
            let name = key.rsplit('/').next().unwrap_or_default();
            name.starts_with("summary_") && name.ends_with(".json")
        })
        .max()
}

/// Writes summary artifacts to the processed area of a store.
pub struct SummaryWriter<'a, S> {
    store: &'a S,
    processed_prefix: String,
    staging_dir: Option<PathBuf>,
}

impl<'a, S: ObjectStore> SummaryWriter<'a, S> {
    pub fn new(store: &'a S, processed_prefix: impl Into<String>) -> Self {
        Self {
            store,
            processed_prefix: processed_prefix.into(),
            staging_dir: None,
        }
    }

    /// Also keep a local copy of each artifact in `dir`, written before upload.
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Serialize and store `summary`. Returns the object key written.
    pub async fn write(&self, summary: &AggregateSummary, at: DateTime<Utc>) -> Result<String> {
        let name = artifact_name(at);
        let key = object_key(&self.processed_prefix, &name);

        let body = summary
            .to_json()
            .map_err(|e| BatchError::write(key.clone(), e))?;

        if let Some(ref dir) = self.staging_dir {
            let staged = stage(dir, &name, body.as_bytes())?;
            debug!("Staged summary at {}", staged.display());
        }

        self.store
            .put(&key, body.into_bytes(), JSON_CONTENT_TYPE, PutMode::Create)
            .await?;

        info!(
            "Wrote summary of {} entities to {}/{}",
            summary.len(),
            self.store.location(),
            key
        );
        Ok(key)
    }
}

/// Write the local copy of an artifact. Like the upload, this never
/// replaces an existing file.
fn stage(dir: &Path, name: &str, body: &[u8]) -> Result<PathBuf> {
    let staged = dir.join(name);
    let location = staged.display().to_string();

    fs::create_dir_all(dir).map_err(|e| BatchError::write(location.clone(), e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BatchError::write(location.clone(), e))?;
    tmp.write_all(body)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| BatchError::write(location.clone(), e))?;

    tmp.persist_noclobber(&staged).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            BatchError::write(location.clone(), "staged artifact already exists")
        } else {
            BatchError::write(location.clone(), e.error)
        }
    })?;

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::MemoryStore;
    use crate::storage::LocalStore;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, h, m, s).unwrap()
    }

    fn sample() -> AggregateSummary {
        let mut summary = AggregateSummary::default();
        summary.record("v1");
        summary.record("v1");
        summary.record("v2");
        summary
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name(at(7, 5, 3)), "summary_20250309070503.json");
    }

    #[test]
    fn test_latest_artifact_picks_newest_summary() {
        let keys = vec![
            "processed/summary_20250309120000.json".to_string(),
            "processed/summary_20250310000000.json".to_string(),
            "processed/summary_20250309235959.json".to_string(),
            "processed/zz_notes.json".to_string(),
            "processed/summary_20991231000000.json.tmp".to_string(),
        ];

        assert_eq!(
            latest_artifact(&keys),
            Some("processed/summary_20250310000000.json")
        );
        assert_eq!(latest_artifact(&[]), None);
        assert_eq!(latest_artifact(&keys[3..]), None);
    }

    #[tokio::test]
    async fn test_write_stores_canonical_json() {
        let store = MemoryStore::default();
        let writer = SummaryWriter::new(&store, "processed");

        let key = writer.write(&sample(), at(12, 0, 0)).await.unwrap();

        assert_eq!(key, "processed/summary_20250309120000.json");
        assert_eq!(store.get(&key).await.unwrap(), br#"{"v1":2,"v2":1}"#);
    }

    #[tokio::test]
    async fn test_same_second_collision_is_rejected() {
        // Known limitation: names have one-second resolution. The second
        // write fails instead of replacing the first artifact.
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        let writer = SummaryWriter::new(&store, "processed");

        let first = writer.write(&sample(), at(12, 0, 0)).await.unwrap();

        let mut other = AggregateSummary::default();
        other.record("v9");
        let err = writer.write(&other, at(12, 0, 0)).await.unwrap_err();

        assert!(matches!(err, BatchError::StorageWrite { .. }));
        assert_eq!(store.get(&first).await.unwrap(), br#"{"v1":2,"v2":1}"#);
    }

    #[tokio::test]
    async fn test_staging_copy_written_before_upload() {
        let staging = TempDir::new().unwrap();
        let store = MemoryStore::failing_under("processed/");
        let writer = SummaryWriter::new(&store, "processed")
            .with_staging_dir(Some(staging.path().to_path_buf()));

        let err = writer.write(&sample(), at(8, 30, 0)).await.unwrap_err();

        assert!(matches!(err, BatchError::StorageWrite { .. }));
        let staged = staging.path().join("summary_20250309083000.json");
        assert_eq!(fs::read_to_string(staged).unwrap(), r#"{"v1":2,"v2":1}"#);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_same_second_collision_keeps_staged_copy() {
        let staging = TempDir::new().unwrap();
        let store = MemoryStore::default();
        let writer = SummaryWriter::new(&store, "processed")
            .with_staging_dir(Some(staging.path().to_path_buf()));

        let first = writer.write(&sample(), at(12, 0, 0)).await.unwrap();

        let mut other = AggregateSummary::default();
        other.record("v9");
        let err = writer.write(&other, at(12, 0, 0)).await.unwrap_err();

        assert!(matches!(err, BatchError::StorageWrite { .. }));
        let staged = fs::read(staging.path().join("summary_20250309120000.json")).unwrap();
        assert_eq!(staged, store.get(&first).await.unwrap());
        assert_eq!(store.keys(), vec![first]);
    }
}
