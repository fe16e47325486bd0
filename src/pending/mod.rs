//! Pending area: the directory producers drop raw event files into.
//!
//! Only top-level `*.json` files are part of a batch. Hidden files are
//! skipped, which keeps in-flight temporary files written by the producer
//! out of a listing. Names that are not valid UTF-8 cannot become object
//! keys; those files are skipped with a warning and stay where they are.

use crate::error::{BatchError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A raw event file discovered by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    /// File name, also used as the archive object name.
    pub name: String,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Handle on the pending directory.
#[derive(Debug, Clone)]
pub struct PendingArea {
    dir: PathBuf,
}

impl PendingArea {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List every pending record, sorted by name.
    ///
    /// A missing directory is an empty area, not an error: the producer may
    /// not have written anything yet.
    pub fn list(&self) -> Result<Vec<PendingRecord>> {
        if !self.dir.exists() {
            debug!("Pending directory {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let walker = WalkDir::new(&self.dir).min_depth(1).max_depth(1);

        for entry in walker {
            let entry = entry.map_err(|e| BatchError::read(self.dir.display().to_string(), e))?;

            if !entry.file_type().is_file() {
                continue;
            }

            // The name becomes an object key, so it must survive unchanged.
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(
                    "Skipping {}: file name is not valid UTF-8",
                    entry.path().display()
                );
                continue;
            };
            if !Self::matches(&name) {
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| BatchError::read(entry.path().display().to_string(), e))?;

            records.push(PendingRecord {
                name,
                path: entry.path().to_path_buf(),
                size: metadata.len(),
            });
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Read the raw bytes of a record.
    pub fn read(&self, record: &PendingRecord) -> Result<Vec<u8>> {
        fs::read(&record.path).map_err(|e| BatchError::read(record.path.display().to_string(), e))
    }

    /// Delete a record from the pending area.
    pub fn remove(&self, record: &PendingRecord) -> Result<()> {
        fs::remove_file(&record.path)
            .map_err(|e| BatchError::write(record.path.display().to_string(), e))
    }

    /// Whether a file name belongs in a batch.
    fn matches(name: &str) -> bool {
        !name.starts_with('.') && name.ends_with(".json")
    }
}
