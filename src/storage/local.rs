//! Directory-backed object store.
//!
//! Each key maps to a file under the bucket directory. Writes go through a
//! temporary file in the destination directory and are renamed into place,
//! so readers never observe a partially written object.

use super::{ObjectStore, PutMode};
use crate::error::{BatchError, Result};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a key to a path inside the bucket, rejecting keys that escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(BatchError::write(key, "invalid object key"));
        }

        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalStore {
    fn location(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
        mode: PutMode,
    ) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| BatchError::write(key, "object key has no parent"))?;

        fs::create_dir_all(parent).map_err(|e| BatchError::write(key, e))?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| BatchError::write(key, e))?;
        tmp.write_all(&body).map_err(|e| BatchError::write(key, e))?;
        tmp.as_file().sync_all().map_err(|e| BatchError::write(key, e))?;

        match mode {
            PutMode::Create => tmp.persist_noclobber(&path).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    BatchError::write(key, "object already exists")
                } else {
                    BatchError::write(key, e.error)
                }
            })?,
            PutMode::Overwrite => tmp
                .persist(&path)
                .map_err(|e| BatchError::write(key, e.error))?,
        };

        debug!("Stored {} ({} bytes)", path.display(), body.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key).map_err(|e| BatchError::read(key, e))?;
        fs::read(&path).map_err(|e| BatchError::read(key, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| BatchError::read(self.location(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            // Skip in-flight temporary files.
            if relative
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
            {
                continue;
            }

            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_list() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("bucket"));

        store
            .put("archive/event_b.json", b"b".to_vec(), "application/json", PutMode::Overwrite)
            .await
            .unwrap();
        store
            .put("archive/event_a.json", b"a".to_vec(), "application/json", PutMode::Overwrite)
            .await
            .unwrap();
        store
            .put("processed/summary_1.json", b"{}".to_vec(), "application/json", PutMode::Create)
            .await
            .unwrap();

        assert_eq!(store.get("archive/event_a.json").await.unwrap(), b"a");
        assert_eq!(
            store.list("archive/").await.unwrap(),
            vec!["archive/event_a.json", "archive/event_b.json"]
        );
        assert_eq!(store.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());

        store
            .put("processed/s.json", b"first".to_vec(), "application/json", PutMode::Create)
            .await
            .unwrap();
        let err = store
            .put("processed/s.json", b"second".to_vec(), "application/json", PutMode::Create)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::StorageWrite { .. }));
        assert_eq!(store.get("processed/s.json").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());

        for body in [b"one".to_vec(), b"two".to_vec()] {
            store
                .put("archive/e.json", body, "application/json", PutMode::Overwrite)
                .await
                .unwrap();
        }

        assert_eq!(store.get("archive/e.json").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("bucket"));

        let err = store
            .put("../outside.json", b"x".to_vec(), "application/json", PutMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::StorageWrite { .. }));
        assert!(!dir.path().join("outside.json").exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_read_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());

        let err = store.get("processed/missing.json").await.unwrap_err();
        assert!(matches!(err, BatchError::StorageRead { .. }));
    }
}
