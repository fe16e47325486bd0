//! Object storage backends.
//!
//! The batch job only needs three operations from durable storage: put a
//! blob under a key, get it back, and list keys under a prefix. Summary
//! artifacts are written create-only; archived records may be replaced.

pub mod gcs;
pub mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use crate::config::{Backend, StorageConfig};
use crate::error::Result;

/// How `put` treats an existing object with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with a write error if the key already exists.
    Create,
    /// Replace any existing object.
    Overwrite,
}

/// A bucket-like blob store.
pub trait ObjectStore {
    /// Human-readable location of the bucket, e.g. `gs://name`.
    fn location(&self) -> String;

    /// Store `body` under `key`.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str, mode: PutMode)
        -> Result<()>;

    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// List keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// The store selected by configuration.
pub enum Store {
    Gcs(GcsStore),
    Local(LocalStore),
}

impl Store {
    /// Build the configured backend.
    pub fn from_config(config: &StorageConfig, access_token: Option<String>) -> Result<Self> {
        match config.backend {
            Backend::Gcs => Ok(Store::Gcs(GcsStore::new(config, access_token)?)),
            Backend::Local => Ok(Store::Local(LocalStore::new(
                config.local_root.join(&config.bucket),
            ))),
        }
    }
}

impl ObjectStore for Store {
    fn location(&self) -> String {
        match self {
            Store::Gcs(store) => store.location(),
            Store::Local(store) => store.location(),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        mode: PutMode,
    ) -> Result<()> {
        match self {
            Store::Gcs(store) => store.put(key, body, content_type, mode).await,
            Store::Local(store) => store.put(key, body, content_type, mode).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self {
            Store::Gcs(store) => store.get(key).await,
            Store::Local(store) => store.get(key).await,
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        match self {
            Store::Gcs(store) => store.list(prefix).await,
            Store::Local(store) => store.list(prefix).await,
        }
    }
}

/// Join a prefix and a name into an object key.
pub fn object_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store doubles for exercising failure paths.

    use super::{ObjectStore, PutMode};
    use crate::error::{BatchError, Result};
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    /// In-memory store that can be told to reject writes.
    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: RefCell<BTreeMap<String, Vec<u8>>>,
        /// Writes to keys starting with any of these prefixes fail.
        pub fail_prefixes: Vec<String>,
        /// Writes to exactly these keys fail.
        pub fail_keys: Vec<String>,
    }

    impl MemoryStore {
        pub fn failing_under(prefix: &str) -> Self {
            Self {
                fail_prefixes: vec![prefix.to_string()],
                ..Self::default()
            }
        }

        pub fn failing_keys(keys: &[&str]) -> Self {
            Self {
                fail_keys: keys.iter().map(|k| k.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects.borrow().keys().cloned().collect()
        }
    }

    impl ObjectStore for MemoryStore {
        fn location(&self) -> String {
            "mem://test".to_string()
        }

        async fn put(
            &self,
            key: &str,
            body: Vec<u8>,
            _content_type: &str,
            mode: PutMode,
        ) -> Result<()> {
            if self.fail_prefixes.iter().any(|p| key.starts_with(p.as_str()))
                || self.fail_keys.iter().any(|k| k == key)
            {
                return Err(BatchError::write(key, "injected failure"));
            }
            let mut objects = self.objects.borrow_mut();
            if mode == PutMode::Create && objects.contains_key(key) {
                return Err(BatchError::write(key, "object already exists"));
            }
            objects.insert(key.to_string(), body);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.objects
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| BatchError::read(key, "not found"))
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .objects
                .borrow()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }
}
