//! Error types for the batch pipeline.
//!
//! Each phase of a run reports failures through [`BatchError`] so callers can
//! tell a recoverable per-record problem from one that must stop the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    /// A pending record whose body is not a JSON object.
    #[error("Could not parse record {name}: {reason}")]
    Parse { name: String, reason: String },

    /// Listing or reading from the pending area or the object store failed.
    #[error("Storage read failed for {location}: {reason}")]
    StorageRead { location: String, reason: String },

    /// Writing to the object store, or removing from the pending area, failed.
    #[error("Storage write failed for {location}: {reason}")]
    StorageWrite { location: String, reason: String },

    /// Required settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BatchError {
    pub fn read(location: impl Into<String>, reason: impl ToString) -> Self {
        BatchError::StorageRead {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(location: impl Into<String>, reason: impl ToString) -> Self {
        BatchError::StorageWrite {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        BatchError::Configuration(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
