//! Synthetic event producer.
//!
//! Writes random "play" events into the pending area, one file per event,
//! the way the activity simulator does in deployment. Each file is written
//! to a hidden temporary name and renamed into place so a concurrent batch
//! listing never sees a half-written record.

use crate::error::{BatchError, Result};
use crate::models::EventRecord;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

/// Acknowledgement returned for each recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReceipt {
    pub event_id: String,
    pub status: &'static str,
    pub path: PathBuf,
}

pub struct EventProducer {
    pending_dir: PathBuf,
}

impl EventProducer {
    pub fn new(pending_dir: PathBuf) -> Self {
        Self { pending_dir }
    }

    /// Record one event into the pending area.
    pub fn record(&self, event: &EventRecord) -> Result<EventReceipt> {
        let path = self.pending_dir.join(event.file_name());
        let location = path.display().to_string();

        fs::create_dir_all(&self.pending_dir).map_err(|e| BatchError::write(&*location, e))?;

        let body = serde_json::to_vec(event).map_err(|e| BatchError::write(&*location, e))?;
        let mut tmp =
            NamedTempFile::new_in(&self.pending_dir).map_err(|e| BatchError::write(&*location, e))?;
        tmp.write_all(&body)
            .map_err(|e| BatchError::write(&*location, e))?;
        tmp.persist_noclobber(&path)
            .map_err(|e| BatchError::write(&*location, e.error))?;

        debug!("Created local log {}", location);
        Ok(EventReceipt {
            event_id: event.event_id.clone(),
            status: "success",
            path,
        })
    }

    /// Record one random play event.
    pub fn record_random(&self) -> Result<EventReceipt> {
        self.record(&random_play_event())
    }

    /// Record `count` random play events.
    pub fn simulate(&self, count: usize) -> Result<Vec<EventReceipt>> {
        (0..count).map(|_| self.record_random()).collect()
    }
}

/// A play event from a random user for a random video.
pub fn random_play_event() -> EventRecord {
    let user = Uuid::new_v4().simple().to_string();
    let video = Uuid::new_v4().simple().to_string();

    EventRecord::play(
        Uuid::new_v4().to_string(),
        format!("user_{}", &user[..6]),
        Some(format!("video_{}", &video[..4])),
        Utc::now(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::PendingArea;
    use tempfile::TempDir;

    #[test]
    fn test_random_event_shape() {
        let event = random_play_event();
        assert_eq!(event.event_type, "play");
        assert!(event.user_id.starts_with("user_"));
        assert_eq!(event.user_id.len(), "user_".len() + 6);
        let video = event.video_id.unwrap();
        assert!(video.starts_with("video_"));
        assert_eq!(video.len(), "video_".len() + 4);
    }

    #[test]
    fn test_simulate_writes_listable_records() {
        let dir = TempDir::new().unwrap();
        let producer = EventProducer::new(dir.path().join("raw_logs"));

        let receipts = producer.simulate(5).unwrap();
        assert_eq!(receipts.len(), 5);
        assert!(receipts.iter().all(|r| r.status == "success"));

        let area = PendingArea::new(dir.path().join("raw_logs"));
        let records = area.list().unwrap();
        assert_eq!(records.len(), 5);

        let body = area.read(&records[0]).unwrap();
        let event: EventRecord = serde_json::from_slice(&body).unwrap();
        assert!(receipts.iter().any(|r| r.event_id == event.event_id));
    }

    #[test]
    fn test_record_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let producer = EventProducer::new(dir.path().to_path_buf());
        let event = random_play_event();

        producer.record(&event).unwrap();
        let err = producer.record(&event).unwrap_err();
        assert!(matches!(err, BatchError::StorageWrite { .. }));
    }
}
