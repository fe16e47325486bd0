//! Data models for the activity pipeline.
//!
//! This module contains the event record written by producers and the
//! per-entity aggregate computed by each batch run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single user action, stored as one JSON file in the pending area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier assigned at creation.
    pub event_id: String,
    /// The acting user.
    pub user_id: String,
    /// The subject of the event. Absent for events not tied to a video.
    #[serde(default)]
    pub video_id: Option<String>,
    /// Free-form tag such as "play".
    pub event_type: String,
    /// Creation time (RFC 3339, UTC).
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Creates a "play" event for the given user and video.
    pub fn play(
        event_id: String,
        user_id: String,
        video_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            user_id,
            video_id,
            event_type: "play".to_string(),
            timestamp,
        }
    }

    /// File name used for this record in the pending area.
    pub fn file_name(&self) -> String {
        format!("event_{}.json", self.event_id)
    }
}

/// Occurrence count per entity identifier for one batch.
///
/// Serializes as a flat JSON object. Keys are kept sorted so the artifact
/// bytes are stable for a given batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateSummary {
    counts: BTreeMap<String, u64>,
}

impl AggregateSummary {
    /// Count one more occurrence of `entity_id`.
    pub fn record(&mut self, entity_id: &str) {
        *self.counts.entry(entity_id.to_string()).or_insert(0) += 1;
    }

    #[allow(dead_code)] // Lookup for callers inspecting a single entity
    pub fn get(&self, entity_id: &str) -> Option<u64> {
        self.counts.get(entity_id).copied()
    }

    /// Number of distinct entities.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The entities with the highest counts, ties broken by identifier.
    pub fn top(&self, n: usize) -> Vec<(&str, u64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.truncate(n);
        entries
    }

    /// Canonical JSON body of the summary artifact.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl FromIterator<(String, u64)> for AggregateSummary {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_serializes_as_flat_object() {
        let mut summary = AggregateSummary::default();
        summary.record("v2");
        summary.record("v1");
        summary.record("v1");

        assert_eq!(summary.to_json().unwrap(), r#"{"v1":2,"v2":1}"#);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.len(), 2);
    }

    #[test]
    fn test_summary_top_orders_by_count() {
        let summary: AggregateSummary = vec![
            ("a".to_string(), 1),
            ("b".to_string(), 5),
            ("c".to_string(), 5),
        ]
        .into_iter()
        .collect();

        assert_eq!(summary.top(2), vec![("b", 5), ("c", 5)]);
    }

    #[test]
    fn test_event_record_parses_simulator_output() {
        let json = r#"{
            "event_id": "0b6f",
            "user_id": "user_a1b2c3",
            "video_id": "video_9f3e",
            "event_type": "play",
            "timestamp": "2025-01-01T12:00:00.123456Z"
        }"#;

        let record: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.video_id.as_deref(), Some("video_9f3e"));
        assert_eq!(record.file_name(), "event_0b6f.json");
    }

    #[test]
    fn test_event_record_without_video() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let record = EventRecord::play("e1".into(), "u1".into(), None, at);
        let back: EventRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.event_type, "play");
    }
}
