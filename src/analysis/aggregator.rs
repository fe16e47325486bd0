//! Per-entity event counting.
//!
//! This module turns a listed batch of raw event files into an
//! [`AggregateSummary`]. Parsing is best-effort: a file that is not a JSON
//! object is reported and skipped, but it stays in the batch so it is
//! archived and removed along with everything else.

use crate::error::{BatchError, Result};
use crate::models::AggregateSummary;
use crate::pending::{PendingArea, PendingRecord};
use serde_json::Value;
use tracing::{debug, warn};

/// Result of aggregating one batch.
#[derive(Debug)]
pub struct Aggregation {
    /// Counts per entity identifier.
    pub summary: AggregateSummary,
    /// Every record in the batch, parsed or not, for archival.
    pub batch: Vec<PendingRecord>,
    /// Records that parsed successfully.
    pub parsed: usize,
    /// Parsed records with no usable entity identifier.
    pub uncounted: usize,
    /// Records that failed to parse.
    pub unparsed: Vec<BatchError>,
}

/// Count the value of `entity_field` across every record in `batch`.
///
/// Failing to read a listed file aborts the aggregation; failing to parse
/// one does not.
pub fn aggregate(
    pending: &PendingArea,
    batch: Vec<PendingRecord>,
    entity_field: &str,
) -> Result<Aggregation> {
    let mut summary = AggregateSummary::default();
    let mut parsed = 0;
    let mut uncounted = 0;
    let mut unparsed = Vec::new();

    for record in &batch {
        let bytes = pending.read(record)?;

        match parse_entity(&record.name, &bytes, entity_field) {
            Ok(Some(entity)) => {
                parsed += 1;
                summary.record(&entity);
            }
            Ok(None) => {
                parsed += 1;
                uncounted += 1;
                debug!("{} has no {}; not counted", record.name, entity_field);
            }
            Err(e) => {
                warn!("{}", e);
                unparsed.push(e);
            }
        }
    }

    Ok(Aggregation {
        summary,
        batch,
        parsed,
        uncounted,
        unparsed,
    })
}

/// Extract the entity identifier from one raw record.
///
/// Returns `Ok(None)` when the field is missing, null or an empty string.
/// Numbers are counted by their JSON text; any other type is not counted.
pub fn parse_entity(name: &str, bytes: &[u8], entity_field: &str) -> Result<Option<String>> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| BatchError::Parse {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let Value::Object(fields) = value else {
        return Err(BatchError::Parse {
            name: name.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    };

    let entity = match fields.get(entity_field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(entity)
}
