//! Report output.

pub mod summary;

pub use summary::{latest_artifact, SummaryWriter, JSON_CONTENT_TYPE};
