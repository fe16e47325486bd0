//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::Backend;
use clap::Parser;
use std::path::PathBuf;

/// Streamify - activity log batch processor
///
/// Aggregates raw activity events from the pending directory into a
/// per-video play count, uploads the summary to object storage and
/// archives the raw events. Intended to be run by a scheduler.
///
/// Examples:
///   streamify --bucket my-bucket
///   streamify --bucket my-bucket --pending-dir ./raw_logs --dry-run
///   streamify --bucket my-bucket --backend local --local-root ./buckets
///   streamify --pending-dir ./raw_logs --generate 20
///   streamify --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Target storage bucket
    ///
    /// Required for every mode that touches object storage.
    #[arg(short, long, value_name = "NAME", env = "GCS_BUCKET")]
    pub bucket: Option<String>,

    /// Object storage backend (gcs, local)
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Directory holding buckets for the local backend
    #[arg(long, value_name = "DIR")]
    pub local_root: Option<PathBuf>,

    /// Directory containing pending raw event files
    #[arg(short, long, value_name = "DIR", env = "STREAMIFY_PENDING_DIR")]
    pub pending_dir: Option<PathBuf>,

    /// Scratch directory the summary is written to before upload
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Event field to count per distinct value
    #[arg(long, value_name = "FIELD")]
    pub entity_field: Option<String>,

    /// Storage request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// OAuth bearer token for GCS
    ///
    /// If not set, a token is requested from the instance metadata server.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .streamify.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: aggregate the pending batch without writing or deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write COUNT synthetic play events into the pending directory and exit
    #[arg(long, value_name = "COUNT", conflicts_with_all = ["dry_run", "latest"])]
    pub generate: Option<usize>,

    /// Print the most recent summary artifact from the bucket and exit
    #[arg(long, conflicts_with = "dry_run")]
    pub latest: bool,

    /// Generate a default .streamify.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// The bucket is checked later, once the config file has been merged in.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(count) = self.generate {
            if count == 0 {
                return Err("--generate needs a count of at least 1".to_string());
            }
        }

        if let Some(ref field) = self.entity_field {
            if field.trim().is_empty() {
                return Err("Entity field must not be empty".to_string());
            }
        }

        if let Some(ref dir) = self.pending_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(format!(
                    "Pending path is not a directory: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
