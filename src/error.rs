//! Fatal, setup-class errors.
//!
//! Anything that happens while processing an individual defect is captured as
//! data on its outcome instead; only these abort a run.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("codebase snapshot not found: {}", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("codebase snapshot at {} is empty", .0.display())]
    EmptySnapshot(PathBuf),

    #[error("failed to inspect {}: {message}", .root.display())]
    Inspect { root: PathBuf, message: String },

    #[error("failed to write report to {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
