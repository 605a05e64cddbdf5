//! Training error types

use crate::engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for training operations
pub type Result<T> = std::result::Result<T, TrainingError>;

/// Errors raised while preparing a corpus or running the training pipeline
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Operation requested in a state where it is not legal
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Corpus resources disagree with each other
    #[error("Data consistency check failed: {0}")]
    Consistency(String),

    /// Snapshot directory for an iteration already exists
    #[error("Snapshot directory already exists: {}", .0.display())]
    SnapshotCollision(PathBuf),

    /// Snapshot directory or one of its files is absent
    #[error("Snapshot {iteration} is missing: {}", .path.display())]
    SnapshotMissing { iteration: u32, path: PathBuf },

    /// Model definition text could not be interpreted
    #[error("Malformed model definition: {0}")]
    MalformedModel(String),

    /// External engine invocation failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session record (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or shared-library error
    #[error(transparent)]
    Common(#[from] phonalign_common::Error),
}
