//! Error taxonomy for the benchmarking core.
//!
//! Partition and plan construction errors abort a run before any training
//! starts. `TrainingFailure` is the one per-cell error: the runner catches
//! it and records a failed cell instead of propagating.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeocvError {
    /// Requested fold count outside `[2, n_samples]`.
    #[error("invalid fold count: {folds} folds for {n_samples} samples")]
    InvalidFoldCount { folds: usize, n_samples: usize },

    /// All sample coordinates coincide; clustering cannot separate them.
    #[error("degenerate coordinates: all samples share one location")]
    DegenerateCoordinates,

    /// A split ended up with an empty train or test side.
    #[error("split {split} has an empty {side} set")]
    EmptySplit { split: usize, side: &'static str },

    /// A learner backend could not fit; carries the backend's diagnostic.
    #[error("training failure: {0}")]
    TrainingFailure(String),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, GeocvError>;
