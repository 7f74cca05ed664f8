//! Spatial cross-validation benchmarking for geospatial regression.
//!
//! The pipeline: cluster sample coordinates into spatially coherent folds
//! (`partition`), expand repeated train/test splits from one seed
//! (`resampling`), fit each configured learner on each split (`learner`,
//! `runner`), and aggregate per-split metrics into a ranked, serializable
//! report (`metrics`, `report`). Spatially blocked folds keep near-
//! duplicate neighbours of the training data out of the test side, so the
//! estimated accuracy is not inflated by spatial autocorrelation.
//!
//! All randomness is threaded through explicit seeds; identical inputs
//! reproduce identical folds, splits, and fits.

pub mod config;
pub mod dataset;
pub mod error;
pub mod learner;
pub mod metrics;
pub mod partition;
pub mod report;
pub mod resampling;
pub mod runner;

pub use config::BenchmarkConfig;
pub use dataset::{Dataset, DatasetFile, SampleRow, Schema};
pub use error::{GeocvError, Result};
pub use learner::{BoostedTreesParams, FittedModel, GlmParams, LearnerConfig, LinkFunction};
pub use metrics::{MetricKind, R2Mode};
pub use partition::{partition, DegeneratePolicy, FoldAssignment};
pub use report::{LearnerAggregate, RunReport, SplitMetrics};
pub use resampling::{ResamplingPlan, Split};
pub use runner::{run_benchmark, CancelToken, FailedCell, PredictionRecord, RunOutcome};
