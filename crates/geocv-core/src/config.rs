//! Benchmark run configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GeocvError, Result};
use crate::metrics::{MetricKind, R2Mode};
use crate::partition::DegeneratePolicy;

fn default_folds() -> usize {
    5
}
fn default_repeats() -> usize {
    1
}
fn default_seed() -> u64 {
    42
}

/// Recognized run options. Every field has a calibrated default, so a
/// config file only needs the fields it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Spatial fold count, >= 2.
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// How many times the spatial partitioning is re-run, >= 1.
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    /// Single seed the whole run reproduces from.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Metric the final ranking is ordered by.
    #[serde(default)]
    pub primary_metric: MetricKind,
    /// How per-split R² values are combined (recorded in the report).
    #[serde(default)]
    pub r2_mode: R2Mode,
    /// What to do when all sample coordinates coincide.
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            repeats: default_repeats(),
            seed: default_seed(),
            primary_metric: MetricKind::default(),
            r2_mode: R2Mode::default(),
            degenerate_policy: DegeneratePolicy::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Check bounds against the dataset size before anything trains.
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if self.folds < 2 || self.folds > n_samples {
            return Err(GeocvError::InvalidFoldCount {
                folds: self.folds,
                n_samples,
            });
        }
        if self.repeats < 1 {
            return Err(GeocvError::InvalidConfig("repeats must be >= 1".into()));
        }
        Ok(())
    }
}
