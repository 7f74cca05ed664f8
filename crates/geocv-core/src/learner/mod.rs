//! Uniform train/predict surface over heterogeneous regression backends.
//!
//! The backend is chosen at configuration time through `LearnerConfig`;
//! fitting always retrains from scratch and hands back an immutable
//! `FittedModel`, so one config can safely serve many concurrent cells.

pub mod boosted;
pub mod glm;

use serde::{Deserialize, Serialize};

pub use boosted::{BoostedTreesModel, BoostedTreesParams};
pub use glm::{GlmModel, GlmParams, LinkFunction};

use crate::error::{GeocvError, Result};

/// A named, configurable regression algorithm variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearnerConfig {
    BoostedTrees(BoostedTreesParams),
    Glm(GlmParams),
}

impl LearnerConfig {
    /// Fit this learner on flat row-major `features` (`targets.len()` rows
    /// of `n_features` columns). Each call retrains from scratch.
    ///
    /// Degenerate input surfaces as `TrainingFailure` with the backend's
    /// diagnostic, never a panic.
    pub fn fit(&self, features: &[f64], n_features: usize, targets: &[f64]) -> Result<FittedModel> {
        check_training_input(features, n_features, targets)?;
        match self {
            LearnerConfig::BoostedTrees(params) => {
                BoostedTreesModel::fit(params, features, n_features, targets)
                    .map(FittedModel::BoostedTrees)
            }
            LearnerConfig::Glm(params) => {
                GlmModel::fit(params, features, n_features, targets).map(FittedModel::Glm)
            }
        }
    }
}

/// Fitted parameters of one backend, ready to predict.
#[derive(Debug, Clone)]
pub enum FittedModel {
    BoostedTrees(BoostedTreesModel),
    Glm(GlmModel),
}

impl FittedModel {
    /// Predict one value per row of the flat row-major `features`.
    pub fn predict(&self, features: &[f64], n_features: usize) -> Vec<f64> {
        match self {
            FittedModel::BoostedTrees(m) => m.predict(features, n_features),
            FittedModel::Glm(m) => m.predict(features, n_features),
        }
    }
}

fn check_training_input(features: &[f64], n_features: usize, targets: &[f64]) -> Result<()> {
    if targets.is_empty() {
        return Err(GeocvError::TrainingFailure("empty training set".into()));
    }
    if n_features == 0 {
        return Err(GeocvError::TrainingFailure("zero feature columns".into()));
    }
    if features.len() != targets.len() * n_features {
        return Err(GeocvError::TrainingFailure(format!(
            "feature buffer length {} does not match {} rows x {} columns",
            features.len(),
            targets.len(),
            n_features
        )));
    }
    if targets.iter().any(|t| !t.is_finite()) {
        return Err(GeocvError::TrainingFailure("non-finite target value".into()));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(GeocvError::TrainingFailure("non-finite feature value".into()));
    }
    Ok(())
}
