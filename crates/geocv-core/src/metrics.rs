//! Per-split regression accuracy metrics.
//!
//! All metrics return NaN (never a silent zero) when handed an empty pair
//! list; R² is also NaN when the truth has zero variance. Missing-vs-NaN
//! bookkeeping for aggregates lives in `report`.

use serde::{Deserialize, Serialize};

/// Metric selectable as the benchmark's primary ranking criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Rmse,
    Mse,
    Bias,
    R2,
}

impl MetricKind {
    /// Whether smaller values of this metric indicate a better fit.
    /// Bias is judged by magnitude, so it counts as lower-is-better.
    pub fn lower_is_better(self) -> bool {
        !matches!(self, MetricKind::R2)
    }

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Rmse => "rmse",
            MetricKind::Mse => "mse",
            MetricKind::Bias => "bias",
            MetricKind::R2 => "r2",
        }
    }

    pub fn compute(self, predictions: &[f64], truths: &[f64]) -> f64 {
        match self {
            MetricKind::Rmse => rmse(predictions, truths),
            MetricKind::Mse => mse(predictions, truths),
            MetricKind::Bias => bias(predictions, truths),
            MetricKind::R2 => r2(predictions, truths),
        }
    }
}

/// How per-split R² values are combined into one aggregate per learner.
///
/// The two diverge: `MeanPerSplit` averages the per-split coefficients the
/// same way RMSE/MSE/bias are averaged; `Pooled` computes a single R² over
/// all out-of-fold predictions at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum R2Mode {
    #[default]
    MeanPerSplit,
    Pooled,
}

/// Mean squared error. NaN for empty input.
pub fn mse(predictions: &[f64], truths: &[f64]) -> f64 {
    debug_assert_eq!(predictions.len(), truths.len());
    if predictions.is_empty() {
        return f64::NAN;
    }
    let n = predictions.len() as f64;
    predictions
        .iter()
        .zip(truths)
        .map(|(p, t)| (p - t) * (p - t))
        .sum::<f64>()
        / n
}

/// Root mean squared error. NaN for empty input.
pub fn rmse(predictions: &[f64], truths: &[f64]) -> f64 {
    mse(predictions, truths).sqrt()
}

/// Mean signed error, prediction minus truth. NaN for empty input.
pub fn bias(predictions: &[f64], truths: &[f64]) -> f64 {
    debug_assert_eq!(predictions.len(), truths.len());
    if predictions.is_empty() {
        return f64::NAN;
    }
    let n = predictions.len() as f64;
    predictions.iter().zip(truths).map(|(p, t)| p - t).sum::<f64>() / n
}

/// Coefficient of determination, 1 − SS_res / SS_tot.
/// NaN for empty input or zero-variance truth.
pub fn r2(predictions: &[f64], truths: &[f64]) -> f64 {
    debug_assert_eq!(predictions.len(), truths.len());
    if predictions.is_empty() {
        return f64::NAN;
    }
    let n = truths.len() as f64;
    let mean = truths.iter().sum::<f64>() / n;
    let ss_tot: f64 = truths.iter().map(|t| (t - mean) * (t - mean)).sum();
    if ss_tot <= f64::EPSILON * n {
        return f64::NAN;
    }
    let ss_res: f64 = predictions
        .iter()
        .zip(truths)
        .map(|(p, t)| (t - p) * (t - p))
        .sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn known_values() {
        let pred = [1.0, 2.0, 3.0];
        let truth = [1.0, 1.0, 5.0];
        // Squared errors: 0, 1, 4 → MSE 5/3.
        assert_relative_eq!(mse(&pred, &truth), 5.0 / 3.0);
        assert_relative_eq!(rmse(&pred, &truth), (5.0f64 / 3.0).sqrt());
        // Signed errors: 0, 1, -2 → bias -1/3.
        assert_relative_eq!(bias(&pred, &truth), -1.0 / 3.0);
    }

    #[test]
    fn perfect_predictions_score_r2_one() {
        let truth = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(r2(&truth, &truth), 1.0);
        assert_relative_eq!(rmse(&truth, &truth), 0.0);
    }

    #[test]
    fn mean_predictor_scores_r2_zero() {
        let truth = [1.0, 2.0, 3.0];
        let pred = [2.0, 2.0, 2.0];
        assert_relative_eq!(r2(&pred, &truth), 0.0);
    }

    #[test]
    fn empty_input_propagates_nan() {
        assert!(mse(&[], &[]).is_nan());
        assert!(rmse(&[], &[]).is_nan());
        assert!(bias(&[], &[]).is_nan());
        assert!(r2(&[], &[]).is_nan());
    }

    #[test]
    fn zero_variance_truth_gives_nan_r2() {
        let truth = [3.0, 3.0, 3.0];
        let pred = [3.0, 3.1, 2.9];
        assert!(r2(&pred, &truth).is_nan());
    }

    #[test]
    fn metric_kind_dispatch_matches_free_functions() {
        let pred = [1.5, 2.5];
        let truth = [1.0, 3.0];
        assert_relative_eq!(MetricKind::Mse.compute(&pred, &truth), mse(&pred, &truth));
        assert_relative_eq!(MetricKind::Bias.compute(&pred, &truth), bias(&pred, &truth));
        assert!(MetricKind::Rmse.lower_is_better());
        assert!(!MetricKind::R2.lower_is_better());
    }
}
