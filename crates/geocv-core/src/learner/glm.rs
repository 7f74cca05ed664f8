//! Gaussian generalized linear model.
//!
//! Identity link is ordinary least squares through the normal equations;
//! the log link is fit by iteratively reweighted least squares (Gauss-
//! Newton on the squared-error objective). The solver is an in-module
//! Gaussian elimination with partial pivoting; a vanishing pivot means a
//! singular design matrix and surfaces as `TrainingFailure`.

use serde::{Deserialize, Serialize};

use crate::error::{GeocvError, Result};

/// Pivot magnitude below which the normal-equation matrix is treated as
/// singular.
const SINGULAR_TOL: f64 = 1e-10;

/// IRLS convergence: max coefficient change between iterations.
const IRLS_TOL: f64 = 1e-8;
const IRLS_MAX_ITER: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkFunction {
    /// mu = eta: plain least squares.
    #[default]
    Identity,
    /// mu = exp(eta): requires strictly positive targets.
    Log,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlmParams {
    #[serde(default)]
    pub link: LinkFunction,
}

/// Fitted GLM: intercept-first coefficient vector plus the link.
#[derive(Debug, Clone)]
pub struct GlmModel {
    link: LinkFunction,
    /// `coefficients[0]` is the intercept; `coefficients[1 + j]` multiplies
    /// feature column `j`.
    coefficients: Vec<f64>,
}

impl GlmModel {
    pub(crate) fn fit(
        params: &GlmParams,
        features: &[f64],
        n_features: usize,
        targets: &[f64],
    ) -> Result<Self> {
        let n = targets.len();
        let p = n_features + 1;
        if n < p {
            return Err(GeocvError::TrainingFailure(format!(
                "{n} rows cannot determine {p} coefficients"
            )));
        }

        let coefficients = match params.link {
            LinkFunction::Identity => {
                let weights = vec![1.0; n];
                solve_weighted_least_squares(features, n_features, targets, &weights)?
            }
            LinkFunction::Log => fit_log_link(features, n_features, targets)?,
        };

        Ok(Self { link: params.link, coefficients })
    }

    pub fn predict(&self, features: &[f64], n_features: usize) -> Vec<f64> {
        let n = features.len() / n_features;
        (0..n)
            .map(|i| {
                let row = &features[i * n_features..(i + 1) * n_features];
                let eta = self.coefficients[0]
                    + row
                        .iter()
                        .zip(&self.coefficients[1..])
                        .map(|(x, b)| x * b)
                        .sum::<f64>();
                match self.link {
                    LinkFunction::Identity => eta,
                    LinkFunction::Log => eta.exp(),
                }
            })
            .collect()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// Gauss-Newton / IRLS for the log link: linearise mu = exp(eta) around the
/// current eta, solve the weighted normal equations on the working
/// response, repeat until the coefficients settle.
fn fit_log_link(features: &[f64], n_features: usize, targets: &[f64]) -> Result<Vec<f64>> {
    if let Some(i) = targets.iter().position(|&t| t <= 0.0) {
        return Err(GeocvError::TrainingFailure(format!(
            "log link requires strictly positive targets (row {i} is {})",
            targets[i]
        )));
    }

    let n = targets.len();
    // Start from the linear fit on log targets; a decent eta for exp data.
    let log_targets: Vec<f64> = targets.iter().map(|t| t.ln()).collect();
    let unit = vec![1.0; n];
    let mut beta = solve_weighted_least_squares(features, n_features, &log_targets, &unit)?;

    let mut z = vec![0.0; n];
    let mut w = vec![0.0; n];
    for _ in 0..IRLS_MAX_ITER {
        for i in 0..n {
            let row = &features[i * n_features..(i + 1) * n_features];
            let eta = beta[0]
                + row.iter().zip(&beta[1..]).map(|(x, b)| x * b).sum::<f64>();
            let mu = eta.exp();
            if !mu.is_finite() || mu <= 0.0 {
                return Err(GeocvError::TrainingFailure(
                    "log-link IRLS diverged (non-finite mean)".into(),
                ));
            }
            // Working response and weight for dmu/deta = mu.
            z[i] = eta + (targets[i] - mu) / mu;
            w[i] = mu * mu;
        }

        let next = solve_weighted_least_squares(features, n_features, &z, &w)?;
        let delta = beta
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        beta = next;
        if delta < IRLS_TOL {
            break;
        }
    }
    Ok(beta)
}

/// Solve `argmin_b Σ w_i (z_i − [1, x_i] · b)²` through the weighted normal
/// equations. `weights` must be non-negative, one per row.
fn solve_weighted_least_squares(
    features: &[f64],
    n_features: usize,
    z: &[f64],
    weights: &[f64],
) -> Result<Vec<f64>> {
    let n = z.len();
    let p = n_features + 1;

    // Accumulate XtWX (row-major p x p) and XtWz.
    let mut xtwx = vec![0.0f64; p * p];
    let mut xtwz = vec![0.0f64; p];
    let mut row_buf = vec![0.0f64; p];

    for i in 0..n {
        let wi = weights[i];
        row_buf[0] = 1.0;
        row_buf[1..].copy_from_slice(&features[i * n_features..(i + 1) * n_features]);
        for a in 0..p {
            let wa = wi * row_buf[a];
            xtwz[a] += wa * z[i];
            for b in a..p {
                xtwx[a * p + b] += wa * row_buf[b];
            }
        }
    }
    // Mirror the upper triangle.
    for a in 0..p {
        for b in 0..a {
            xtwx[a * p + b] = xtwx[b * p + a];
        }
    }

    solve_in_place(&mut xtwx, &mut xtwz, p)
}

/// Gaussian elimination with partial pivoting on a p x p system.
fn solve_in_place(a: &mut [f64], rhs: &mut [f64], p: usize) -> Result<Vec<f64>> {
    for col in 0..p {
        // Pivot row with the largest magnitude in this column.
        let mut pivot_row = col;
        let mut pivot_mag = a[col * p + col].abs();
        for row in col + 1..p {
            let mag = a[row * p + col].abs();
            if mag > pivot_mag {
                pivot_mag = mag;
                pivot_row = row;
            }
        }
        if pivot_mag < SINGULAR_TOL {
            return Err(GeocvError::TrainingFailure("singular design matrix".into()));
        }
        if pivot_row != col {
            for k in 0..p {
                a.swap(col * p + k, pivot_row * p + k);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = a[col * p + col];
        for row in col + 1..p {
            let factor = a[row * p + col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..p {
                a[row * p + k] -= factor * a[col * p + k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution.
    let mut beta = vec![0.0f64; p];
    for col in (0..p).rev() {
        let mut acc = rhs[col];
        for k in col + 1..p {
            acc -= a[col * p + k] * beta[k];
        }
        beta[col] = acc / a[col * p + col];
    }
    Ok(beta)
}
