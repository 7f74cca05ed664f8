//! Gradient-boosted regression trees.
//!
//! Residual boosting over depth-limited regression trees: each stage fits
//! a tree to the current residuals under an MSE split criterion, then the
//! shrunken tree predictions are subtracted from the residuals. Optional
//! row subsampling per stage uses a seeded `StdRng`, so fits are
//! reproducible from the params alone. Feature data is flat row-major f64.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{GeocvError, Result};

fn default_n_trees() -> usize {
    100
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_max_depth() -> usize {
    3
}
fn default_min_samples_leaf() -> usize {
    1
}
fn default_subsample() -> f64 {
    1.0
}

/// Hyperparameters for the boosted-trees backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTreesParams {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) per boosting stage.
    #[serde(default = "default_subsample")]
    pub subsample: f64,
    /// Seed for the row-subsampling stream; unused when `subsample == 1.0`.
    #[serde(default)]
    pub seed: u64,
}

impl Default for BoostedTreesParams {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            subsample: default_subsample(),
            seed: 0,
        }
    }
}

impl BoostedTreesParams {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(GeocvError::TrainingFailure("n_trees must be >= 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(GeocvError::TrainingFailure(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_depth == 0 {
            return Err(GeocvError::TrainingFailure("max_depth must be >= 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(GeocvError::TrainingFailure("min_samples_leaf must be >= 1".into()));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(GeocvError::TrainingFailure(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }
}

// ── Regression tree ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(
        features: &[f64],
        n_features: usize,
        residuals: &[f64],
        rows: &[usize],
        max_depth: usize,
        min_samples_leaf: usize,
    ) -> Self {
        let mut nodes = Vec::new();
        grow(
            features,
            n_features,
            residuals,
            rows,
            max_depth,
            min_samples_leaf,
            0,
            &mut nodes,
        );
        Self { nodes }
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn mean_at(values: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&i| values[i]).sum::<f64>() / rows.len() as f64
}

/// Recursively grow the tree; returns the index of the node created.
#[allow(clippy::too_many_arguments)]
fn grow(
    features: &[f64],
    n_features: usize,
    residuals: &[f64],
    rows: &[usize],
    max_depth: usize,
    min_samples_leaf: usize,
    depth: usize,
    nodes: &mut Vec<TreeNode>,
) -> usize {
    let leaf_value = mean_at(residuals, rows);

    let all_equal = rows
        .iter()
        .all(|&i| (residuals[i] - residuals[rows[0]]).abs() < 1e-15);
    if depth >= max_depth || rows.len() < 2 * min_samples_leaf || all_equal {
        let idx = nodes.len();
        nodes.push(TreeNode::Leaf { value: leaf_value });
        return idx;
    }

    let Some((feature, threshold)) =
        best_split(features, n_features, residuals, rows, min_samples_leaf)
    else {
        let idx = nodes.len();
        nodes.push(TreeNode::Leaf { value: leaf_value });
        return idx;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&i| features[i * n_features + feature] <= threshold);

    // Midpoint rounding on adjacent float values can empty one side.
    if left_rows.is_empty() || right_rows.is_empty() {
        let idx = nodes.len();
        nodes.push(TreeNode::Leaf { value: leaf_value });
        return idx;
    }

    // Placeholder, patched after both children exist.
    let idx = nodes.len();
    nodes.push(TreeNode::Leaf { value: leaf_value });

    let left = grow(
        features,
        n_features,
        residuals,
        &left_rows,
        max_depth,
        min_samples_leaf,
        depth + 1,
        nodes,
    );
    let right = grow(
        features,
        n_features,
        residuals,
        &right_rows,
        max_depth,
        min_samples_leaf,
        depth + 1,
        nodes,
    );
    nodes[idx] = TreeNode::Split { feature, threshold, left, right };
    idx
}

/// Exhaustive best-split search: per feature, sort the rows by value and
/// scan boundaries between distinct values, maximising the SSE decrease
/// via prefix sums. Returns None when no split satisfies the leaf minimum.
fn best_split(
    features: &[f64],
    n_features: usize,
    residuals: &[f64],
    rows: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let n = rows.len();
    let total_sum: f64 = rows.iter().map(|&i| residuals[i]).sum();

    let mut best: Option<(usize, f64)> = None;
    let mut best_score = 0.0;
    let mut order: Vec<usize> = Vec::with_capacity(n);

    for feature in 0..n_features {
        order.clear();
        order.extend_from_slice(rows);
        order.sort_by(|&a, &b| {
            let va = features[a * n_features + feature];
            let vb = features[b * n_features + feature];
            va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for pos in 0..n - 1 {
            left_sum += residuals[order[pos]];
            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let v_here = features[order[pos] * n_features + feature];
            let v_next = features[order[pos + 1] * n_features + feature];
            if v_here == v_next {
                continue;
            }

            // SSE decrease = sum_l^2/n_l + sum_r^2/n_r − sum^2/n
            // (the constant Σy² cancels out of the comparison).
            let right_sum = total_sum - left_sum;
            let score = left_sum * left_sum / n_left as f64
                + right_sum * right_sum / n_right as f64
                - total_sum * total_sum / n as f64;

            if score > best_score {
                best_score = score;
                best = Some((feature, 0.5 * (v_here + v_next)));
            }
        }
    }
    best
}

// ── Boosted ensemble ─────────────────────────────────────────────────────────

/// Fitted boosted-trees model: a base prediction plus shrunken trees.
#[derive(Debug, Clone)]
pub struct BoostedTreesModel {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl BoostedTreesModel {
    pub(crate) fn fit(
        params: &BoostedTreesParams,
        features: &[f64],
        n_features: usize,
        targets: &[f64],
    ) -> Result<Self> {
        params.validate()?;
        let n = targets.len();

        let base = targets.iter().sum::<f64>() / n as f64;
        let mut residuals: Vec<f64> = targets.iter().map(|t| t - base).collect();
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let sample_count = ((n as f64 * params.subsample).ceil() as usize).clamp(1, n);
        let mut pool: Vec<usize> = (0..n).collect();

        for _ in 0..params.n_trees {
            // A zero-variance target is not an error for trees: boosting
            // just stops once the residuals vanish.
            if residuals.iter().all(|r| r.abs() < 1e-12) {
                break;
            }

            let rows: Vec<usize> = if sample_count == n {
                pool.clone()
            } else {
                // Partial Fisher-Yates: first `sample_count` entries become
                // a uniform draw without replacement.
                for i in 0..sample_count {
                    let j = rng.gen_range(i..n);
                    pool.swap(i, j);
                }
                let mut rows = pool[..sample_count].to_vec();
                rows.sort_unstable();
                rows
            };

            let tree = RegressionTree::fit(
                features,
                n_features,
                &residuals,
                &rows,
                params.max_depth,
                params.min_samples_leaf,
            );

            for (i, r) in residuals.iter_mut().enumerate() {
                let row = &features[i * n_features..(i + 1) * n_features];
                *r -= params.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        Ok(Self { base, learning_rate: params.learning_rate, trees })
    }

    pub fn predict(&self, features: &[f64], n_features: usize) -> Vec<f64> {
        let n = features.len() / n_features;
        (0..n)
            .map(|i| {
                let row = &features[i * n_features..(i + 1) * n_features];
                let boost: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                self.base + self.learning_rate * boost
            })
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
