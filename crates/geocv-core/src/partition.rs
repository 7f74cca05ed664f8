//! Spatial fold assignment via seeded k-means on sample coordinates.
//!
//! Points near each other land in the same fold, so a held-out fold is a
//! spatially coherent block rather than a random scatter of neighbours of
//! the training set. Assignment is a pure function of (coords, k, seed):
//! same inputs, bit-identical output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{GeocvError, Result};

/// Mixed into the caller's seed so partitioning never shares an RNG stream
/// with other consumers of the same run seed.
const PARTITION_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Lloyd iteration cap; assignments almost always stabilise much earlier.
const MAX_ITERATIONS: usize = 100;

/// What to do when every sample shares one location and clustering cannot
/// separate them. Never applied silently: the caller picks the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Abort with `DegenerateCoordinates`.
    #[default]
    Fail,
    /// Seeded random assignment that still yields k non-empty folds.
    UniformRandom,
}

/// Mapping from sample index to fold id in `[0, k)`.
///
/// Invariant: indices `[0, N)` are covered exactly once and every fold is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    folds: Vec<u32>,
    k: usize,
}

impl FoldAssignment {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    #[inline]
    pub fn fold_of(&self, i: usize) -> u32 {
        self.folds[i]
    }

    /// Sample indices assigned to `fold`, ascending.
    pub fn indices_of(&self, fold: u32) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|(_, &f)| f == fold)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.k];
        for &f in &self.folds {
            sizes[f as usize] += 1;
        }
        sizes
    }
}

/// Cluster `coords` into `k` spatially coherent folds.
///
/// k-means++ seeding followed by Lloyd iterations; empty clusters are
/// repaired by donating the point farthest from its current centroid.
pub fn partition(
    coords: &[[f64; 2]],
    k: usize,
    seed: u64,
    policy: DegeneratePolicy,
) -> Result<FoldAssignment> {
    let n = coords.len();
    if k < 2 || k > n {
        return Err(GeocvError::InvalidFoldCount { folds: k, n_samples: n });
    }

    let mut rng = StdRng::seed_from_u64(seed ^ PARTITION_SEED_SALT);

    if is_degenerate(coords) {
        return match policy {
            DegeneratePolicy::Fail => Err(GeocvError::DegenerateCoordinates),
            DegeneratePolicy::UniformRandom => Ok(random_assignment(n, k, &mut rng)),
        };
    }

    let mut centroids = seed_centroids(coords, k, &mut rng);
    let mut assignment = vec![0u32; n];

    for _ in 0..MAX_ITERATIONS {
        let changed = assign_nearest(coords, &centroids, &mut assignment);
        repair_empty_clusters(coords, &centroids, &mut assignment, k);
        update_centroids(coords, &assignment, &mut centroids);
        if !changed {
            break;
        }
    }

    Ok(FoldAssignment { folds: assignment, k })
}

fn is_degenerate(coords: &[[f64; 2]]) -> bool {
    let first = coords[0];
    coords.iter().all(|c| c[0] == first[0] && c[1] == first[1])
}

/// Round-robin over a seeded shuffle: random, reproducible, and every fold
/// gets at least one sample (n >= k is already checked).
fn random_assignment(n: usize, k: usize, rng: &mut StdRng) -> FoldAssignment {
    let mut order: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }
    let mut folds = vec![0u32; n];
    for (pos, &idx) in order.iter().enumerate() {
        folds[idx] = (pos % k) as u32;
    }
    FoldAssignment { folds, k }
}

#[inline]
fn dist2(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// k-means++ seeding: first centroid uniform, each next one drawn with
/// probability proportional to squared distance from the nearest chosen
/// centroid.
fn seed_centroids(coords: &[[f64; 2]], k: usize, rng: &mut StdRng) -> Vec<[f64; 2]> {
    let n = coords.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(coords[rng.gen_range(0..n)]);

    let mut nearest = vec![f64::INFINITY; n];
    while centroids.len() < k {
        let last = *centroids.last().unwrap();
        let mut total = 0.0;
        for (i, &c) in coords.iter().enumerate() {
            let d = dist2(c, last);
            if d < nearest[i] {
                nearest[i] = d;
            }
            total += nearest[i];
        }

        if total <= 0.0 {
            // Fewer distinct locations than centroids; fall back to a
            // uniform pick so seeding always terminates.
            centroids.push(coords[rng.gen_range(0..n)]);
            continue;
        }

        let mut threshold = rng.gen::<f64>() * total;
        let mut chosen = n - 1;
        for (i, &d) in nearest.iter().enumerate() {
            threshold -= d;
            if threshold <= 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(coords[chosen]);
    }
    centroids
}

/// Assign every point to its nearest centroid (ties break on the lower
/// centroid index). Returns whether any assignment changed.
fn assign_nearest(coords: &[[f64; 2]], centroids: &[[f64; 2]], assignment: &mut [u32]) -> bool {
    let mut changed = false;
    for (i, &c) in coords.iter().enumerate() {
        let mut best = 0u32;
        let mut best_d = f64::INFINITY;
        for (j, &cen) in centroids.iter().enumerate() {
            let d = dist2(c, cen);
            if d < best_d {
                best_d = d;
                best = j as u32;
            }
        }
        if assignment[i] != best {
            assignment[i] = best;
            changed = true;
        }
    }
    changed
}

/// Donate the point farthest from its centroid (among clusters that can
/// spare one) to each empty cluster.
fn repair_empty_clusters(
    coords: &[[f64; 2]],
    centroids: &[[f64; 2]],
    assignment: &mut [u32],
    k: usize,
) {
    loop {
        let mut sizes = vec![0usize; k];
        for &f in assignment.iter() {
            sizes[f as usize] += 1;
        }
        let Some(empty) = sizes.iter().position(|&s| s == 0) else {
            return;
        };

        let mut donor = None;
        let mut worst = -1.0;
        for (i, &f) in assignment.iter().enumerate() {
            if sizes[f as usize] <= 1 {
                continue;
            }
            let d = dist2(coords[i], centroids[f as usize]);
            if d > worst {
                worst = d;
                donor = Some(i);
            }
        }
        match donor {
            Some(i) => assignment[i] = empty as u32,
            // n >= k guarantees a donor exists; bail rather than spin.
            None => return,
        }
    }
}

fn update_centroids(coords: &[[f64; 2]], assignment: &[u32], centroids: &mut [[f64; 2]]) {
    let k = centroids.len();
    let mut sums = vec![[0.0f64; 2]; k];
    let mut counts = vec![0usize; k];
    for (i, &f) in assignment.iter().enumerate() {
        sums[f as usize][0] += coords[i][0];
        sums[f as usize][1] += coords[i][1];
        counts[f as usize] += 1;
    }
    for j in 0..k {
        if counts[j] > 0 {
            centroids[j] = [sums[j][0] / counts[j] as f64, sums[j][1] / counts[j] as f64];
        }
    }
}
