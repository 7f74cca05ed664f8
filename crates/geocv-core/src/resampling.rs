//! Repeated train/test splits derived from spatial fold assignments.
//!
//! A plan holds `repeats * folds` splits, generated eagerly at build time
//! so iteration is free, restartable, and always yields the same sequence.
//! Each repeat re-partitions with a seed derived from the base seed, so the
//! whole plan reproduces from one number.

use crate::error::{GeocvError, Result};
use crate::partition::{partition, DegeneratePolicy};

/// Mixed with the repeat index so repeats get distinct partition seeds.
const REPEAT_SEED_SALT: u64 = 0xA076_1D64_78BD_642F;

/// One train/test division of the sample indices.
///
/// Invariants: `train` and `test` are disjoint, both ascending, and their
/// union is `[0, n_samples)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Repeat this split belongs to, `[0, repeats)`.
    pub repeat: usize,
    /// Fold held out as the test side, `[0, folds)`.
    pub fold: usize,
}

/// Ordered, cached sequence of splits: repeat-major, fold-minor.
#[derive(Debug, Clone)]
pub struct ResamplingPlan {
    splits: Vec<Split>,
    folds: usize,
    repeats: usize,
}

impl ResamplingPlan {
    /// Partition `coords` `repeats` times and expand every fold into a
    /// split. Fails fast: any partition or empty-side problem aborts here,
    /// before any training happens.
    pub fn build(
        coords: &[[f64; 2]],
        folds: usize,
        repeats: usize,
        seed: u64,
        policy: DegeneratePolicy,
    ) -> Result<Self> {
        if repeats < 1 {
            return Err(GeocvError::InvalidConfig("repeats must be >= 1".into()));
        }

        let n = coords.len();
        let mut splits = Vec::with_capacity(folds * repeats);

        for repeat in 0..repeats {
            let repeat_seed = seed ^ REPEAT_SEED_SALT.wrapping_mul(repeat as u64 + 1);
            let assignment = partition(coords, folds, repeat_seed, policy)?;

            for fold in 0..folds {
                let test = assignment.indices_of(fold as u32);
                let train: Vec<usize> =
                    (0..n).filter(|&i| assignment.fold_of(i) != fold as u32).collect();

                let split_idx = splits.len();
                if test.is_empty() {
                    return Err(GeocvError::EmptySplit { split: split_idx, side: "test" });
                }
                if train.is_empty() {
                    return Err(GeocvError::EmptySplit { split: split_idx, side: "train" });
                }
                splits.push(Split { train, test, repeat, fold });
            }
        }

        Ok(Self { splits, folds, repeats })
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }

    pub fn get(&self, i: usize) -> &Split {
        &self.splits[i]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Split> {
        self.splits.iter()
    }
}

impl<'a> IntoIterator for &'a ResamplingPlan {
    type Item = &'a Split;
    type IntoIter = std::slice::Iter<'a, Split>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scatter(n: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                [(t * 0.917).sin() * 25.0, (t * 0.449).cos() * 25.0 + t * 0.003]
            })
            .collect()
    }

    #[test]
    fn plan_length_is_folds_times_repeats() {
        let coords = scatter(60);
        let plan = ResamplingPlan::build(&coords, 4, 3, 11, DegeneratePolicy::Fail).unwrap();
        assert_eq!(plan.len(), 12);
        assert_eq!(plan.folds(), 4);
        assert_eq!(plan.repeats(), 3);
    }

    #[test]
    fn every_split_is_disjoint_and_covering() {
        let coords = scatter(60);
        let plan = ResamplingPlan::build(&coords, 5, 2, 7, DegeneratePolicy::Fail).unwrap();
        for (si, split) in plan.iter().enumerate() {
            let mut seen = vec![0u8; 60];
            for &i in &split.train {
                seen[i] += 1;
            }
            for &i in &split.test {
                seen[i] += 1;
            }
            assert!(
                seen.iter().all(|&c| c == 1),
                "split {si}: indices not covered exactly once"
            );
            assert!(!split.test.is_empty() && !split.train.is_empty());
        }
    }

    #[test]
    fn six_folds_cover_three_hundred_samples_exactly_once() {
        let coords = scatter(300);
        let plan = ResamplingPlan::build(&coords, 6, 1, 42, DegeneratePolicy::Fail).unwrap();
        assert_eq!(plan.len(), 6);

        let mut held_out = vec![0u8; 300];
        for split in &plan {
            for &i in &split.test {
                held_out[i] += 1;
            }
        }
        assert!(
            held_out.iter().all(|&c| c == 1),
            "union of test sets must be all indices exactly once"
        );
    }

    #[test]
    fn reiteration_yields_identical_splits() {
        let coords = scatter(40);
        let plan = ResamplingPlan::build(&coords, 4, 2, 5, DegeneratePolicy::Fail).unwrap();
        let first: Vec<Split> = plan.iter().cloned().collect();
        let second: Vec<Split> = plan.iter().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn rebuilding_with_same_seed_reproduces_the_plan() {
        let coords = scatter(40);
        let a = ResamplingPlan::build(&coords, 4, 2, 5, DegeneratePolicy::Fail).unwrap();
        let b = ResamplingPlan::build(&coords, 4, 2, 5, DegeneratePolicy::Fail).unwrap();
        let va: Vec<&Split> = a.iter().collect();
        let vb: Vec<&Split> = b.iter().collect();
        assert_eq!(va, vb);
    }

    #[test]
    fn repeats_use_distinct_partitions() {
        let coords = scatter(80);
        let plan = ResamplingPlan::build(&coords, 4, 2, 9, DegeneratePolicy::Fail).unwrap();
        // Compare the grouping of repeat 0 vs repeat 1 (label-insensitive).
        let groups = |repeat: usize| {
            let mut g: Vec<Vec<usize>> = plan
                .iter()
                .filter(|s| s.repeat == repeat)
                .map(|s| s.test.clone())
                .collect();
            g.sort();
            g
        };
        assert_ne!(groups(0), groups(1), "repeats should re-partition differently");
    }

    #[test]
    fn zero_repeats_rejected() {
        let coords = scatter(20);
        let err =
            ResamplingPlan::build(&coords, 4, 0, 1, DegeneratePolicy::Fail).unwrap_err();
        assert!(matches!(err, GeocvError::InvalidConfig(_)), "got {err:?}");
    }
}
