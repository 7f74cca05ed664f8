//! Benchmark execution over (split, learner) cells.
//!
//! Cells are mutually independent: each one trains a fresh model from the
//! shared config on its split's train side and predicts the held-out test
//! side. They run in parallel under rayon with read-only access to the
//! dataset and plan. Prediction records carry no ordering guarantee;
//! consumers group by (learner, split).

use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::BenchmarkConfig;
use crate::dataset::Dataset;
use crate::error::{GeocvError, Result};
use crate::learner::LearnerConfig;
use crate::report::{self, RunReport};
use crate::resampling::ResamplingPlan;

/// One out-of-fold prediction. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub sample: usize,
    pub split: usize,
    pub learner: String,
    pub predicted: f64,
    pub truth: f64,
}

/// A (learner, split) cell whose training failed, with the backend reason.
#[derive(Debug, Clone, Serialize)]
pub struct FailedCell {
    pub learner: String,
    pub split: usize,
    pub reason: String,
}

/// Cooperative cancellation flag. Raising it stops not-yet-started cells;
/// in-flight cells run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a benchmark run produced, before aggregation.
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<PredictionRecord>,
    pub failed: Vec<FailedCell>,
    /// Cells skipped because cancellation was raised before they started.
    pub cancelled_cells: usize,
}

enum CellResult {
    Done(Vec<PredictionRecord>),
    Failed(FailedCell),
    Cancelled,
}

/// Train and evaluate every learner on every split of the plan.
///
/// Per-cell `TrainingFailure` becomes a `FailedCell` entry; any other
/// error would indicate a plan/dataset mismatch and cannot occur once the
/// plan was built against this dataset's coordinates.
pub fn run(
    dataset: &Dataset,
    plan: &ResamplingPlan,
    learners: &[(String, LearnerConfig)],
    cancel: &CancelToken,
) -> RunOutcome {
    let cells: Vec<(usize, usize)> = (0..plan.len())
        .flat_map(|s| (0..learners.len()).map(move |l| (s, l)))
        .collect();
    log::info!(
        "benchmark run: {} splits x {} learners = {} cells",
        plan.len(),
        learners.len(),
        cells.len()
    );

    let results: Vec<CellResult> = cells
        .par_iter()
        .map(|&(split_idx, learner_idx)| {
            if cancel.is_cancelled() {
                return CellResult::Cancelled;
            }
            run_cell(dataset, plan, learners, split_idx, learner_idx)
        })
        .collect();

    let mut outcome = RunOutcome {
        records: Vec::new(),
        failed: Vec::new(),
        cancelled_cells: 0,
    };
    for result in results {
        match result {
            CellResult::Done(mut records) => outcome.records.append(&mut records),
            CellResult::Failed(cell) => {
                log::warn!(
                    "cell failed: learner '{}' split {}: {}",
                    cell.learner,
                    cell.split,
                    cell.reason
                );
                outcome.failed.push(cell);
            }
            CellResult::Cancelled => outcome.cancelled_cells += 1,
        }
    }
    log::info!(
        "benchmark run finished: {} records, {} failed cells, {} cancelled",
        outcome.records.len(),
        outcome.failed.len(),
        outcome.cancelled_cells
    );
    outcome
}

fn run_cell(
    dataset: &Dataset,
    plan: &ResamplingPlan,
    learners: &[(String, LearnerConfig)],
    split_idx: usize,
    learner_idx: usize,
) -> CellResult {
    let split = plan.get(split_idx);
    let (name, config) = &learners[learner_idx];
    let d = dataset.n_features();

    let (train_x, train_y) = dataset.gather(&split.train);
    // Fresh fitted state per cell; the shared config is read-only.
    let model = match config.fit(&train_x, d, &train_y) {
        Ok(model) => model,
        Err(GeocvError::TrainingFailure(reason)) => {
            return CellResult::Failed(FailedCell {
                learner: name.clone(),
                split: split_idx,
                reason,
            })
        }
        Err(other) => {
            return CellResult::Failed(FailedCell {
                learner: name.clone(),
                split: split_idx,
                reason: other.to_string(),
            })
        }
    };

    let (test_x, test_y) = dataset.gather(&split.test);
    let predictions = model.predict(&test_x, d);

    let records = split
        .test
        .iter()
        .zip(predictions.iter().zip(&test_y))
        .map(|(&sample, (&predicted, &truth))| PredictionRecord {
            sample,
            split: split_idx,
            learner: name.clone(),
            predicted,
            truth,
        })
        .collect();
    CellResult::Done(records)
}

/// Full pipeline: validate the config, build the resampling plan (fail
/// fast — nothing trains if partitioning fails), run every cell, and
/// aggregate into a report.
pub fn run_benchmark(
    dataset: &Dataset,
    config: &BenchmarkConfig,
    learners: &[(String, LearnerConfig)],
    cancel: &CancelToken,
) -> Result<RunReport> {
    if learners.is_empty() {
        return Err(GeocvError::InvalidConfig("no learners configured".into()));
    }
    // Records and aggregates are grouped by learner name; a duplicate would
    // silently pool two models' predictions into one row.
    for (i, (name, _)) in learners.iter().enumerate() {
        if learners[..i].iter().any(|(other, _)| other == name) {
            return Err(GeocvError::InvalidConfig(format!(
                "duplicate learner name '{name}'"
            )));
        }
    }
    config.validate(dataset.n_samples())?;

    let plan = ResamplingPlan::build(
        dataset.coords(),
        config.folds,
        config.repeats,
        config.seed,
        config.degenerate_policy,
    )?;
    let outcome = run(dataset, &plan, learners, cancel);
    Ok(report::build_report(config, learners, &outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{SampleRow, Schema};
    use crate::learner::{GlmParams, LinkFunction};
    use crate::partition::DegeneratePolicy;

    /// Linear-ish spatial dataset: target depends on both features, with
    /// some targets negative so a log-link learner always fails.
    fn dataset(n: usize) -> Dataset {
        let schema = Schema {
            feature_names: vec!["a".into(), "b".into()],
            target_name: "t".into(),
        };
        let rows: Vec<SampleRow> = (0..n)
            .map(|i| {
                let t = i as f64;
                SampleRow {
                    x: (t * 0.83).sin() * 50.0,
                    y: (t * 0.31).cos() * 50.0,
                    features: vec![t * 0.1, (t * 0.7).sin()],
                    target: 2.0 * t * 0.1 - 5.0 + (t * 0.7).sin(),
                }
            })
            .collect();
        Dataset::from_rows(schema, &rows).unwrap()
    }

    fn glm(link: LinkFunction) -> LearnerConfig {
        LearnerConfig::Glm(GlmParams { link })
    }

    #[test]
    fn every_cell_produces_records_or_a_failure() {
        let ds = dataset(60);
        let plan =
            ResamplingPlan::build(ds.coords(), 3, 2, 7, DegeneratePolicy::Fail).unwrap();
        let learners = vec![
            ("ols".to_string(), glm(LinkFunction::Identity)),
            ("gbt".to_string(), LearnerConfig::BoostedTrees(Default::default())),
        ];
        let outcome = run(&ds, &plan, &learners, &CancelToken::new());

        assert_eq!(outcome.cancelled_cells, 0);
        assert!(outcome.failed.is_empty(), "unexpected failures: {:?}", outcome.failed);
        // Each learner predicts each sample exactly once per repeat.
        assert_eq!(outcome.records.len(), 2 * 2 * 60);

        for learner in ["ols", "gbt"] {
            for split_idx in 0..plan.len() {
                let split = plan.get(split_idx);
                let mut predicted: Vec<usize> = outcome
                    .records
                    .iter()
                    .filter(|r| r.learner == learner && r.split == split_idx)
                    .map(|r| r.sample)
                    .collect();
                predicted.sort_unstable();
                assert_eq!(predicted, split.test, "coverage for {learner}/{split_idx}");
            }
        }
    }

    #[test]
    fn truth_values_match_the_dataset() {
        let ds = dataset(30);
        let plan =
            ResamplingPlan::build(ds.coords(), 3, 1, 1, DegeneratePolicy::Fail).unwrap();
        let learners = vec![("ols".to_string(), glm(LinkFunction::Identity))];
        let outcome = run(&ds, &plan, &learners, &CancelToken::new());
        for r in &outcome.records {
            assert_eq!(r.truth, ds.target(r.sample));
        }
    }

    #[test]
    fn failing_learner_is_recorded_not_fatal() {
        // Targets include negatives, so the log link fails on every split.
        let ds = dataset(40);
        let plan =
            ResamplingPlan::build(ds.coords(), 4, 1, 3, DegeneratePolicy::Fail).unwrap();
        let learners = vec![
            ("log-glm".to_string(), glm(LinkFunction::Log)),
            ("ols".to_string(), glm(LinkFunction::Identity)),
        ];
        let outcome = run(&ds, &plan, &learners, &CancelToken::new());

        assert_eq!(outcome.failed.len(), 4, "log link should fail on all 4 splits");
        assert!(outcome.failed.iter().all(|f| f.learner == "log-glm"));
        assert!(
            outcome.records.iter().all(|r| r.learner == "ols"),
            "only the healthy learner should have records"
        );
        assert_eq!(outcome.records.len(), 40);
    }

    #[test]
    fn pre_cancelled_run_schedules_nothing() {
        let ds = dataset(30);
        let plan =
            ResamplingPlan::build(ds.coords(), 3, 1, 1, DegeneratePolicy::Fail).unwrap();
        let learners = vec![("ols".to_string(), glm(LinkFunction::Identity))];
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = run(&ds, &plan, &learners, &cancel);
        assert!(outcome.records.is_empty());
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.cancelled_cells, 3);
    }

    #[test]
    fn duplicate_learner_names_rejected_before_training() {
        // Two different models under one name would merge their test rows
        // into a single metric group, so the run must refuse up front.
        let ds = dataset(60);
        let config = BenchmarkConfig { folds: 3, ..Default::default() };
        let learners = vec![
            ("m".to_string(), glm(LinkFunction::Identity)),
            ("m".to_string(), LearnerConfig::BoostedTrees(Default::default())),
        ];
        let err = run_benchmark(&ds, &config, &learners, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, GeocvError::InvalidConfig(_)), "got {err:?}");
        assert!(err.to_string().contains("duplicate learner name"), "got: {err}");
    }

    #[test]
    fn run_benchmark_fails_fast_on_bad_fold_count() {
        let ds = dataset(10);
        let config = BenchmarkConfig { folds: 20, ..Default::default() };
        let learners = vec![("ols".to_string(), glm(LinkFunction::Identity))];
        let err = run_benchmark(&ds, &config, &learners, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, GeocvError::InvalidFoldCount { .. }), "got {err:?}");
    }
}
