//! Metric aggregation, learner ranking, and the persisted run report.
//!
//! Aggregates follow the metric's combination rule: arithmetic mean across
//! splits for RMSE/MSE/bias, and for R² either the mean of per-split values
//! or one pooled R² over all out-of-fold predictions, per `R2Mode`. A
//! learner whose every cell failed gets missing (`null`) aggregates, never
//! a zero.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::BenchmarkConfig;
use crate::learner::LearnerConfig;
use crate::metrics::{self, MetricKind, R2Mode};
use crate::runner::{FailedCell, PredictionRecord, RunOutcome};

/// Ties on the primary metric within this tolerance are broken by R².
const RANK_TIE_EPS: f64 = 1e-4;

/// Metric values of one (learner, split) cell. NaN values serialize as
/// `null` and mark a flagged condition (empty test side, zero-variance
/// truth), never a real score.
#[derive(Debug, Clone, Serialize)]
pub struct SplitMetrics {
    pub learner: String,
    pub split: usize,
    pub n_test: usize,
    pub rmse: f64,
    pub mse: f64,
    pub bias: f64,
    pub r2: f64,
}

/// Cross-split aggregate for one learner. `None` means the learner had no
/// successful cells (or its values degenerated to NaN) — reported as
/// missing, not zero.
#[derive(Debug, Clone, Serialize)]
pub struct LearnerAggregate {
    pub learner: String,
    pub successful_splits: usize,
    pub failed_splits: usize,
    pub rmse: Option<f64>,
    pub mse: Option<f64>,
    pub bias: Option<f64>,
    pub r2: Option<f64>,
}

/// The persisted, reproducibility-oriented run report.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Config echo; `r2_mode` identifies the R² combination rule used.
    pub config: BenchmarkConfig,
    pub learners: Vec<String>,
    pub per_split: Vec<SplitMetrics>,
    pub aggregates: Vec<LearnerAggregate>,
    /// Learner names, best first by the primary metric.
    pub ranking: Vec<String>,
    pub failed_cells: Vec<FailedCell>,
    pub cancelled_cells: usize,
}

/// Aggregate a finished run. `learners` fixes the row order; records may
/// arrive in any order (concurrent cells complete unordered).
pub fn build_report(
    config: &BenchmarkConfig,
    learners: &[(String, LearnerConfig)],
    outcome: &RunOutcome,
) -> RunReport {
    let per_split = per_split_metrics(learners, &outcome.records);
    let aggregates = aggregate(learners, &outcome.records, &per_split, &outcome.failed, config.r2_mode);
    let ranking = rank_learners(&aggregates, config.primary_metric);

    RunReport {
        config: config.clone(),
        learners: learners.iter().map(|(name, _)| name.clone()).collect(),
        per_split,
        aggregates,
        ranking,
        failed_cells: outcome.failed.clone(),
        cancelled_cells: outcome.cancelled_cells,
    }
}

/// Group records by (learner, split) and compute the per-split table,
/// ordered by the configured learner order then split index.
fn per_split_metrics(
    learners: &[(String, LearnerConfig)],
    records: &[PredictionRecord],
) -> Vec<SplitMetrics> {
    let order: BTreeMap<&str, usize> = learners
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.as_str(), i))
        .collect();

    let mut groups: BTreeMap<(usize, usize), (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for r in records {
        let Some(&learner_idx) = order.get(r.learner.as_str()) else {
            continue;
        };
        let entry = groups.entry((learner_idx, r.split)).or_default();
        entry.0.push(r.predicted);
        entry.1.push(r.truth);
    }

    groups
        .into_iter()
        .map(|((learner_idx, split), (preds, truths))| SplitMetrics {
            learner: learners[learner_idx].0.clone(),
            split,
            n_test: preds.len(),
            rmse: metrics::rmse(&preds, &truths),
            mse: metrics::mse(&preds, &truths),
            bias: metrics::bias(&preds, &truths),
            r2: metrics::r2(&preds, &truths),
        })
        .collect()
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return None;
    }
    Some(collected.iter().sum::<f64>() / collected.len() as f64)
}

fn aggregate(
    learners: &[(String, LearnerConfig)],
    records: &[PredictionRecord],
    per_split: &[SplitMetrics],
    failed: &[FailedCell],
    r2_mode: R2Mode,
) -> Vec<LearnerAggregate> {
    learners
        .iter()
        .map(|(name, _)| {
            let rows: Vec<&SplitMetrics> =
                per_split.iter().filter(|m| &m.learner == name).collect();
            let failed_splits = failed.iter().filter(|f| &f.learner == name).count();

            let r2 = match r2_mode {
                R2Mode::MeanPerSplit => mean_of(rows.iter().map(|m| m.r2)),
                R2Mode::Pooled => {
                    let (preds, truths): (Vec<f64>, Vec<f64>) = records
                        .iter()
                        .filter(|r| &r.learner == name)
                        .map(|r| (r.predicted, r.truth))
                        .unzip();
                    if preds.is_empty() {
                        None
                    } else {
                        Some(metrics::r2(&preds, &truths))
                    }
                }
            };

            LearnerAggregate {
                learner: name.clone(),
                successful_splits: rows.len(),
                failed_splits,
                rmse: mean_of(rows.iter().map(|m| m.rmse)),
                mse: mean_of(rows.iter().map(|m| m.mse)),
                bias: mean_of(rows.iter().map(|m| m.bias)),
                r2,
            }
        })
        .collect()
}

/// The value a learner is ranked by: bias counts by magnitude, NaN counts
/// as missing (a NaN cannot order and must not beat a real number).
fn primary_value(agg: &LearnerAggregate, primary: MetricKind) -> Option<f64> {
    let v = match primary {
        MetricKind::Rmse => agg.rmse,
        MetricKind::Mse => agg.mse,
        MetricKind::Bias => agg.bias.map(f64::abs),
        MetricKind::R2 => agg.r2,
    };
    v.filter(|x| !x.is_nan())
}

/// Total-order ranking key: primary values are bucketed to the tie
/// tolerance (lower bucket is better; direction-adjusted so R²-as-primary
/// still works), equal buckets fall back to higher R², then name. Missing
/// primaries rank last; a missing R² loses any R² comparison.
fn rank_key(agg: &LearnerAggregate, primary: MetricKind) -> (bool, f64, f64) {
    match primary_value(agg, primary) {
        None => (true, 0.0, f64::INFINITY),
        Some(v) => {
            let directed = if primary.lower_is_better() { v } else { -v };
            let bucket = (directed / RANK_TIE_EPS).round();
            let r2_key = match agg.r2.filter(|v| !v.is_nan()) {
                Some(r2) => -r2,
                None => f64::INFINITY,
            };
            (false, bucket, r2_key)
        }
    }
}

/// Order learners best-first by the primary metric. Lower is better except
/// for R². Primary values landing in the same `RANK_TIE_EPS` bucket break
/// by higher R², then by name so the ranking is stable. Learners with a
/// missing primary value rank last. The key is a total order, so the
/// result is well-defined even when several learners sit within the
/// tolerance of each other.
pub fn rank_learners(aggregates: &[LearnerAggregate], primary: MetricKind) -> Vec<String> {
    let mut order: Vec<&LearnerAggregate> = aggregates.iter().collect();
    order.sort_by(|a, b| {
        let (ma, ba, ra) = rank_key(a, primary);
        let (mb, bb, rb) = rank_key(b, primary);
        ma.cmp(&mb)
            .then(ba.total_cmp(&bb))
            .then(ra.total_cmp(&rb))
            .then_with(|| a.learner.cmp(&b.learner))
    });
    order.into_iter().map(|a| a.learner.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::GlmParams;
    use approx::assert_relative_eq;

    fn learner_list(names: &[&str]) -> Vec<(String, LearnerConfig)> {
        names
            .iter()
            .map(|n| (n.to_string(), LearnerConfig::Glm(GlmParams::default())))
            .collect()
    }

    fn record(learner: &str, split: usize, sample: usize, predicted: f64, truth: f64) -> PredictionRecord {
        PredictionRecord {
            sample,
            split,
            learner: learner.to_string(),
            predicted,
            truth,
        }
    }

    fn agg(name: &str, rmse: Option<f64>, r2: Option<f64>) -> LearnerAggregate {
        LearnerAggregate {
            learner: name.to_string(),
            successful_splits: if rmse.is_some() { 1 } else { 0 },
            failed_splits: 0,
            rmse,
            mse: rmse.map(|v| v * v),
            bias: rmse.map(|_| 0.0),
            r2,
        }
    }

    #[test]
    fn all_failed_learner_reports_missing_not_zero() {
        let learners = learner_list(&["healthy", "broken"]);
        let outcome = RunOutcome {
            records: vec![
                record("healthy", 0, 0, 1.0, 1.0),
                record("healthy", 0, 1, 2.0, 2.5),
                record("healthy", 1, 2, 3.0, 2.0),
                record("healthy", 1, 3, 4.0, 4.5),
            ],
            failed: vec![
                FailedCell { learner: "broken".into(), split: 0, reason: "singular".into() },
                FailedCell { learner: "broken".into(), split: 1, reason: "singular".into() },
            ],
            cancelled_cells: 0,
        };
        let report = build_report(&BenchmarkConfig::default(), &learners, &outcome);

        let healthy = report.aggregates.iter().find(|a| a.learner == "healthy").unwrap();
        assert!(healthy.rmse.is_some_and(|v| v.is_finite()));
        assert_eq!(healthy.successful_splits, 2);

        let broken = report.aggregates.iter().find(|a| a.learner == "broken").unwrap();
        assert_eq!(broken.successful_splits, 0);
        assert_eq!(broken.failed_splits, 2);
        assert!(broken.rmse.is_none(), "missing, not zero or NaN");
        assert!(broken.r2.is_none());

        assert_eq!(report.ranking, vec!["healthy".to_string(), "broken".to_string()]);
        assert_eq!(report.failed_cells.len(), 2);
    }

    #[test]
    fn rmse_ties_break_by_higher_r2() {
        // Tied to 4 decimal places on RMSE; the higher R² must win.
        let aggregates = vec![
            agg("low-r2", Some(0.50001), Some(0.60)),
            agg("high-r2", Some(0.50004), Some(0.85)),
        ];
        let ranking = rank_learners(&aggregates, MetricKind::Rmse);
        assert_eq!(ranking, vec!["high-r2".to_string(), "low-r2".to_string()]);
    }

    #[test]
    fn clear_rmse_gap_ignores_r2() {
        let aggregates = vec![
            agg("worse", Some(0.9), Some(0.99)),
            agg("better", Some(0.3), Some(0.10)),
        ];
        let ranking = rank_learners(&aggregates, MetricKind::Rmse);
        assert_eq!(ranking[0], "better");
    }

    #[test]
    fn r2_primary_ranks_higher_first() {
        let aggregates = vec![
            agg("a", Some(0.5), Some(0.4)),
            agg("b", Some(0.5), Some(0.8)),
        ];
        let ranking = rank_learners(&aggregates, MetricKind::R2);
        assert_eq!(ranking[0], "b");
    }

    #[test]
    fn chained_near_ties_rank_consistently() {
        // Each neighbour is within the tolerance of the next but the ends
        // are not, and R² opposes the RMSE order. The bucketed key is a
        // total order, so the result must not depend on input order.
        let a = agg("a", Some(0.0), Some(0.1));
        let b = agg("b", Some(0.00008), Some(0.5));
        let c = agg("c", Some(0.00016), Some(0.9));
        let forward = rank_learners(&[a.clone(), b.clone(), c.clone()], MetricKind::Rmse);
        let backward = rank_learners(&[c, b, a], MetricKind::Rmse);
        assert_eq!(forward, backward, "ranking must be input-order independent");
        assert_eq!(forward, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn nan_primary_ranks_as_missing() {
        let aggregates = vec![
            agg("nan", Some(f64::NAN), None),
            agg("real", Some(2.0), Some(0.1)),
        ];
        let ranking = rank_learners(&aggregates, MetricKind::Rmse);
        assert_eq!(ranking, vec!["real".to_string(), "nan".to_string()]);
    }

    #[test]
    fn pooled_and_mean_r2_diverge() {
        // Split 0: perfect fit on low-variance truth. Split 1: poor fit on
        // high-variance truth. Mean-per-split averages 1.0 with something
        // small; pooling over all pairs gives one blended value.
        let learners = learner_list(&["m"]);
        let records = vec![
            record("m", 0, 0, 1.0, 1.0),
            record("m", 0, 1, 1.1, 1.1),
            record("m", 0, 2, 1.2, 1.2),
            record("m", 1, 3, 0.0, 10.0),
            record("m", 1, 4, 20.0, 12.0),
            record("m", 1, 5, 5.0, 14.0),
        ];
        let outcome = RunOutcome { records, failed: vec![], cancelled_cells: 0 };

        let mean_cfg = BenchmarkConfig { r2_mode: R2Mode::MeanPerSplit, ..Default::default() };
        let pooled_cfg = BenchmarkConfig { r2_mode: R2Mode::Pooled, ..Default::default() };
        let mean_r2 = build_report(&mean_cfg, &learners, &outcome).aggregates[0].r2.unwrap();
        let pooled_r2 = build_report(&pooled_cfg, &learners, &outcome).aggregates[0].r2.unwrap();
        assert!(
            (mean_r2 - pooled_r2).abs() > 1e-6,
            "modes should diverge: mean={mean_r2} pooled={pooled_r2}"
        );
    }

    #[test]
    fn per_split_table_matches_record_groups() {
        let learners = learner_list(&["m"]);
        let outcome = RunOutcome {
            records: vec![
                record("m", 0, 0, 2.0, 1.0),
                record("m", 0, 1, 3.0, 3.0),
                record("m", 1, 2, 5.0, 5.0),
            ],
            failed: vec![],
            cancelled_cells: 0,
        };
        let report = build_report(&BenchmarkConfig::default(), &learners, &outcome);
        assert_eq!(report.per_split.len(), 2);
        let s0 = &report.per_split[0];
        assert_eq!((s0.split, s0.n_test), (0, 2));
        // Errors 1 and 0 → MSE 0.5, bias 0.5.
        assert_relative_eq!(s0.mse, 0.5);
        assert_relative_eq!(s0.bias, 0.5);
    }

    #[test]
    fn report_serializes_to_json() {
        let learners = learner_list(&["m"]);
        let outcome = RunOutcome {
            records: vec![record("m", 0, 0, 1.0, 1.0)],
            failed: vec![],
            cancelled_cells: 0,
        };
        let report = build_report(&BenchmarkConfig::default(), &learners, &outcome);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"ranking\""));
        assert!(json.contains("\"r2_mode\""));
    }
}
