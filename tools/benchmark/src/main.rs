//! Benchmark runner CLI: load a JSON sample table and a run config, fit
//! every configured learner across the spatial resampling plan, and write
//! the JSON report.
//!
//! Dataset format: `{"schema": {"feature_names": [...], "target_name":
//! "..."}, "rows": [{"x", "y", "features", "target"}, ...]}`.
//! Run file format: `{"config": {...BenchmarkConfig...}, "learners":
//! [{"name": "...", "kind": "boosted_trees" | "glm", ...params}, ...]}`;
//! both halves optional.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use geocv_core::{
    run_benchmark, BenchmarkConfig, BoostedTreesParams, CancelToken, Dataset, DatasetFile,
    GlmParams, LearnerConfig, RunReport,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "benchmark",
    about = "Run a spatial cross-validation benchmark over a JSON sample table"
)]
struct Args {
    /// Dataset JSON file.
    #[arg(short, long)]
    input: PathBuf,

    /// Run file (config + learners). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report JSON output path (stdout when omitted).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the report JSON.
    #[arg(long)]
    pretty: bool,
}

// ── Run file schema ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LearnerEntry {
    name: String,
    #[serde(flatten)]
    config: LearnerConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RunFile {
    #[serde(default)]
    config: Option<BenchmarkConfig>,
    #[serde(default)]
    learners: Vec<LearnerEntry>,
}

/// Default head-to-head pair when the run file names no learners.
fn default_learners() -> Vec<(String, LearnerConfig)> {
    vec![
        (
            "boosted_trees".to_string(),
            LearnerConfig::BoostedTrees(BoostedTreesParams::default()),
        ),
        ("glm".to_string(), LearnerConfig::Glm(GlmParams::default())),
    ]
}

fn print_summary(report: &RunReport) {
    eprintln!("learner              splits  rmse        bias        r2");
    for agg in &report.aggregates {
        let fmt = |v: Option<f64>| match v {
            Some(v) if !v.is_nan() => format!("{v:<11.4}"),
            _ => format!("{:<11}", "missing"),
        };
        eprintln!(
            "{:<20} {:>3}/{:<3} {} {} {}",
            agg.learner,
            agg.successful_splits,
            agg.successful_splits + agg.failed_splits,
            fmt(agg.rmse),
            fmt(agg.bias),
            fmt(agg.r2),
        );
    }
    eprintln!("ranking ({}): {}", report.config.primary_metric.name(), report.ranking.join(" > "));
    for cell in &report.failed_cells {
        eprintln!("failed: {} split {}: {}", cell.learner, cell.split, cell.reason);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let dataset_text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading dataset {}", args.input.display()))?;
    let file: DatasetFile =
        serde_json::from_str(&dataset_text).context("parsing dataset JSON")?;
    let dataset = Dataset::from_file(file).context("validating dataset")?;
    eprintln!(
        "loaded {} samples, {} features, target '{}'",
        dataset.n_samples(),
        dataset.n_features(),
        dataset.schema().target_name
    );

    let run_file = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading run file {}", path.display()))?;
            serde_json::from_str(&text).context("parsing run file JSON")?
        }
        None => RunFile::default(),
    };
    let config = run_file.config.unwrap_or_default();
    let learners: Vec<(String, LearnerConfig)> = if run_file.learners.is_empty() {
        default_learners()
    } else {
        run_file
            .learners
            .into_iter()
            .map(|e| (e.name, e.config))
            .collect()
    };

    let report = run_benchmark(&dataset, &config, &learners, &CancelToken::new())
        .context("benchmark run")?;
    print_summary(&report);

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    match &args.output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("writing report {}", path.display()))?;
            eprintln!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
