//! Report generation and artifact writing for optimization runs.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::config::OptimizerConfig;
use crate::optimizer::{IterationRecord, OptimizationOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub baseline_accuracy: f64,
    pub final_accuracy: f64,
    pub accuracy_improvement: f64,
    pub baseline_score: f64,
    pub final_score: f64,
    pub score_improvement: f64,
    pub total_iterations: usize,
    pub candidate_len_change: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub run_id: String,
    /// blake3 of the best candidate's skeleton, for deduplication.
    pub candidate_hash: String,
    pub config: OptimizerConfig,
    pub summary: RunSummary,
    pub iterations: Vec<IterationRecord>,
}

pub fn build_report(config: &OptimizerConfig, outcome: &OptimizationOutcome) -> RunReport {
    let baseline = &outcome.history[0];
    let final_len = outcome.best_candidate.len_bytes() as i64;
    let baseline_len = baseline.candidate_len as i64;

    RunReport {
        timestamp: Local::now().to_rfc3339(),
        run_id: outcome.run_id.to_string(),
        candidate_hash: hash_candidate(&outcome.best_candidate.skeleton()),
        config: config.clone(),
        summary: RunSummary {
            baseline_accuracy: baseline.accuracy,
            final_accuracy: outcome.best_accuracy,
            accuracy_improvement: outcome.best_accuracy - baseline.accuracy,
            baseline_score: baseline.mean_score,
            final_score: outcome.best_mean_score,
            score_improvement: outcome.best_mean_score - baseline.mean_score,
            total_iterations: outcome.history.len() - 1,
            candidate_len_change: final_len - baseline_len,
        },
        iterations: outcome.history.clone(),
    }
}

pub fn render_report_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Prompt Optimization Report\n");
    out.push_str(&format!("Generated: {}\n", report.timestamp));
    out.push_str(&format!("Run: `{}`\n", report.run_id));
    out.push_str(&format!("Candidate hash: `{}`\n\n", report.candidate_hash));

    let s = &report.summary;
    out.push_str("## Summary\n\n");
    out.push_str("| Metric | Baseline | Final | Change |\n");
    out.push_str("|--------|----------|-------|--------|\n");
    out.push_str(&format!(
        "| Accuracy | {:.1}% | {:.1}% | {:+.1}% |\n",
        s.baseline_accuracy, s.final_accuracy, s.accuracy_improvement
    ));
    out.push_str(&format!(
        "| Profit Score | {:.2} | {:.2} | {:+.2} |\n",
        s.baseline_score, s.final_score, s.score_improvement
    ));
    out.push_str(&format!(
        "| Prompt Length | {} | {} | {:+} |\n",
        report.iterations[0].candidate_len,
        (report.iterations[0].candidate_len as i64 + s.candidate_len_change),
        s.candidate_len_change
    ));

    out.push_str("\n## Iterations\n\n");
    for it in &report.iterations {
        if it.iteration == 0 {
            out.push_str("### Baseline\n");
        } else {
            out.push_str(&format!("### Iteration {}\n", it.iteration));
        }
        out.push_str(&format!("- Accuracy: {:.1}%\n", it.accuracy));
        out.push_str(&format!("- Profit: {:.2}\n", it.mean_score));
        out.push_str(&format!(
            "- Predictions: {}/{}\n",
            it.correct_predictions, it.total_predictions
        ));
        let changes = if it.changes.is_empty() {
            "None".to_string()
        } else {
            it.changes.join(", ")
        };
        out.push_str(&format!("- Changes: {changes}\n\n"));
    }

    out
}

/// Files written at the end of a run.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub best_prompt: PathBuf,
    pub versioned_prompt: PathBuf,
    pub data_json: PathBuf,
    pub report_md: PathBuf,
}

/// Write all run artifacts under `out_dir`, creating it if needed.
///
/// `BEST_PROMPT.txt` is always the latest winner; the versioned copy
/// carries the timestamp and metrics in its filename so past runs are
/// never overwritten.
pub fn write_artifacts(
    out_dir: &Path,
    config: &OptimizerConfig,
    outcome: &OptimizationOutcome,
) -> io::Result<ArtifactPaths> {
    std::fs::create_dir_all(out_dir)?;

    let report = build_report(config, outcome);
    let best_skeleton = outcome.best_candidate.skeleton();

    let best_prompt = out_dir.join("BEST_PROMPT.txt");
    std::fs::write(&best_prompt, &best_skeleton)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let acc_str = format!("{:.0}acc", outcome.best_accuracy);
    let score_str = format!("{:.2}score", outcome.best_mean_score)
        .replace('.', "p")
        .replace('-', "neg");
    let versioned_prompt = out_dir.join(format!("prompt_{stamp}_{acc_str}_{score_str}.txt"));
    std::fs::write(&versioned_prompt, &best_skeleton)?;

    let data_json = out_dir.join("optimization_data.json");
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(&data_json, json)?;

    let report_md = out_dir.join("OPTIMIZATION_REPORT.md");
    std::fs::write(&report_md, render_report_markdown(&report))?;

    info!(dir = %out_dir.display(), "wrote run artifacts");

    Ok(ArtifactPaths {
        best_prompt,
        versioned_prompt,
        data_json,
        report_md,
    })
}

fn hash_candidate(skeleton: &str) -> String {
    blake3::hash(skeleton.as_bytes()).to_hex().to_string()
}
