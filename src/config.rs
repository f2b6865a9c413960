//! Run configuration for the optimization loop.
//!
//! One immutable value threaded through constructors. Nothing in the crate
//! reads configuration from globals; the CLI builds this once from flags and
//! hands it to the [`crate::optimizer::Optimizer`].

use serde::Serialize;

/// Configuration for one optimization run.
///
/// Serialized into the run report so every artifact records the exact
/// parameters that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerConfig {
    /// Maximum refinement rounds after the baseline test.
    pub max_iterations: usize,
    /// Stop once accuracy (percent, 0-100) reaches this.
    pub target_accuracy: f64,
    /// Stop once mean score reaches this (joint with `target_accuracy`).
    pub target_score: f64,
    /// Source markets tested per topic group.
    pub tests_per_topic: usize,
    /// Candidate markets offered alongside each source.
    pub candidates_per_test: usize,
    /// Upper bound on few-shot exemplars spliced into the template.
    pub few_shot_examples: usize,
    /// Model that executes the candidate template.
    pub model: String,
    /// Model that rewrites the relationship-definitions region.
    pub mutation_model: String,
    /// Topic keywords used to partition the dataset.
    pub topics: Vec<String>,
    /// Per-topic listing size requested from the data provider.
    pub fetch_limit: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            target_accuracy: 75.0,
            target_score: 0.3,
            tests_per_topic: 3,
            candidates_per_test: 10,
            few_shot_examples: 3,
            model: "gpt-4o-mini".to_string(),
            mutation_model: "gpt-4o".to_string(),
            topics: default_topics(),
            fetch_limit: 100,
        }
    }
}

/// Topics that tend to yield interconnected markets.
pub fn default_topics() -> Vec<String> {
    [
        "Trump",
        "Bitcoin",
        "Fed",
        "election",
        "China",
        "Ukraine",
        "AI",
        "recession",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
