//! Multi-layer optimization loop.
//!
//! Round 0 tests the bare base candidate. Each subsequent round layers
//! exemplars from the previous round's results onto a fresh base, optionally
//! asks the mutator to rewrite the relationship definitions, retests, and
//! keeps the best candidate seen so far. Stops early once both targets are
//! met.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OptimizerConfig;
use crate::exemplars::{build_failure_warnings, build_positive_exemplars};
use crate::gateway::ChatGateway;
use crate::markets::{MarketError, MarketGroup};
use crate::mutator::Mutator;
use crate::template::CandidateTemplate;
use crate::tester::{CandidateTester, Prediction, TestRun};

/// Below this accuracy the mutator runs even on the first round.
const MUTATION_ACCURACY_FLOOR: f64 = 40.0;

/// How many good/bad predictions each iteration record keeps.
const SAMPLE_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum OptimizeError {
    /// No topic group survived filtering; nothing to optimize against.
    #[error("no usable market groups")]
    NoUsableGroups,

    #[error(transparent)]
    Market(#[from] MarketError),
}

/// Per-round record kept for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub candidate_len: usize,
    pub accuracy: f64,
    pub mean_score: f64,
    pub total_predictions: usize,
    pub correct_predictions: usize,
    pub good_samples: Vec<Prediction>,
    pub bad_samples: Vec<Prediction>,
    pub changes: Vec<String>,
}

/// Final state of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub run_id: Uuid,
    pub best_candidate: CandidateTemplate,
    pub best_accuracy: f64,
    pub best_mean_score: f64,
    pub history: Vec<IterationRecord>,
}

/// Retention rule: strictly better accuracy wins; equal accuracy falls
/// through to strictly better mean score.
pub fn is_improvement(
    best_accuracy: f64,
    best_score: f64,
    accuracy: f64,
    score: f64,
) -> bool {
    accuracy > best_accuracy || (accuracy == best_accuracy && score > best_score)
}

pub struct Optimizer {
    config: OptimizerConfig,
    run_id: Uuid,
    tester: CandidateTester,
    mutator: Mutator,
}

impl Optimizer {
    /// One optimizer value per run; the run id minted here is stamped into
    /// every gateway request and into the final outcome.
    pub fn new(config: OptimizerConfig, gateway: Arc<dyn ChatGateway>) -> Self {
        let run_id = Uuid::new_v4();
        let tester = CandidateTester::new(Arc::clone(&gateway), &config).with_run(run_id);
        let mutator = Mutator::new(gateway, config.mutation_model.clone()).with_run(run_id);
        Self {
            config,
            run_id,
            tester,
            mutator,
        }
    }

    fn meets_targets(&self, accuracy: f64, score: f64) -> bool {
        accuracy >= self.config.target_accuracy && score >= self.config.target_score
    }

    fn record(
        iteration: usize,
        candidate: &CandidateTemplate,
        run: &TestRun,
        changes: Vec<String>,
        with_samples: bool,
    ) -> IterationRecord {
        let (total, correct) = run.totals();
        let sample = |v: &[Prediction]| {
            if with_samples {
                v.iter().take(SAMPLE_LIMIT).cloned().collect()
            } else {
                Vec::new()
            }
        };
        IterationRecord {
            iteration,
            candidate_len: candidate.len_bytes(),
            accuracy: run.accuracy(),
            mean_score: run.mean_score(),
            total_predictions: total,
            correct_predictions: correct,
            good_samples: sample(&run.good),
            bad_samples: sample(&run.bad),
            changes,
        }
    }

    /// Run the full loop against pre-fetched market groups.
    pub async fn run(&self, groups: &[MarketGroup]) -> Result<OptimizationOutcome, OptimizeError> {
        if groups.is_empty() {
            return Err(OptimizeError::NoUsableGroups);
        }

        let run_id = self.run_id;
        info!(%run_id, groups = groups.len(), "starting optimization run");

        // Round 0: base candidate with the exemplar sections blanked out.
        let baseline = CandidateTemplate::base().with_exemplars("", "");
        let run = self.tester.test(&baseline, groups).await;

        let mut accuracy = run.accuracy();
        let mut mean_score = run.mean_score();
        let mut good = run.good.clone();
        let mut bad = run.bad.clone();

        info!(
            accuracy,
            mean_score,
            good = good.len(),
            bad = bad.len(),
            "baseline complete"
        );

        let mut history = vec![Self::record(
            0,
            &baseline,
            &run,
            vec!["Initial baseline test".to_string()],
            false,
        )];

        let mut best_candidate = baseline;
        let mut best_accuracy = accuracy;
        let mut best_mean_score = mean_score;

        if self.meets_targets(accuracy, mean_score) {
            info!("baseline already meets targets");
        } else {
            for iteration in 1..=self.config.max_iterations {
                info!(iteration, "optimization round");
                let mut changes = Vec::new();

                // Layer 1: few-shot exemplars from the previous round.
                let few_shot = build_positive_exemplars(&good, self.config.few_shot_examples);
                if few_shot.is_empty() {
                    warn!(iteration, "no good examples to add");
                } else {
                    changes.push(format!(
                        "Added {} few-shot examples",
                        good.len().min(self.config.few_shot_examples)
                    ));
                }

                // Layer 2: warnings from the previous round's failures.
                let warnings = build_failure_warnings(&bad);
                if warnings.is_empty() {
                    warn!(iteration, "no warnings to add");
                } else {
                    let mut kinds: Vec<&str> = Vec::new();
                    for p in &bad {
                        if !kinds.contains(&p.relationship.as_str()) {
                            kinds.push(&p.relationship);
                        }
                    }
                    changes.push(format!(
                        "Added warnings for {} relationship types",
                        kinds.len()
                    ));
                }

                // Exemplars are rebuilt from scratch each round, never stacked.
                let mut candidate = CandidateTemplate::base().with_exemplars(&few_shot, &warnings);

                // Layer 3: mutation on round 2+, or immediately when the
                // previous round scored badly.
                if iteration >= 2 || accuracy < MUTATION_ACCURACY_FLOOR {
                    let outcome = self
                        .mutator
                        .mutate(&candidate, accuracy, mean_score, &bad)
                        .await;
                    if outcome.applied {
                        changes.push("Applied LLM-based prompt mutation".to_string());
                    }
                    candidate = outcome.candidate;
                }

                let run = self.tester.test(&candidate, groups).await;
                accuracy = run.accuracy();
                mean_score = run.mean_score();
                good = run.good.clone();
                bad = run.bad.clone();

                info!(iteration, accuracy, mean_score, "round complete");

                history.push(Self::record(iteration, &candidate, &run, changes, true));

                if is_improvement(best_accuracy, best_mean_score, accuracy, mean_score) {
                    info!(iteration, "new best candidate");
                    best_candidate = candidate;
                    best_accuracy = accuracy;
                    best_mean_score = mean_score;
                }

                if self.meets_targets(accuracy, mean_score) {
                    info!(iteration, "targets reached");
                    break;
                }
            }
        }

        Ok(OptimizationOutcome {
            run_id,
            best_candidate,
            best_accuracy,
            best_mean_score,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_on_strictly_better_accuracy() {
        assert!(is_improvement(50.0, 0.10, 51.0, -0.50));
        assert!(!is_improvement(50.0, 0.10, 49.0, 0.90));
    }

    #[test]
    fn equal_accuracy_breaks_tie_on_score() {
        assert!(is_improvement(50.0, 0.10, 50.0, 0.15));
        assert!(!is_improvement(50.0, 0.10, 50.0, 0.10));
        assert!(!is_improvement(50.0, 0.10, 50.0, 0.05));
    }
}
