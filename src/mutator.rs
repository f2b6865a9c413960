//! Candidate mutation via the generative service.
//!
//! When a candidate underperforms, a stronger model is asked to rewrite
//! the relationship-definitions region of the template, given the current
//! metrics and a sample of the wrong predictions. Rewrites land in the
//! named region; the fixed output contract around it never changes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, Message};
use crate::markets::truncate_chars;
use crate::template::{CandidateTemplate, RegionName};
use crate::tester::Prediction;

/// Rewrites shorter than this are treated as refusals or filler.
const MIN_RESPONSE_LEN: usize = 100;

/// At most this many wrong predictions go into the mutation context.
const MAX_FAILURE_EXAMPLES: usize = 5;

/// How much of the current candidate the rewriter sees.
const SKELETON_CONTEXT_CHARS: usize = 2000;

const QUESTION_CONTEXT_CHARS: usize = 100;

/// Result of a mutation attempt.
///
/// `applied` is true only when the region text actually changed; a
/// rewrite identical to the current text is a no-op.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub candidate: CandidateTemplate,
    pub applied: bool,
}

#[derive(Serialize)]
struct FailureContext<'a> {
    source: &'a str,
    related: &'a str,
    predicted: &'a str,
    source_outcome: &'a str,
    related_outcome: &'a str,
}

/// Asks a stronger model to rewrite a candidate's relationship definitions.
pub struct Mutator {
    gateway: Arc<dyn ChatGateway>,
    model: String,
    run_id: Option<Uuid>,
}

impl Mutator {
    pub fn new(gateway: Arc<dyn ChatGateway>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            run_id: None,
        }
    }

    /// Stamp every rewrite request with an optimization run id.
    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    fn attribution(&self) -> Attribution {
        let attribution = Attribution::new("mutator::rewrite");
        match self.run_id {
            Some(id) => attribution.with_run(id),
            None => attribution,
        }
    }

    /// Attempt one rewrite.
    ///
    /// Any failure mode (gateway error, short response, identical text)
    /// returns the candidate unchanged with `applied: false`; the
    /// optimization round proceeds with what it has.
    pub async fn mutate(
        &self,
        candidate: &CandidateTemplate,
        accuracy: f64,
        mean_score: f64,
        failures: &[Prediction],
    ) -> MutationOutcome {
        let unchanged = MutationOutcome {
            candidate: candidate.clone(),
            applied: false,
        };

        let failure_analysis: Vec<FailureContext> = failures
            .iter()
            .take(MAX_FAILURE_EXAMPLES)
            .map(|p| FailureContext {
                source: truncate_chars(&p.source.question, QUESTION_CONTEXT_CHARS),
                related: truncate_chars(&p.related.question, QUESTION_CONTEXT_CHARS),
                predicted: &p.relationship,
                source_outcome: p.source.outcome.as_str(),
                related_outcome: p.related.outcome.as_str(),
            })
            .collect();

        let failure_json = match serde_json::to_string_pretty(&failure_analysis) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize failure context");
                return unchanged;
            }
        };

        let skeleton = candidate.skeleton();
        let context = truncate_chars(&skeleton, SKELETON_CONTEXT_CHARS);

        let user_prompt = format!(
            "You are a prompt engineering expert. Analyze and SIGNIFICANTLY improve this prompt.\n\n\
             CURRENT PROMPT:\n{context}\n\n\
             CURRENT PERFORMANCE:\n\
             - Accuracy: {accuracy:.1}%\n\
             - Profit Score: {mean_score:.2}\n\n\
             FAILURE EXAMPLES (predictions that were WRONG):\n{failure_json}\n\n\
             TASK: Rewrite the relationship type definitions to be MORE PRECISE and ACTIONABLE.\n\n\
             Requirements:\n\
             1. Add specific criteria for WHEN to use each relationship type\n\
             2. Add explicit warnings for WHEN NOT to use each type\n\
             3. Include concrete examples or patterns\n\
             4. Make the definitions more rigorous to reduce false positives\n\
             5. Add a confidence threshold guideline\n\n\
             Return the improved \"Relationship Types:\" section with substantially enhanced definitions.\n\
             Be specific, add bullet points, and make it noticeably better than the original."
        );

        let req = ChatRequest::new(
            ChatModel::openai(&self.model),
            vec![
                Message::system(
                    "You are a prompt engineering expert. Output only the improved text, \
                     no explanations. Make substantial improvements.",
                ),
                Message::user(user_prompt),
            ],
            self.attribution(),
        )
        .temperature(0.8)
        .max_tokens(1500);

        let content = match self.gateway.chat(req).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(error = %e, code = e.code(), "mutation request failed");
                return unchanged;
            }
        };

        let rewritten = content.trim();
        if rewritten.len() <= MIN_RESPONSE_LEN {
            warn!(len = rewritten.len(), "mutation response too short, keeping candidate");
            return unchanged;
        }

        let previous = candidate
            .region(RegionName::RelationshipDefinitions)
            .unwrap_or_default()
            .to_string();

        if rewritten == previous {
            info!("mutation produced identical definitions, no change");
            return unchanged;
        }

        info!(len = rewritten.len(), "applied rewritten relationship definitions");
        MutationOutcome {
            candidate: candidate.with_region(RegionName::RelationshipDefinitions, rewritten),
            applied: true,
        }
    }
}
