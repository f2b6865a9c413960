//! Candidate testing against resolved market groups.
//!
//! A candidate template is exercised by asking the model, for each source
//! market, which other markets in the same topic group relate to it and
//! how. Claimed relationships are then checked against the known outcomes
//! and scored. Failures on individual test cases degrade to empty
//! prediction sets; the run keeps going.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::OptimizerConfig;
use crate::evaluator::evaluate;
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, Message};
use crate::markets::{Market, MarketGroup};
use crate::template::CandidateTemplate;

/// A group must have a source plus at least two candidates to test.
const MIN_TESTABLE_GROUP: usize = 3;

/// Minimum score for a correct prediction to qualify as an exemplar.
const GOOD_SCORE_FLOOR: f64 = 0.2;

// =============================================================================
// RESULTS
// =============================================================================

/// A single relationship claim, checked against real outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub source: Market,
    pub related: Market,
    pub relationship: String,
    pub reasoning: String,
    /// Whether the claimed relationship held given the resolved outcomes.
    pub held: bool,
    /// Signed score from the policy table.
    pub score: f64,
}

/// All predictions produced for one source market.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseResult {
    pub source: Market,
    pub predictions: Vec<Prediction>,
}

impl TestCaseResult {
    pub fn correct(&self) -> usize {
        self.predictions.iter().filter(|p| p.held).count()
    }
}

/// Aggregated results of one candidate test round.
#[derive(Debug, Clone, Default)]
pub struct TestRun {
    pub cases: Vec<TestCaseResult>,
    /// Correct predictions profitable enough to reuse as exemplars.
    pub good: Vec<Prediction>,
    /// Incorrect predictions, fed back as warnings and mutation context.
    pub bad: Vec<Prediction>,
}

impl TestRun {
    /// Total and correct prediction counts across all cases.
    pub fn totals(&self) -> (usize, usize) {
        let total = self.cases.iter().map(|c| c.predictions.len()).sum();
        let correct = self.cases.iter().map(|c| c.correct()).sum();
        (total, correct)
    }

    /// Accuracy as a percentage. Zero predictions score zero, not NaN.
    pub fn accuracy(&self) -> f64 {
        let (total, correct) = self.totals();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64 * 100.0
        }
    }

    /// Mean signed score over all predictions, zero when there are none.
    pub fn mean_score(&self) -> f64 {
        let (total, _) = self.totals();
        if total == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .cases
            .iter()
            .flat_map(|c| &c.predictions)
            .map(|p| p.score)
            .sum();
        sum / total as f64
    }
}

// =============================================================================
// MODEL RESPONSE SHAPE
// =============================================================================

#[derive(Debug, Deserialize)]
struct RelatedJson {
    #[serde(default)]
    related: Vec<RelatedEntry>,
}

#[derive(Debug, Deserialize)]
struct RelatedEntry {
    #[serde(rename = "marketId")]
    market_id: Option<String>,
    relationship: Option<String>,
    reasoning: Option<String>,
}

/// Slice out the first balanced JSON object from a model response.
/// Tolerates prose or code fences around the payload. Braces inside JSON
/// string literals do not count toward the balance.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        let mut depth = 0;
        let mut in_string = false;
        let mut escaped = false;
        for (i, c) in remainder.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return &remainder[..=i];
                    }
                }
                _ => {}
            }
        }
    }

    trimmed
}

// =============================================================================
// TESTER
// =============================================================================

/// Runs one candidate against the market groups and scores the claims.
pub struct CandidateTester {
    gateway: Arc<dyn ChatGateway>,
    model: String,
    tests_per_topic: usize,
    candidates_per_test: usize,
    run_id: Option<Uuid>,
}

impl CandidateTester {
    pub fn new(gateway: Arc<dyn ChatGateway>, config: &OptimizerConfig) -> Self {
        Self {
            gateway,
            model: config.model.clone(),
            tests_per_topic: config.tests_per_topic,
            candidates_per_test: config.candidates_per_test,
            run_id: None,
        }
    }

    /// Stamp every request this tester makes with an optimization run id.
    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    fn attribution(&self) -> Attribution {
        let attribution = Attribution::new("tester::related");
        match self.run_id {
            Some(id) => attribution.with_run(id),
            None => attribution,
        }
    }

    /// Test a candidate across all usable groups.
    ///
    /// Calls run sequentially so exemplar encounter order is stable.
    /// Gateway or parse failures on one case log a warning and leave that
    /// case empty.
    pub async fn test(&self, candidate: &CandidateTemplate, groups: &[MarketGroup]) -> TestRun {
        let mut run = TestRun::default();

        for group in groups {
            if group.markets.len() < MIN_TESTABLE_GROUP {
                debug!(
                    topic = %group.topic,
                    markets = group.markets.len(),
                    "skipping group, too few markets to test"
                );
                continue;
            }

            let sources = self.tests_per_topic.min(group.markets.len());

            for source in &group.markets[..sources] {
                // Other markets from the same topic are the candidate pool;
                // same-topic markets are far more likely to be related.
                let pool: Vec<&Market> = group
                    .markets
                    .iter()
                    .filter(|m| m.id != source.id)
                    .take(self.candidates_per_test)
                    .collect();

                let predictions = self.run_case(candidate, source, &pool).await;
                let correct = predictions.iter().filter(|p| p.held).count();
                debug!(
                    topic = %group.topic,
                    source = %source.id,
                    predictions = predictions.len(),
                    correct,
                    "test case complete"
                );

                for p in &predictions {
                    if p.held && p.score > GOOD_SCORE_FLOOR {
                        run.good.push(p.clone());
                    } else if !p.held {
                        run.bad.push(p.clone());
                    }
                }

                run.cases.push(TestCaseResult {
                    source: source.clone(),
                    predictions,
                });
            }
        }

        run
    }

    async fn run_case(
        &self,
        candidate: &CandidateTemplate,
        source: &Market,
        pool: &[&Market],
    ) -> Vec<Prediction> {
        let candidates_text = pool
            .iter()
            .map(|c| {
                format!(
                    "ID: {}\nQuestion: {}\nOdds: {}% YES / {}% NO",
                    c.id, c.question, c.yes_price, c.no_price
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let req = ChatRequest::new(
            ChatModel::openai(&self.model),
            vec![
                Message::system(candidate.render(source)),
                Message::user(format!("Analyze:\n\n{candidates_text}")),
            ],
            self.attribution(),
        )
        .temperature(0.3)
        .json();

        let content = match self.gateway.chat(req).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(source = %source.id, error = %e, code = e.code(), "test case request failed");
                return Vec::new();
            }
        };

        // The whole response is usually the JSON object (json_mode is on);
        // extraction is the fallback for prose- or fence-wrapped payloads.
        let parsed: RelatedJson = match serde_json::from_str(content.trim())
            .or_else(|_| serde_json::from_str(extract_json(&content)))
        {
            Ok(p) => p,
            Err(e) => {
                warn!(source = %source.id, error = %e, "unparseable test case response");
                return Vec::new();
            }
        };

        let mut predictions = Vec::new();

        for entry in parsed.related {
            let Some(market_id) = entry.market_id else {
                continue;
            };
            let Some(related) = pool.iter().find(|c| c.id == market_id) else {
                // Hallucinated or mangled ID; drop the claim.
                debug!(source = %source.id, market_id = %market_id, "claimed ID not in candidate pool");
                continue;
            };

            let relationship = entry
                .relationship
                .unwrap_or_else(|| "WEAK_SIGNAL".to_string());
            let verdict = evaluate(source.outcome, related.outcome, &relationship);

            predictions.push(Prediction {
                source: source.clone(),
                related: (*related).clone(),
                relationship,
                reasoning: entry.reasoning.unwrap_or_default(),
                held: verdict.held,
                score: verdict.score,
            });
        }

        predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Outcome;
    use crate::gateway::{ChatResponse, ProviderError};
    use std::sync::Mutex;

    struct ScriptedGateway {
        responses: Mutex<Vec<Result<String, ProviderError>>>,
    }

    impl ScriptedGateway {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatGateway for ScriptedGateway {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(ChatResponse::from_content(r#"{"related": []}"#));
            }
            responses.remove(0).map(ChatResponse::from_content)
        }
    }

    fn market(id: &str, question: &str, outcome: Outcome) -> Market {
        Market {
            id: id.to_string(),
            question: question.to_string(),
            description: String::new(),
            yes_price: 60,
            no_price: 40,
            outcome,
            volume: 5000.0,
        }
    }

    fn group(topic: &str, markets: Vec<Market>) -> MarketGroup {
        MarketGroup {
            topic: topic.to_string(),
            markets,
        }
    }

    fn config(tests_per_topic: usize) -> OptimizerConfig {
        OptimizerConfig {
            tests_per_topic,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn extract_json_handles_fenced_payloads() {
        let raw = "Here you go:\n```json\n{\"related\": []}\n```";
        assert_eq!(extract_json(raw), "{\"related\": []}");

        let nested = r#"{"a": {"b": 1}} trailing"#;
        assert_eq!(extract_json(nested), r#"{"a": {"b": 1}}"#);
    }

    #[test]
    fn extract_json_ignores_braces_inside_strings() {
        let stray_close = r#"prose {"reasoning": "hedge :} here"} more prose"#;
        assert_eq!(extract_json(stray_close), r#"{"reasoning": "hedge :} here"}"#);

        let quoted_object = r#"note: {"reasoning": "returns {\"related\": []} when empty"}"#;
        assert_eq!(
            extract_json(quoted_object),
            r#"{"reasoning": "returns {\"related\": []} when empty"}"#
        );
    }

    #[tokio::test]
    async fn reasoning_with_stray_brace_still_parses() {
        let markets = vec![
            market("m1", "Source", Outcome::Yes),
            market("m2", "Candidate", Outcome::No),
            market("m3", "Candidate", Outcome::Yes),
        ];
        let groups = vec![group("topic", markets)];

        // Valid JSON whose string content is brace-unbalanced.
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(r#"{
            "related": [
                {"marketId": "m2", "relationship": "CONTRADICTS", "reasoning": "opposite outcome :} so hedge"}
            ]
        }"#
        .to_string())]));

        let tester = CandidateTester::new(gateway, &config(1));
        let run = tester.test(&CandidateTemplate::base(), &groups).await;

        let (total, correct) = run.totals();
        assert_eq!(total, 1);
        assert_eq!(correct, 1);
        assert_eq!(run.cases[0].predictions[0].related.id, "m2");
    }

    #[tokio::test]
    async fn scores_claims_against_outcomes() {
        // Source resolved YES; m2 resolved NO so CONTRADICTS holds (+0.7),
        // m3 resolved YES so WEAK_SIGNAL holds (+0.2).
        let markets = vec![
            market("m1", "Will X happen?", Outcome::Yes),
            market("m2", "Will anti-X happen?", Outcome::No),
            market("m3", "Will X-adjacent happen?", Outcome::Yes),
            market("m4", "Filler A", Outcome::No),
            market("m5", "Filler B", Outcome::No),
        ];
        let groups = vec![group("topic", markets)];

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(r#"{
            "related": [
                {"marketId": "m2", "relationship": "CONTRADICTS", "reasoning": "opposite"},
                {"marketId": "m3", "relationship": "WEAK_SIGNAL", "reasoning": "correlated"}
            ]
        }"#
        .to_string())]));

        let tester = CandidateTester::new(gateway, &config(1));
        let run = tester.test(&CandidateTemplate::base(), &groups).await;

        let (total, correct) = run.totals();
        assert_eq!(total, 2);
        assert_eq!(correct, 2);
        assert!((run.accuracy() - 100.0).abs() < 1e-9);
        assert!((run.mean_score() - 0.45).abs() < 1e-9);
        // CONTRADICTS at +0.7 clears the exemplar floor; WEAK_SIGNAL at +0.2 does not.
        assert_eq!(run.good.len(), 1);
        assert_eq!(run.good[0].related.id, "m2");
        assert!(run.bad.is_empty());
    }

    #[tokio::test]
    async fn drops_hallucinated_market_ids() {
        let markets = vec![
            market("m1", "Source", Outcome::Yes),
            market("m2", "Candidate", Outcome::Yes),
            market("m3", "Candidate", Outcome::No),
        ];
        let groups = vec![group("topic", markets)];

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(r#"{
            "related": [
                {"marketId": "nonexistent", "relationship": "IMPLIES", "reasoning": "made up"},
                {"marketId": "m2", "relationship": "IMPLIES", "reasoning": "real"}
            ]
        }"#
        .to_string())]));

        let tester = CandidateTester::new(gateway, &config(1));
        let run = tester.test(&CandidateTemplate::base(), &groups).await;

        let (total, _) = run.totals();
        assert_eq!(total, 1);
        assert_eq!(run.cases[0].predictions[0].related.id, "m2");
    }

    #[tokio::test]
    async fn missing_relationship_defaults_to_weak_signal() {
        let markets = vec![
            market("m1", "Source", Outcome::Yes),
            market("m2", "Candidate", Outcome::Yes),
            market("m3", "Candidate", Outcome::No),
        ];
        let groups = vec![group("topic", markets)];

        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(
            r#"{"related": [{"marketId": "m2", "reasoning": "no type given"}]}"#.to_string(),
        )]));

        let tester = CandidateTester::new(gateway, &config(1));
        let run = tester.test(&CandidateTemplate::base(), &groups).await;

        assert_eq!(run.cases[0].predictions[0].relationship, "WEAK_SIGNAL");
        // YES/YES under WEAK_SIGNAL holds.
        assert!(run.cases[0].predictions[0].held);
    }

    #[tokio::test]
    async fn gateway_failure_degrades_to_empty_case() {
        let markets = vec![
            market("m1", "Source", Outcome::Yes),
            market("m2", "Candidate", Outcome::Yes),
            market("m3", "Candidate", Outcome::No),
        ];
        let groups = vec![group("topic", markets)];

        let gateway = Arc::new(ScriptedGateway::new(vec![Err(ProviderError::provider(
            "openai",
            "boom",
        ))]));

        let tester = CandidateTester::new(gateway, &config(1));
        let run = tester.test(&CandidateTemplate::base(), &groups).await;

        assert_eq!(run.cases.len(), 1);
        assert!(run.cases[0].predictions.is_empty());
        assert_eq!(run.accuracy(), 0.0);
        assert_eq!(run.mean_score(), 0.0);
    }

    #[tokio::test]
    async fn skips_groups_below_minimum_size() {
        let groups = vec![group(
            "tiny",
            vec![
                market("m1", "Source", Outcome::Yes),
                market("m2", "Only candidate", Outcome::No),
            ],
        )];

        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let tester = CandidateTester::new(gateway, &config(1));
        let run = tester.test(&CandidateTemplate::base(), &groups).await;

        assert!(run.cases.is_empty());
    }
}
