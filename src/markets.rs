//! Market data: the labeled dataset the harness optimizes against.
//!
//! Items come from a Gamma-style paginated listing, filtered by topic
//! keyword and resolved to a binary outcome from their final prices. The
//! provider sits behind [`MarketProvider`] so tests feed fixed datasets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::evaluator::Outcome;

// =============================================================================
// Item model
// =============================================================================

/// One unit of labeled evaluation data. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub description: String,
    /// Final YES price as a rounded percentage.
    pub yes_price: u32,
    /// Final NO price as a rounded percentage.
    pub no_price: u32,
    pub outcome: Outcome,
    pub volume: f64,
}

/// A topic-keyed partition of the dataset. Groups keep their fetch order so
/// test iteration (and therefore exemplar encounter order) is reproducible.
#[derive(Debug, Clone)]
pub struct MarketGroup {
    pub topic: String,
    pub markets: Vec<Market>,
}

/// Topic groups below this size carry too little relational signal to keep.
const MIN_GROUP_SIZE: usize = 5;

/// Prices this close to certainty resolve the market.
const YES_THRESHOLD: f64 = 0.95;
const NO_THRESHOLD: f64 = 0.05;

// =============================================================================
// Provider seam
// =============================================================================

/// Errors from the market data provider. Provider failures are fatal to a
/// run; there is no degraded path through missing data.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Market listing provider.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Fetch markets matching a topic keyword.
    ///
    /// With `closed_only`, ambiguous outcomes (final price strictly between
    /// the thresholds) are dropped; otherwise items come back `Pending`.
    async fn fetch(
        &self,
        topic: &str,
        limit: usize,
        closed_only: bool,
    ) -> Result<Vec<Market>, MarketError>;
}

/// Fetch and group markets by topic, dropping topics with too few items.
///
/// Group order follows `topics` order; this ordering is load-bearing for the
/// deterministic "first encountered" exemplar tie-break downstream.
pub async fn fetch_topic_groups(
    provider: &dyn MarketProvider,
    topics: &[String],
    limit: usize,
) -> Result<Vec<MarketGroup>, MarketError> {
    let mut groups = Vec::new();

    for topic in topics {
        let markets = provider.fetch(topic, limit, true).await?;
        if markets.len() >= MIN_GROUP_SIZE {
            info!(topic = %topic, count = markets.len(), "topic group retained");
            groups.push(MarketGroup {
                topic: topic.clone(),
                markets,
            });
        } else {
            warn!(topic = %topic, count = markets.len(), "too few resolved markets, skipping topic");
        }
    }

    let total: usize = groups.iter().map(|g| g.markets.len()).sum();
    info!(markets = total, topics = groups.len(), "dataset loaded");
    Ok(groups)
}

// =============================================================================
// Gamma adapter
// =============================================================================

const DEFAULT_BASE_URL: &str = "https://gamma-api.polymarket.com";
const DESCRIPTION_MAX_CHARS: usize = 300;

/// Adapter for the Gamma markets listing API.
#[derive(Debug, Clone)]
pub struct GammaMarkets {
    client: reqwest::Client,
    base_url: String,
}

impl GammaMarkets {
    pub fn new() -> Result<Self, MarketError> {
        Self::with_config(DEFAULT_BASE_URL, Duration::from_secs(60))
    }

    pub fn with_config(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MarketError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| MarketError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

/// One entry of the Gamma `/markets` listing. Fields we don't read are
/// ignored by serde.
#[derive(Debug, Deserialize)]
struct GammaEntry {
    id: Option<String>,
    #[serde(rename = "conditionId")]
    condition_id: Option<String>,
    question: Option<String>,
    description: Option<String>,
    /// Either a JSON array or a JSON-encoded string of one.
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<serde_json::Value>,
    volume: Option<serde_json::Value>,
}

#[async_trait]
impl MarketProvider for GammaMarkets {
    async fn fetch(
        &self,
        topic: &str,
        limit: usize,
        closed_only: bool,
    ) -> Result<Vec<Market>, MarketError> {
        let mut params = vec![
            ("limit", limit.to_string()),
            ("order", "volume".to_string()),
            ("ascending", "false".to_string()),
        ];
        if closed_only {
            params.push(("closed", "true".to_string()));
        }

        let response = self
            .client
            .get(format!("{}/markets", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MarketError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let entries: Vec<GammaEntry> = response.json().await?;
        debug!(topic = %topic, listed = entries.len(), "listing fetched");

        let topic_lower = topic.to_lowercase();
        let mut markets = Vec::new();

        for entry in entries {
            if let Some(market) = entry_to_market(entry, &topic_lower, closed_only) {
                markets.push(market);
            }
        }

        Ok(markets)
    }
}

/// Convert one listing entry, applying the topic filter and outcome
/// resolution policy. `None` means the entry is filtered or unusable.
fn entry_to_market(entry: GammaEntry, topic_lower: &str, closed_only: bool) -> Option<Market> {
    let question = entry.question.unwrap_or_default();
    let description = entry.description.unwrap_or_default();

    if !question.to_lowercase().contains(topic_lower)
        && !description.to_lowercase().contains(topic_lower)
    {
        return None;
    }

    let price = match entry.outcome_prices {
        Some(value) => parse_first_price(&value)?,
        // Listings without prices are treated as even odds.
        None => 0.5,
    };

    let outcome = if closed_only {
        if price >= YES_THRESHOLD {
            Outcome::Yes
        } else if price <= NO_THRESHOLD {
            Outcome::No
        } else {
            // Ambiguous resolution; not usable as labeled data.
            return None;
        }
    } else {
        Outcome::Pending
    };

    let id = entry.id.or(entry.condition_id)?;

    Some(Market {
        id,
        question,
        description: truncate_chars(&description, DESCRIPTION_MAX_CHARS).to_string(),
        yes_price: (price * 100.0).round() as u32,
        no_price: ((1.0 - price) * 100.0).round() as u32,
        outcome,
        volume: entry.volume.as_ref().and_then(value_to_f64).unwrap_or(0.0),
    })
}

/// First element of the two-way price pair. The field arrives either as a
/// JSON array or as a string containing JSON; elements may be numbers or
/// numeric strings. An empty list is treated like a missing one: even odds.
fn parse_first_price(value: &serde_json::Value) -> Option<f64> {
    let array: Vec<serde_json::Value> = match value {
        serde_json::Value::String(s) => serde_json::from_str(s).ok()?,
        serde_json::Value::Array(a) => a.clone(),
        _ => return None,
    };
    match array.first() {
        Some(first) => value_to_f64(first),
        None => Some(0.5),
    }
}

fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(question: &str, prices: serde_json::Value) -> GammaEntry {
        GammaEntry {
            id: Some("m1".into()),
            condition_id: None,
            question: Some(question.into()),
            description: Some(String::new()),
            outcome_prices: Some(prices),
            volume: Some(json!("1234.5")),
        }
    }

    #[test]
    fn resolves_yes_at_threshold() {
        let m = entry_to_market(entry("Bitcoin above 100k?", json!(["0.95", "0.05"])), "bitcoin", true)
            .unwrap();
        assert_eq!(m.outcome, Outcome::Yes);
        assert_eq!(m.yes_price, 95);
        assert_eq!(m.no_price, 5);
        assert!((m.volume - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn resolves_no_at_threshold() {
        let m = entry_to_market(entry("Bitcoin crash?", json!([0.05, 0.95])), "bitcoin", true)
            .unwrap();
        assert_eq!(m.outcome, Outcome::No);
    }

    #[test]
    fn ambiguous_outcome_dropped_when_closed_only() {
        assert!(entry_to_market(entry("Bitcoin up?", json!(["0.60", "0.40"])), "bitcoin", true)
            .is_none());
    }

    #[test]
    fn open_markets_stay_pending() {
        let m = entry_to_market(entry("Bitcoin up?", json!(["0.60", "0.40"])), "bitcoin", false)
            .unwrap();
        assert_eq!(m.outcome, Outcome::Pending);
        assert_eq!(m.yes_price, 60);
    }

    #[test]
    fn topic_filter_matches_question_or_description() {
        assert!(entry_to_market(entry("Rates in March?", json!(["0.99"])), "bitcoin", true)
            .is_none());

        let mut e = entry("Rates in March?", json!(["0.99"]));
        e.description = Some("Depends on Bitcoin ETF flows".into());
        assert!(entry_to_market(e, "bitcoin", true).is_some());
    }

    #[test]
    fn prices_as_json_encoded_string() {
        let m = entry_to_market(
            entry("Bitcoin above 100k?", json!("[\"0.99\", \"0.01\"]")),
            "bitcoin",
            true,
        )
        .unwrap();
        assert_eq!(m.outcome, Outcome::Yes);
        assert_eq!(m.yes_price, 99);
    }

    #[test]
    fn empty_price_list_defaults_to_even_odds() {
        let m = entry_to_market(entry("Bitcoin up?", json!([])), "bitcoin", false).unwrap();
        assert_eq!(m.outcome, Outcome::Pending);
        assert_eq!(m.yes_price, 50);
        assert_eq!(m.no_price, 50);

        let m = entry_to_market(entry("Bitcoin up?", json!("[]")), "bitcoin", false).unwrap();
        assert_eq!(m.yes_price, 50);

        // Even odds are ambiguous under outcome resolution, so the closed
        // path still drops the entry.
        assert!(entry_to_market(entry("Bitcoin up?", json!([])), "bitcoin", true).is_none());
    }

    #[test]
    fn malformed_prices_skip_entry() {
        assert!(entry_to_market(entry("Bitcoin?", json!("not json")), "bitcoin", true).is_none());
        assert!(entry_to_market(entry("Bitcoin?", json!(42)), "bitcoin", true).is_none());
    }

    #[test]
    fn missing_id_falls_back_to_condition_id_then_drops() {
        let mut e = entry("Bitcoin above 100k?", json!(["0.99"]));
        e.id = None;
        e.condition_id = Some("cond-7".into());
        assert_eq!(entry_to_market(e, "bitcoin", true).unwrap().id, "cond-7");

        let mut e = entry("Bitcoin above 100k?", json!(["0.99"]));
        e.id = None;
        assert!(entry_to_market(e, "bitcoin", true).is_none());
    }

    #[test]
    fn description_truncated_to_300_chars() {
        let mut e = entry("Bitcoin above 100k?", json!(["0.99"]));
        e.description = Some(format!("bitcoin {}", "x".repeat(500)));
        let m = entry_to_market(e, "bitcoin", true).unwrap();
        assert_eq!(m.description.chars().count(), 300);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "аббревиатура"; // multibyte chars
        assert_eq!(truncate_chars(s, 4), "аббр");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    struct FixedProvider {
        per_topic: usize,
    }

    #[async_trait]
    impl MarketProvider for FixedProvider {
        async fn fetch(
            &self,
            topic: &str,
            _limit: usize,
            _closed_only: bool,
        ) -> Result<Vec<Market>, MarketError> {
            Ok((0..self.per_topic)
                .map(|i| Market {
                    id: format!("{topic}-{i}"),
                    question: format!("{topic} question {i}"),
                    description: String::new(),
                    yes_price: 99,
                    no_price: 1,
                    outcome: Outcome::Yes,
                    volume: 0.0,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn small_topic_groups_are_dropped() {
        let provider = FixedProvider { per_topic: 4 };
        let topics = vec!["a".to_string(), "b".to_string()];
        let groups = fetch_topic_groups(&provider, &topics, 100).await.unwrap();
        assert!(groups.is_empty());

        let provider = FixedProvider { per_topic: 5 };
        let groups = fetch_topic_groups(&provider, &topics, 100).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].topic, "a");
        assert_eq!(groups[1].topic, "b");
    }
}
