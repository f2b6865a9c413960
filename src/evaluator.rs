//! Relationship evaluation against resolved outcomes.
//!
//! Pure scoring logic: given the resolved outcomes of a source market and a
//! related market, did a claimed relationship hold, and what is it worth?
//! This table is the behavioral contract of the whole harness; everything
//! upstream exists to feed it and everything downstream aggregates it.

use serde::{Deserialize, Serialize};

/// Resolved outcome of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
    /// Market still open; never produced by the closed-only fetch path.
    Pending,
}

impl Outcome {
    pub fn is_yes(self) -> bool {
        matches!(self, Outcome::Yes)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
            Outcome::Pending => "PENDING",
        }
    }
}

/// The closed set of relationship categories the template may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    /// Related YES implies source YES.
    Implies,
    /// Source and related should resolve opposite.
    Contradicts,
    /// Related event directly causes/prevents the source outcome.
    Subevent,
    /// Source outcome is a prerequisite for the related market.
    ConditionedOn,
    /// Correlated indicator; outcomes should match.
    WeakSignal,
}

impl Relationship {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IMPLIES" => Some(Relationship::Implies),
            "CONTRADICTS" => Some(Relationship::Contradicts),
            "SUBEVENT" => Some(Relationship::Subevent),
            "CONDITIONED_ON" => Some(Relationship::ConditionedOn),
            "WEAK_SIGNAL" => Some(Relationship::WeakSignal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Relationship::Implies => "IMPLIES",
            Relationship::Contradicts => "CONTRADICTS",
            Relationship::Subevent => "SUBEVENT",
            Relationship::ConditionedOn => "CONDITIONED_ON",
            Relationship::WeakSignal => "WEAK_SIGNAL",
        }
    }
}

/// Correctness verdict plus scalar score for one claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub held: bool,
    pub score: f64,
}

/// Score an unrecognized relationship category. Conservative penalty,
/// never an error.
const UNKNOWN_CATEGORY_SCORE: f64 = -0.5;

/// Evaluate whether a claimed relationship held between two resolved
/// outcomes, and what the claim scores.
///
/// Policy, per category: `(held condition, score if held, score if not)`.
/// IMPLIES and CONDITIONED_ON are vacuously true when the source resolved
/// NO. SUBEVENT is causally unverifiable from outcomes alone and always
/// "holds" at low reward. Strong wrong claims (IMPLIES, CONTRADICTS) cost
/// more than weak ones.
pub fn evaluate(source: Outcome, related: Outcome, relationship: &str) -> Verdict {
    let source_yes = source.is_yes();
    let related_yes = related.is_yes();

    let Some(rel) = Relationship::parse(relationship) else {
        return Verdict {
            held: false,
            score: UNKNOWN_CATEGORY_SCORE,
        };
    };

    let (held, if_held, if_not) = match rel {
        // Related YES → source YES; vacuous when source is NO.
        Relationship::Implies => (!source_yes || related_yes, 0.6, -0.8),
        Relationship::Contradicts => (source_yes != related_yes, 0.7, -0.7),
        // Unverifiable causally; partial credit only.
        Relationship::Subevent => (true, 0.3, 0.0),
        // Source is prerequisite; same shape as IMPLIES.
        Relationship::ConditionedOn => (!source_yes || related_yes, 0.5, -0.6),
        Relationship::WeakSignal => (source_yes == related_yes, 0.2, -0.3),
    };

    Verdict {
        held,
        score: if held { if_held } else { if_not },
    }
}
