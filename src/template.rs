//! Structured candidate template.
//!
//! A candidate is not a blob of text with magic markers: it is an ordered
//! list of fixed segments, named holes, and named replaceable regions.
//! Filling a hole or rewriting a region is a structural operation, so
//! generated content can never collide with placeholder syntax and the
//! mutator never has to find splice anchors by substring search.
//!
//! Candidates are immutable values; every transformation returns a new one.

use crate::markets::Market;

// =============================================================================
// Segment model
// =============================================================================

/// Named insertion points in a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hole {
    /// Filled per test case from the source market's question.
    SourceQuestion,
    /// Source YES price, percent.
    SourceYes,
    /// Source NO price, percent.
    SourceNo,
    /// Source market description.
    SourceDescription,
    /// Positive exemplar block, filled per iteration.
    FewShot,
    /// Failure warning block, filled per iteration.
    Warnings,
}

impl Hole {
    /// Marker name shown in the skeleton render for unfilled holes.
    fn name(self) -> &'static str {
        match self {
            Hole::SourceQuestion => "source_question",
            Hole::SourceYes => "source_yes",
            Hole::SourceNo => "source_no",
            Hole::SourceDescription => "source_description",
            Hole::FewShot => "few_shot_section",
            Hole::Warnings => "warnings_section",
        }
    }
}

/// Named regions the mutator may replace wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionName {
    /// The "Relationship Types:" definitions between the selection criteria
    /// and the output schema.
    RelationshipDefinitions,
}

#[derive(Debug, Clone)]
enum Segment {
    Fixed(&'static str),
    Hole(Hole),
    Filled { hole: Hole, text: String },
    Region { name: RegionName, text: String },
}

// =============================================================================
// Candidate
// =============================================================================

/// A versioned strategy template under optimization.
#[derive(Debug, Clone)]
pub struct CandidateTemplate {
    segments: Vec<Segment>,
}

impl CandidateTemplate {
    /// The fixed base template with all holes open and the stock
    /// relationship definitions in place.
    pub fn base() -> Self {
        let segments = vec![
            Segment::Fixed(HEAD),
            Segment::Hole(Hole::SourceQuestion),
            Segment::Fixed("\n- Current Odds: "),
            Segment::Hole(Hole::SourceYes),
            Segment::Fixed("% YES / "),
            Segment::Hole(Hole::SourceNo),
            Segment::Fixed("% NO\n- Description: "),
            Segment::Hole(Hole::SourceDescription),
            Segment::Fixed(CRITERIA),
            Segment::Region {
                name: RegionName::RelationshipDefinitions,
                text: RELATIONSHIP_DEFINITIONS.to_string(),
            },
            Segment::Fixed("\n\n"),
            Segment::Hole(Hole::FewShot),
            Segment::Fixed("\n\n"),
            Segment::Hole(Hole::Warnings),
            Segment::Fixed(OUTPUT_SCHEMA),
        ];
        Self { segments }
    }

    /// New candidate with the exemplar and warning holes filled.
    ///
    /// Typically called on a fresh copy of the base template each round;
    /// exemplars are not cumulative.
    pub fn with_exemplars(&self, few_shot: &str, warnings: &str) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|seg| match seg {
                Segment::Hole(Hole::FewShot) | Segment::Filled { hole: Hole::FewShot, .. } => {
                    Segment::Filled {
                        hole: Hole::FewShot,
                        text: few_shot.to_string(),
                    }
                }
                Segment::Hole(Hole::Warnings) | Segment::Filled { hole: Hole::Warnings, .. } => {
                    Segment::Filled {
                        hole: Hole::Warnings,
                        text: warnings.to_string(),
                    }
                }
                other => other.clone(),
            })
            .collect();
        Self { segments }
    }

    /// New candidate with the named region replaced.
    pub fn with_region(&self, name: RegionName, text: &str) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|seg| match seg {
                Segment::Region { name: n, .. } if *n == name => Segment::Region {
                    name,
                    text: text.to_string(),
                },
                other => other.clone(),
            })
            .collect();
        Self { segments }
    }

    /// Current text of the named region, if present.
    pub fn region(&self, name: RegionName) -> Option<&str> {
        self.segments.iter().find_map(|seg| match seg {
            Segment::Region { name: n, text } if *n == name => Some(text.as_str()),
            _ => None,
        })
    }

    /// Render the candidate as the system prompt for one source market.
    ///
    /// Source holes are filled from the market; exemplar holes left unfilled
    /// render empty (the baseline case).
    pub fn render(&self, source: &Market) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Fixed(text) => out.push_str(text),
                Segment::Region { text, .. } => out.push_str(text),
                Segment::Filled { text, .. } => out.push_str(text),
                Segment::Hole(hole) => match hole {
                    Hole::SourceQuestion => out.push_str(&source.question),
                    Hole::SourceYes => out.push_str(&source.yes_price.to_string()),
                    Hole::SourceNo => out.push_str(&source.no_price.to_string()),
                    Hole::SourceDescription => out.push_str(&source.description),
                    // Exemplar holes render empty when nothing was spliced in.
                    Hole::FewShot | Hole::Warnings => {}
                },
            }
        }
        out
    }

    /// Render the candidate with unfilled holes shown as `{name}` markers.
    ///
    /// This is the persisted/reported form of a candidate and the context
    /// sent to the mutation model.
    pub fn skeleton(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Fixed(text) => out.push_str(text),
                Segment::Region { text, .. } => out.push_str(text),
                Segment::Filled { text, .. } => out.push_str(text),
                Segment::Hole(hole) => {
                    out.push('{');
                    out.push_str(hole.name());
                    out.push('}');
                }
            }
        }
        out
    }

    /// Byte length of the skeleton render; recorded per iteration.
    pub fn len_bytes(&self) -> usize {
        self.skeleton().len()
    }
}

// =============================================================================
// Base template text
// =============================================================================

const HEAD: &str = "\
You are a strategic prediction market analyst finding ACTIONABLE related bets.

Source Market:
- Question: ";

const CRITERIA: &str = "

YOUR GOAL: Find markets where betting strategy changes based on beliefs about the source market.

GOOD Related Markets:
- Markets with hedging opportunities (opposite positions reduce risk)
- Markets with arbitrage potential (related but mispriced)
- Markets with causal relationships (one outcome affects another)
- Markets with competitive odds (10-90% range, not extreme long shots)
- Markets where information advantage transfers

BAD Related Markets:
- Extreme long shots (<5% or >95%) - no trading opportunity
- Same exact market in different words (redundant)
- Weak correlations without clear reasoning
- Markets from the same multi-outcome event (just partitions)

";

const RELATIONSHIP_DEFINITIONS: &str = "\
Relationship Types:
- IMPLIES: If this market YES -> source YES
- CONTRADICTS: If source YES -> this market NO more likely
- SUBEVENT: This event directly causes/prevents source outcome
- CONDITIONED_ON: Source outcome is prerequisite for this market
- WEAK_SIGNAL: Correlated indicator (only if odds are interesting)";

const OUTPUT_SCHEMA: &str = r#"

Return JSON:
{
  "related": [
    {
      "marketId": "id",
      "relationship": "IMPLIES|CONTRADICTS|SUBEVENT|CONDITIONED_ON|WEAK_SIGNAL",
      "reasoning": "Brief explanation"
    }
  ]
}

Return empty array if no good opportunities: {"related": []}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Outcome;

    fn market() -> Market {
        Market {
            id: "m1".into(),
            question: "Will the Fed cut rates in March?".into(),
            description: "Resolves YES if the FOMC announces a cut.".into(),
            yes_price: 72,
            no_price: 28,
            outcome: Outcome::Yes,
            volume: 10_000.0,
        }
    }

    #[test]
    fn render_fills_source_holes() {
        let rendered = CandidateTemplate::base().render(&market());
        assert!(rendered.contains("Will the Fed cut rates in March?"));
        assert!(rendered.contains("72% YES / 28% NO"));
        assert!(rendered.contains("Resolves YES if the FOMC announces a cut."));
        // Unfilled exemplar holes render empty, not as markers.
        assert!(!rendered.contains("few_shot_section"));
        assert!(!rendered.contains('{') || rendered.contains("\"related\""));
    }

    #[test]
    fn render_keeps_output_schema_braces_intact() {
        let rendered = CandidateTemplate::base().render(&market());
        assert!(rendered.contains(r#""related": ["#));
        assert!(rendered.contains(r#"{"related": []}"#));
    }

    #[test]
    fn skeleton_shows_unfilled_holes_as_markers() {
        let skeleton = CandidateTemplate::base().skeleton();
        assert!(skeleton.contains("{source_question}"));
        assert!(skeleton.contains("{few_shot_section}"));
        assert!(skeleton.contains("{warnings_section}"));
    }

    #[test]
    fn with_exemplars_produces_new_value_and_fills_holes() {
        let base = CandidateTemplate::base();
        let filled = base.with_exemplars("PROVEN EXAMPLES:\n...", "AVOID THESE MISTAKES:\n...");

        let skeleton = filled.skeleton();
        assert!(skeleton.contains("PROVEN EXAMPLES:"));
        assert!(skeleton.contains("AVOID THESE MISTAKES:"));
        assert!(!skeleton.contains("{few_shot_section}"));

        // The original is untouched.
        assert!(base.skeleton().contains("{few_shot_section}"));
    }

    #[test]
    fn region_replace_by_name() {
        let base = CandidateTemplate::base();
        let rewritten = base.with_region(
            RegionName::RelationshipDefinitions,
            "Relationship Types (v2):\n- IMPLIES: stricter criteria",
        );

        assert_eq!(
            rewritten.region(RegionName::RelationshipDefinitions),
            Some("Relationship Types (v2):\n- IMPLIES: stricter criteria")
        );
        assert!(!rewritten.skeleton().contains("WEAK_SIGNAL: Correlated indicator"));
        // Everything around the region survives.
        assert!(rewritten.skeleton().contains("YOUR GOAL"));
        assert!(rewritten.skeleton().contains("Return JSON"));
        // The original keeps the stock definitions.
        assert!(base
            .region(RegionName::RelationshipDefinitions)
            .unwrap()
            .contains("WEAK_SIGNAL"));
    }

    #[test]
    fn injected_text_containing_marker_syntax_is_inert() {
        // Generated content that happens to contain marker-looking text must
        // not be re-substituted anywhere.
        let filled = CandidateTemplate::base()
            .with_exemplars("beware {source_question} literal", "");
        let rendered = filled.render(&market());
        assert!(rendered.contains("beware {source_question} literal"));
    }

    #[test]
    fn len_bytes_tracks_changes() {
        let base = CandidateTemplate::base();
        let bigger = base.with_exemplars(&"x".repeat(500), "");
        assert!(bigger.len_bytes() > base.len_bytes());
    }
}
