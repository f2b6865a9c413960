//! Exemplar distillation from scored predictions.
//!
//! After each test round the harness folds validated predictions back into
//! the next candidate: correct, profitable calls become few-shot examples
//! and incorrect calls become grouped warnings. Both sections are plain
//! text spliced into the candidate template.

use crate::evaluator::Outcome;
use crate::markets::truncate_chars;
use crate::tester::Prediction;

const QUESTION_PREVIEW_CHARS: usize = 80;
const WARNING_PREVIEW_CHARS: usize = 40;

fn outcome_label(outcome: Outcome) -> &'static str {
    outcome.as_str()
}

/// Render validated predictions as a few-shot section.
///
/// Takes predictions in encounter order and keeps the first `max_count`.
/// Returns an empty string when there is nothing to show, which the
/// template renders as an absent section.
pub fn build_positive_exemplars(good: &[Prediction], max_count: usize) -> String {
    if good.is_empty() || max_count == 0 {
        return String::new();
    }

    let mut lines = vec!["PROVEN EXAMPLES (validated against real outcomes):".to_string()];

    for (i, p) in good.iter().take(max_count).enumerate() {
        lines.push(format!(
            "\nExample {}:\nSource: \"{}\"\nRelated: \"{}\"\nRelationship: {}\nReasoning: {}\n✓ Source→{}, Related→{}",
            i + 1,
            truncate_chars(&p.source.question, QUESTION_PREVIEW_CHARS),
            truncate_chars(&p.related.question, QUESTION_PREVIEW_CHARS),
            p.relationship,
            p.reasoning,
            outcome_label(p.source.outcome),
            outcome_label(p.related.outcome),
        ));
    }

    lines.join("\n")
}

/// Render failed predictions as a warnings section, grouped by the
/// relationship category that was claimed.
///
/// Groups keep first-seen order and each shows its count plus one
/// representative failure. Empty input yields an empty section.
pub fn build_failure_warnings(bad: &[Prediction]) -> String {
    if bad.is_empty() {
        return String::new();
    }

    // Vec-of-pairs rather than a map to keep first-seen group order.
    let mut groups: Vec<(&str, Vec<&Prediction>)> = Vec::new();
    for p in bad {
        match groups.iter_mut().find(|(rel, _)| *rel == p.relationship) {
            Some((_, members)) => members.push(p),
            None => groups.push((&p.relationship, vec![p])),
        }
    }

    let mut lines = vec!["AVOID THESE MISTAKES:".to_string()];

    for (rel, members) in &groups {
        lines.push(format!("- {}: {} wrong predictions", rel, members.len()));
        let ex = members[0];
        lines.push(format!(
            "  Bad: \"{}\" → \"{}\"",
            truncate_chars(&ex.source.question, WARNING_PREVIEW_CHARS),
            truncate_chars(&ex.related.question, WARNING_PREVIEW_CHARS),
        ));
        lines.push(format!(
            "  Reality: Source={}, Related={}",
            outcome_label(ex.source.outcome),
            outcome_label(ex.related.outcome),
        ));
    }

    lines.join("\n")
}
