//! Reflection agent: score each stage of the run and decide on a retry.

use serde::Deserialize;

use crate::llm::Schema;
use crate::memory::StageScores;

/// Reflection over one run: per-stage scores in [0, 1], a retry signal, and
/// a short analysis.
#[derive(Clone, Debug, Deserialize)]
pub struct ReflectionOutcome {
    pub planning: f32,
    pub research: f32,
    pub testing: f32,
    pub coding: f32,
    pub overall: f32,
    #[serde(default)]
    pub should_retry: bool,
    #[serde(default)]
    pub analysis: String,
}

impl ReflectionOutcome {
    pub fn scores(&self) -> StageScores {
        StageScores {
            planning: self.planning.clamp(0.0, 1.0),
            research: self.research.clamp(0.0, 1.0),
            testing: self.testing.clamp(0.0, 1.0),
            coding: self.coding.clamp(0.0, 1.0),
            overall: self.overall.clamp(0.0, 1.0),
        }
    }
}

pub fn schema() -> Schema {
    Schema::new("reflection")
        .number("planning", 0.0, 1.0)
        .number("research", 0.0, 1.0)
        .number("testing", 0.0, 1.0)
        .number("coding", 0.0, 1.0)
        .number("overall", 0.0, 1.0)
        .boolean("should_retry")
        .optional_string("analysis")
}

pub fn prompt(task: &str, plan: &str, code: &str, validation_passed: bool) -> String {
    format!(
        "Assess this completed run.\n\nTASK: {}\n\nPLAN:\n{}\n\nCODE:\n{}\n\n\
         Validation passed: {}.\n\
         Score planning, research, testing, coding, and overall between 0 and 1, \
         and say whether the run should be retried from planning.",
        task, plan, code, validation_passed
    )
}

/// Manual fallback when structured output is off or failed: neutral scores,
/// no retry, with validation success nudging the overall score.
pub fn parse_fallback(text: &str, validation_passed: bool) -> ReflectionOutcome {
    let base = if validation_passed { 0.8 } else { 0.5 };
    ReflectionOutcome {
        planning: base,
        research: base,
        testing: base,
        coding: base,
        overall: base,
        should_retry: false,
        analysis: text.trim().chars().take(500).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_enforces_score_ranges() {
        let good = json!({
            "planning": 0.8, "research": 0.7, "testing": 0.9,
            "coding": 0.85, "overall": 0.8, "should_retry": false
        });
        assert!(schema().validate(&good).is_ok());
        let bad = json!({
            "planning": 1.5, "research": 0.7, "testing": 0.9,
            "coding": 0.85, "overall": 0.8, "should_retry": false
        });
        assert!(schema().validate(&bad).is_err());
    }

    #[test]
    fn scores_are_clamped() {
        let outcome = ReflectionOutcome {
            planning: 2.0,
            research: -1.0,
            testing: 0.5,
            coding: 0.5,
            overall: 0.5,
            should_retry: false,
            analysis: String::new(),
        };
        let scores = outcome.scores();
        assert_eq!(scores.planning, 1.0);
        assert_eq!(scores.research, 0.0);
    }

    #[test]
    fn fallback_reflects_validation_outcome() {
        assert!(parse_fallback("looks fine", true).overall > parse_fallback("meh", false).overall);
    }
}
