//! Planning agent: a primary path plus alternatives.

/// Parsed plan: the main path and the alternative approaches.
#[derive(Clone, Debug)]
pub struct PlanOutcome {
    pub plan: String,
    pub alternatives: Vec<String>,
}

/// Markers a well-formed plan carries at least one of.
pub const PLAN_MARKERS: [&str; 4] = ["PLAN", "MAIN", "STEP", "APPROACH"];

pub fn prompt(task: &str, recommendations: &str, context: &str) -> String {
    let mut parts = vec![format!(
        "Draft an implementation plan for this task.\n\nTASK: {}\n\n\
         Write the main path under a line starting with \"PLAN:\" as numbered steps, \
         then 2-3 fallback approaches, each on a line starting with \"ALTERNATIVE:\".",
        task
    )];
    if !recommendations.is_empty() {
        parts.push(format!("\n{}", recommendations));
    }
    if !context.is_empty() {
        parts.push(format!("\nRelevant context:\n{}", context));
    }
    parts.join("\n")
}

/// Splits the answer into plan and alternatives. The plan always carries a
/// marker: answers without one get a `PLAN:` heading prepended.
pub fn parse(text: &str) -> PlanOutcome {
    let mut plan_lines = Vec::new();
    let mut alternatives = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed
            .strip_prefix("ALTERNATIVE:")
            .or_else(|| trimmed.strip_prefix("alternative:"))
        {
            let alternative = rest.trim();
            if !alternative.is_empty() {
                alternatives.push(alternative.to_string());
            }
        } else {
            plan_lines.push(line);
        }
    }
    let mut plan = plan_lines.join("\n").trim().to_string();
    let upper = plan.to_uppercase();
    if !plan.is_empty() && !PLAN_MARKERS.iter().any(|m| upper.contains(m)) {
        plan = format!("PLAN:\n{}", plan);
    }
    PlanOutcome {
        plan,
        alternatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_plan_and_alternatives() {
        let outcome = parse(
            "PLAN:\n1. read input\n2. transform\nALTERNATIVE: stream instead of batch\nALTERNATIVE: use a library",
        );
        assert!(outcome.plan.contains("1. read input"));
        assert_eq!(outcome.alternatives.len(), 2);
        assert_eq!(outcome.alternatives[0], "stream instead of batch");
    }

    #[test]
    fn parse_guarantees_a_marker() {
        let outcome = parse("1. just do it\n2. done");
        assert!(outcome.plan.starts_with("PLAN:"));
    }

    #[test]
    fn parse_keeps_existing_markers() {
        let outcome = parse("APPROACH: incremental\n1. step");
        assert!(!outcome.plan.starts_with("PLAN:"));
        assert!(outcome.plan.contains("APPROACH"));
    }

    #[test]
    fn prompt_carries_recommendations_and_context() {
        let p = prompt("task", "[Recommendations from memory]\nuse X", "fn ctx() {}");
        assert!(p.contains("Recommendations from memory"));
        assert!(p.contains("fn ctx()"));
    }
}
