//! Coding agent: the code artifact against plan, tests, and context.

/// Builds the generation prompt. With `fix_notes` present this is a repair
/// round: the previous artifact and the fix instructions are included.
pub fn prompt(
    task: &str,
    plan: &str,
    tests: &str,
    context: &str,
    previous_code: Option<&str>,
    fix_notes: Option<&str>,
) -> String {
    let mut parts = vec![format!("Implement the following task.\n\nTASK: {}", task)];
    if !plan.is_empty() {
        parts.push(format!("PLAN:\n{}", plan));
    }
    if !tests.is_empty() {
        parts.push(format!("The code must pass these tests:\n{}", tests));
    }
    if !context.is_empty() {
        parts.push(format!("Context:\n{}", context));
    }
    if let (Some(previous), Some(notes)) = (previous_code, fix_notes) {
        parts.push(format!(
            "The previous attempt failed validation.\nPrevious code:\n{}\n\nFix instructions:\n{}",
            previous, notes
        ));
    }
    parts.push("Return only the complete code, in one fenced block.".to_string());
    parts.join("\n\n")
}

/// Extracts the code from the answer: the first fenced block when present,
/// the raw text otherwise.
pub fn extract_code(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(open) = trimmed.find("```") {
        let after = &trimmed[open + 3..];
        // skip the info string on the opening fence
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(close) = body.find("```") {
            return body[..close].trim_end().to_string();
        }
        return body.trim_end().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_block_with_language_tag() {
        let text = "Here is the code:\n```python\ndef f():\n    return 1\n```\nEnjoy!";
        assert_eq!(extract_code(text), "def f():\n    return 1");
    }

    #[test]
    fn plain_answer_passes_through() {
        assert_eq!(extract_code("  fn main() {}  "), "fn main() {}");
    }

    #[test]
    fn unclosed_fence_takes_the_rest() {
        let text = "```\nlet x = 1;";
        assert_eq!(extract_code(text), "let x = 1;");
    }

    #[test]
    fn repair_prompt_carries_previous_code_and_notes() {
        let p = prompt(
            "task",
            "PLAN: x",
            "",
            "",
            Some("old code"),
            Some("off-by-one on the loop bound"),
        );
        assert!(p.contains("old code"));
        assert!(p.contains("off-by-one"));
    }
}
