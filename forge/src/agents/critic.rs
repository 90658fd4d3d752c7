//! Critic agent: the final user-facing message over the produced artifacts.

pub fn prompt(task: &str, plan: &str, code: &str, validation_passed: bool, overall: f32) -> String {
    format!(
        "Compose the final answer for the user.\n\nTASK: {}\n\nPLAN:\n{}\n\nCODE:\n{}\n\n\
         Validation passed: {}. Overall quality score: {:.2}.\n\
         Summarize what was built, mention remaining caveats, and present the code.",
        task, plan, code, validation_passed, overall
    )
}

/// Fallback message assembled without an LLM, used when the critic call
/// fails but the run still has artifacts worth returning.
pub fn assemble_fallback(task: &str, code: &str, validation_passed: bool) -> String {
    let caveat = if validation_passed {
        "All validators passed."
    } else {
        "Some validators did not pass; review before use."
    };
    format!("Task: {}\n{}\n\n{}", task, caveat, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_carries_code_and_caveat() {
        let message = assemble_fallback("reverse a string", "fn rev() {}", false);
        assert!(message.contains("fn rev()"));
        assert!(message.contains("did not pass"));
    }
}
