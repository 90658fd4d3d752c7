//! Dialog agent: plain conversation without the code workflow.

use crate::memory::ChatTurn;

const SYSTEM_PROMPT: &str = "You are an experienced senior developer and programming assistant. \
Give clear, structured answers; show code examples when they help; ask for clarification when \
the question is ambiguous. If the user wants complete code with tests, suggest the code \
generation mode instead.";

/// Builds the chat prompt from the system preamble, prior turns, and the
/// new message.
pub fn prompt(message: &str, history: &[ChatTurn]) -> String {
    let mut parts = vec![SYSTEM_PROMPT.to_string(), String::new()];
    for turn in history {
        parts.push(format!("{}: {}", turn.role, turn.content));
    }
    parts.push(format!("user: {}", message));
    parts.push("assistant:".to_string());
    parts.join("\n")
}
