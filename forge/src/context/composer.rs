//! Greedy token-budgeted context composition.
//!
//! Walks scored chunks in order, accumulating full chunks while they fit.
//! When a chunk would overflow: below 70% of the budget, a partial slice of
//! at least 150 tokens is kept (60% head + 40% tail, the tail preferring
//! control-flow exit lines); at or past 70%, composition stops.

use crate::context::chunker::{CodeChunk, CHARS_PER_TOKEN};
use crate::context::scorer::ScoredChunk;

const PARTIAL_MIN_TOKENS: usize = 150;
const STOP_FRACTION: f64 = 0.7;
const HEAD_FRACTION: f64 = 0.6;
const EXIT_KEYWORDS: [&str; 6] = ["return", "yield", "raise", "pass", "break", "continue"];

pub struct ContextComposer {
    max_tokens: usize,
}

impl ContextComposer {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    /// Composes the final context string from already-sorted scored chunks.
    pub fn compose(&self, scored_chunks: &[ScoredChunk]) -> String {
        if scored_chunks.is_empty() {
            return String::new();
        }

        let mut sections = Vec::new();
        let mut total_tokens = 0usize;

        for scored in scored_chunks {
            let chunk = &scored.chunk;
            let chunk_tokens = chunk.estimated_tokens();

            if total_tokens + chunk_tokens > self.max_tokens {
                if (total_tokens as f64) < self.max_tokens as f64 * STOP_FRACTION {
                    let remaining = self.max_tokens - total_tokens;
                    if remaining > PARTIAL_MIN_TOKENS {
                        let partial = Self::truncate_chunk(chunk, remaining);
                        sections.push(Self::format_chunk(chunk, &partial, &scored.matched_terms));
                        total_tokens += remaining;
                    }
                }
                break;
            }

            sections.push(Self::format_chunk(chunk, &chunk.content, &scored.matched_terms));
            total_tokens += chunk_tokens;
        }

        sections.join("\n\n")
    }

    fn format_chunk(chunk: &CodeChunk, content: &str, matched: &[String]) -> String {
        let mut parts = vec![format!(
            "# {}:{} ({})",
            chunk.file_path,
            chunk.name,
            chunk.kind.as_str()
        )];
        if !chunk.signature.is_empty() {
            parts.push(format!("```\n{}\n```", chunk.signature));
        }
        if !chunk.docstring.is_empty() {
            parts.push(format!("Doc: {}", chunk.docstring));
        }
        if !matched.is_empty() {
            let top: Vec<&str> = matched.iter().take(5).map(String::as_str).collect();
            parts.push(format!("Relevant terms: {}", top.join(", ")));
        }
        parts.push(format!("```\n{}\n```", content));
        parts.join("\n")
    }

    /// Keeps a head + tail slice of an oversized chunk. For short chunks a
    /// plain prefix is enough; larger ones keep 60% head and fill the tail
    /// backwards, always taking control-flow exit lines.
    fn truncate_chunk(chunk: &CodeChunk, max_tokens: usize) -> String {
        let max_chars = max_tokens * CHARS_PER_TOKEN;
        if chunk.content.len() <= max_chars {
            return chunk.content.clone();
        }

        let lines: Vec<&str> = chunk.content.lines().collect();
        if lines.len() <= 50 {
            return Self::cut_at_line_boundary(&chunk.content, max_chars);
        }

        let head_chars = (max_chars as f64 * HEAD_FRACTION) as usize;
        let tail_chars = max_chars - head_chars;

        let mut head = Vec::new();
        let mut head_len = 0usize;
        for line in &lines {
            if head_len + line.len() + 1 > head_chars {
                break;
            }
            head.push(*line);
            head_len += line.len() + 1;
        }

        let mut tail: Vec<&str> = Vec::new();
        let mut tail_len = 0usize;
        for line in lines.iter().skip(head.len()).rev() {
            let line_len = line.len() + 1;
            if tail_len + line_len > tail_chars {
                break;
            }
            let is_exit = EXIT_KEYWORDS.iter().any(|kw| line.contains(kw));
            if is_exit || tail.is_empty() || tail_len + line_len <= (tail_chars * 9) / 10 {
                tail.insert(0, *line);
                tail_len += line_len;
            }
        }

        let mut result = if tail.is_empty() {
            format!("{}\n# ... (truncated)", head.join("\n"))
        } else {
            format!(
                "{}\n# ... (middle truncated) ...\n{}",
                head.join("\n"),
                tail.join("\n")
            )
        };
        if result.len() > max_chars {
            result = Self::cut_at_line_boundary(&result, max_chars);
        }
        result
    }

    fn cut_at_line_boundary(text: &str, max_chars: usize) -> String {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < max_chars)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let mut truncated = text[..cut].to_string();
        if let Some(newline) = truncated.rfind('\n') {
            if newline > (max_chars * 4) / 5 {
                truncated.truncate(newline);
            }
        }
        truncated.push_str("\n# ... (truncated)");
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::chunker::{ChunkKind, CodeChunk};
    use crate::context::scorer::ScoredChunk;

    fn scored(name: &str, tokens: usize, score: f64) -> ScoredChunk {
        let content = "x".repeat(tokens * CHARS_PER_TOKEN);
        ScoredChunk {
            chunk: CodeChunk {
                id: format!("f.py:1-10:{}", name),
                file_path: "f.py".to_string(),
                start_line: 1,
                end_line: 10,
                content,
                kind: ChunkKind::Function,
                name: name.to_string(),
                signature: String::new(),
                docstring: String::new(),
            },
            score,
            matched_terms: vec!["term".to_string()],
        }
    }

    #[test]
    fn empty_input_composes_empty() {
        assert_eq!(ContextComposer::new(1000).compose(&[]), "");
    }

    #[test]
    fn accumulates_full_chunks_within_budget() {
        let composer = ContextComposer::new(1000);
        let chunks = vec![scored("a", 300, 1.0), scored("b", 300, 0.9)];
        let out = composer.compose(&chunks);
        assert!(out.contains("f.py:a"));
        assert!(out.contains("f.py:b"));
    }

    #[test]
    fn stops_past_seventy_percent_instead_of_truncating() {
        let composer = ContextComposer::new(1000);
        // 800 tokens consumed (80% of budget); next chunk must be skipped.
        let chunks = vec![scored("a", 800, 1.0), scored("b", 400, 0.9)];
        let out = composer.compose(&chunks);
        assert!(out.contains("f.py:a"));
        assert!(!out.contains("f.py:b"));
        assert!(!out.contains("truncated"));
    }

    #[test]
    fn below_seventy_percent_takes_a_partial_slice() {
        let composer = ContextComposer::new(1000);
        // 400 consumed (40%); second chunk overflows, remaining 600 > 150.
        let chunks = vec![scored("a", 400, 1.0), scored("b", 5000, 0.9)];
        let out = composer.compose(&chunks);
        assert!(out.contains("f.py:a"));
        assert!(out.contains("f.py:b"));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn tiny_remainder_is_not_worth_a_partial() {
        let composer = ContextComposer::new(300);
        // 200 consumed (67%, below the stop line), remaining 100 < 150.
        let chunks = vec![scored("a", 200, 1.0), scored("b", 500, 0.9)];
        let out = composer.compose(&chunks);
        assert!(out.contains("f.py:a"));
        assert!(!out.contains("f.py:b"));
    }

    #[test]
    fn output_stays_within_budget_slack() {
        let composer = ContextComposer::new(400);
        let chunks: Vec<ScoredChunk> = (0..20)
            .map(|i| scored(&format!("c{}", i), 200, 1.0 - i as f64 * 0.01))
            .collect();
        let out = composer.compose(&chunks);
        // 20% slack covers the formatting frames
        assert!(out.len() <= 400 * CHARS_PER_TOKEN * 12 / 10);
    }

    #[test]
    fn tail_keeps_exit_lines() {
        let mut body: Vec<String> = (0..100)
            .map(|i| format!("    statement_number_{}_{}", i, "pad".repeat(8)))
            .collect();
        body.push("    return result".to_string());
        let chunk = CodeChunk {
            id: "f.py:1-101".to_string(),
            file_path: "f.py".to_string(),
            start_line: 1,
            end_line: 101,
            content: body.join("\n"),
            kind: ChunkKind::Function,
            name: "long".to_string(),
            signature: String::new(),
            docstring: String::new(),
        };
        let partial = ContextComposer::truncate_chunk(&chunk, 300);
        assert!(partial.contains("return result"));
        assert!(partial.contains("middle truncated"));
    }
}
