//! BM25-style relevance scoring of chunks against a query.
//!
//! Tokenization splits CamelCase and snake_case, lowercases, and drops
//! tokens of length ≤ 2 plus a short stop-word list. Per-term IDF is
//! `ln((N − df + 0.5)/(df + 0.5) + 1)`, with `ln(N + 1)` for terms absent
//! from every chunk. A chunk's score sums `tf · idf` over query terms with
//! `tf = count / (len + 1)`, boosted ×3.0 / ×2.0 / ×1.5 for matches in the
//! name, signature, and docstring respectively. Order is total: descending
//! score, ties by original position.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::chunker::CodeChunk;

const STOP_WORDS: [&str; 17] = [
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "to", "of", "in", "on", "at",
    "for", "with", "by",
];

static CAMEL_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("camel split pattern"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word pattern"));

/// A chunk plus its relevance to a query.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub chunk: CodeChunk,
    pub score: f64,
    pub matched_terms: Vec<String>,
}

pub struct RelevanceScorer;

impl RelevanceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Splits text into ranking tokens, CamelCase- and snake_case-aware.
    pub fn tokenize(text: &str) -> Vec<String> {
        let spaced = CAMEL_SPLIT.replace_all(text, "$1 $2");
        let spaced = spaced.replace('_', " ").to_lowercase();
        WORD.find_iter(&spaced)
            .map(|m| m.as_str().to_string())
            .filter(|t| t.len() > 2 && !STOP_WORDS.contains(&t.as_str()))
            .collect()
    }

    /// Scores every chunk against the query; descending by score, ties kept
    /// in original order. An empty query scores every chunk 0.
    pub fn score_chunks(&self, query: &str, chunks: &[CodeChunk]) -> Vec<ScoredChunk> {
        if chunks.is_empty() {
            return Vec::new();
        }
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() {
            return chunks
                .iter()
                .map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    score: 0.0,
                    matched_terms: Vec::new(),
                })
                .collect();
        }

        let idf = Self::compute_idf(&query_terms, chunks);

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .map(|chunk| Self::score_chunk(&query_terms, &idf, chunk))
            .collect();
        // stable sort preserves original order on ties
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    fn compute_idf(query_terms: &[String], chunks: &[CodeChunk]) -> HashMap<String, f64> {
        let total = chunks.len() as f64;
        let chunk_tokens: Vec<Vec<String>> = chunks
            .iter()
            .map(|c| {
                let mut tokens = Self::tokenize(&c.content);
                tokens.extend(Self::tokenize(&c.name));
                tokens.extend(Self::tokenize(&c.signature));
                tokens
            })
            .collect();

        let mut idf = HashMap::new();
        for term in query_terms {
            if idf.contains_key(term) {
                continue;
            }
            let df = chunk_tokens
                .iter()
                .filter(|tokens| tokens.iter().any(|t| t == term))
                .count() as f64;
            let value = if df > 0.0 {
                ((total - df + 0.5) / (df + 0.5) + 1.0).ln()
            } else {
                // absent everywhere: upper-bound IDF
                (total + 1.0).ln()
            };
            idf.insert(term.clone(), value);
        }
        idf
    }

    fn score_chunk(
        query_terms: &[String],
        idf: &HashMap<String, f64>,
        chunk: &CodeChunk,
    ) -> ScoredChunk {
        let haystack = format!(
            "{} {} {} {}",
            chunk.name, chunk.signature, chunk.docstring, chunk.content
        );
        let chunk_terms = Self::tokenize(&haystack);
        let total_terms = chunk_terms.len() as f64 + 1.0;

        let name_lower = chunk.name.to_lowercase();
        let signature_lower = chunk.signature.to_lowercase();
        let docstring_lower = chunk.docstring.to_lowercase();

        let mut score = 0.0;
        let mut matched = Vec::new();
        for term in query_terms {
            let count = chunk_terms.iter().filter(|t| *t == term).count();
            if count == 0 {
                continue;
            }
            let mut tf = count as f64 / total_terms;
            if name_lower.contains(term.as_str()) {
                tf *= 3.0;
            } else if signature_lower.contains(term.as_str()) {
                tf *= 2.0;
            } else if docstring_lower.contains(term.as_str()) {
                tf *= 1.5;
            }
            score += tf * idf.get(term).copied().unwrap_or(0.0);
            matched.push(term.clone());
        }

        ScoredChunk {
            chunk: chunk.clone(),
            score,
            matched_terms: matched,
        }
    }
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::chunker::{ChunkKind, CodeChunk};

    fn chunk(name: &str, content: &str) -> CodeChunk {
        CodeChunk {
            id: format!("f.py:1-1:{}", name),
            file_path: "f.py".to_string(),
            start_line: 1,
            end_line: 1,
            content: content.to_string(),
            kind: ChunkKind::Function,
            name: name.to_string(),
            signature: format!("def {}():", name),
            docstring: String::new(),
        }
    }

    #[test]
    fn tokenize_splits_camel_and_snake_case() {
        let tokens = RelevanceScorer::tokenize("ConfigManager load_config theParser");
        assert!(tokens.contains(&"config".to_string()));
        assert!(tokens.contains(&"manager".to_string()));
        assert!(tokens.contains(&"load".to_string()));
        assert!(tokens.contains(&"parser".to_string()));
    }

    #[test]
    fn tokenize_drops_short_tokens_and_stop_words() {
        let tokens = RelevanceScorer::tokenize("to be or not in the db is ok");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"db".to_string()));
        assert!(!tokens.contains(&"ok".to_string()));
        assert!(tokens.contains(&"not".to_string()));
    }

    #[test]
    fn empty_chunk_list_scores_empty() {
        assert!(RelevanceScorer::new().score_chunks("query", &[]).is_empty());
    }

    #[test]
    fn empty_query_scores_zero_for_every_chunk() {
        let chunks = vec![chunk("alpha", "alpha body"), chunk("beta", "beta body")];
        let scored = RelevanceScorer::new().score_chunks("", &chunks);
        assert_eq!(scored.len(), 2);
        assert!(scored.iter().all(|s| s.score == 0.0));
        // original order preserved
        assert_eq!(scored[0].chunk.name, "alpha");
    }

    #[test]
    fn relevant_chunk_ranks_first_with_matched_terms() {
        let chunks = vec![
            chunk("unrelated", "completely different topic"),
            chunk("parse_json", "parse json data into records"),
        ];
        let scored = RelevanceScorer::new().score_chunks("parse json", &chunks);
        assert_eq!(scored[0].chunk.name, "parse_json");
        assert!(scored[0].score > scored[1].score);
        assert!(scored[0].matched_terms.contains(&"json".to_string()));
    }

    #[test]
    fn name_match_outranks_body_match() {
        let chunks = vec![
            chunk("helper", "sorting sorting sorting appears in the body"),
            chunk("sorting", "body with no repeated mention"),
        ];
        let scored = RelevanceScorer::new().score_chunks("sorting", &chunks);
        assert_eq!(scored[0].chunk.name, "sorting");
    }

    #[test]
    fn ties_preserve_original_order() {
        let chunks = vec![chunk("first", "same text"), chunk("second", "same text")];
        let scored = RelevanceScorer::new().score_chunks("same text", &chunks);
        assert_eq!(scored[0].chunk.name, "first");
        assert_eq!(scored[1].chunk.name, "second");
    }
}
