//! Structure-aware code chunking.
//!
//! Chunks follow class/function boundaries; a block ends at the first
//! following non-empty line whose indent drops to the definition's level.
//! Chunks over `max_chunk_tokens` are split into part-numbered siblings,
//! with only the first part keeping the signature and docstring.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Average characters per token used throughout the engine.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Module,
    Class,
    Function,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Module => "module",
            ChunkKind::Class => "class",
            ChunkKind::Function => "function",
        }
    }
}

/// One code chunk. `id` is `path:startLine-endLine`, with `:partN` appended
/// for split siblings. Lines are 1-based and inclusive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub kind: ChunkKind,
    pub name: String,
    pub signature: String,
    pub docstring: String,
}

impl CodeChunk {
    /// Rough token estimate: one token per four characters.
    pub fn estimated_tokens(&self) -> usize {
        self.content.len() / CHARS_PER_TOKEN
    }
}

struct Boundary {
    kind: ChunkKind,
    name: String,
    start_line: usize,
    end_line: usize,
}

static CLASS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?m)^class\s+(\w+)").expect("class pattern"),
        Regex::new(r"(?m)^(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)")
            .expect("type pattern"),
        Regex::new(r"(?m)^impl(?:<[^>]*>)?\s+(\w+)").expect("impl pattern"),
    ]
});

static FUNCTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?m)^(?:async\s+)?def\s+(\w+)\s*\(").expect("def pattern"),
        Regex::new(r"(?m)^(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)").expect("fn pattern"),
    ]
});

static DOCSTRING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?s)"""([^"]*)""""#).expect("docstring pattern"),
        Regex::new(r"(?s)'''([^']*)'''").expect("docstring pattern"),
    ]
});

pub struct CodeChunker {
    max_chunk_tokens: usize,
}

impl CodeChunker {
    pub fn new(max_chunk_tokens: usize) -> Self {
        Self {
            max_chunk_tokens: max_chunk_tokens.max(1),
        }
    }

    /// Splits one file into structured chunks. A file without recognizable
    /// boundaries becomes a single module chunk.
    pub fn chunk_file(&self, file_path: &str, content: &str) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let lines: Vec<&str> = content.lines().collect();

        let mut boundaries = Vec::new();
        for (patterns, kind) in [
            (&*CLASS_PATTERNS, ChunkKind::Class),
            (&*FUNCTION_PATTERNS, ChunkKind::Function),
        ] {
            for pattern in patterns {
                for capture in pattern.captures_iter(content) {
                    let whole = capture.get(0).expect("capture 0");
                    let start_line = content[..whole.start()].matches('\n').count() + 1;
                    let end_line = Self::block_end(&lines, start_line - 1);
                    boundaries.push(Boundary {
                        kind,
                        name: capture
                            .get(1)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default(),
                        start_line,
                        end_line,
                    });
                }
            }
        }
        boundaries.sort_by_key(|b| b.start_line);
        boundaries.dedup_by_key(|b| b.start_line);

        if boundaries.is_empty() {
            return vec![self.module_chunk(file_path, content, lines.len())];
        }

        let mut chunks = Vec::new();
        for boundary in boundaries {
            let body: Vec<&str> = lines[boundary.start_line - 1..boundary.end_line].to_vec();
            let chunk_content = body.join("\n");
            let (signature, docstring) = Self::extract_metadata(&body);
            let chunk = CodeChunk {
                id: format!("{}:{}-{}", file_path, boundary.start_line, boundary.end_line),
                file_path: file_path.to_string(),
                start_line: boundary.start_line,
                end_line: boundary.end_line,
                content: chunk_content,
                kind: boundary.kind,
                name: boundary.name,
                signature,
                docstring,
            };
            if chunk.estimated_tokens() > self.max_chunk_tokens {
                chunks.extend(self.split_large_chunk(chunk));
            } else {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// 1-based inclusive end of the block starting at `start_idx` (0-based):
    /// the line before the first non-empty line whose indent drops back to
    /// the definition's level.
    fn block_end(lines: &[&str], start_idx: usize) -> usize {
        if start_idx >= lines.len() {
            return lines.len();
        }
        let start = lines[start_idx];
        let base_indent = start.len() - start.trim_start().len();
        for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            if indent <= base_indent {
                return i;
            }
        }
        lines.len()
    }

    fn extract_metadata(body: &[&str]) -> (String, String) {
        let signature = body
            .iter()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim().to_string())
            .unwrap_or_default();
        let joined = body.join("\n");
        let docstring = DOCSTRING_PATTERNS
            .iter()
            .find_map(|p| p.captures(&joined))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        (signature, docstring)
    }

    fn split_large_chunk(&self, chunk: CodeChunk) -> Vec<CodeChunk> {
        let lines: Vec<&str> = chunk.content.lines().collect();
        // ~80 characters per line
        let part_lines = ((self.max_chunk_tokens * CHARS_PER_TOKEN) / 80).max(1);

        let mut parts = Vec::new();
        for (n, window) in lines.chunks(part_lines).enumerate() {
            let body = window.join("\n");
            if body.trim().is_empty() {
                continue;
            }
            let start = chunk.start_line + n * part_lines;
            parts.push(CodeChunk {
                id: format!("{}:part{}", chunk.id, n),
                file_path: chunk.file_path.clone(),
                start_line: start,
                end_line: (start + window.len() - 1).min(chunk.end_line),
                content: body,
                kind: chunk.kind,
                name: format!("{}_part{}", chunk.name, n),
                signature: if n == 0 { chunk.signature.clone() } else { String::new() },
                docstring: if n == 0 { chunk.docstring.clone() } else { String::new() },
            });
        }
        if parts.is_empty() {
            vec![chunk]
        } else {
            parts
        }
    }

    fn module_chunk(&self, file_path: &str, content: &str, line_count: usize) -> CodeChunk {
        let name = std::path::Path::new(file_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_path)
            .to_string();
        CodeChunk {
            id: format!("{}:1-{}", file_path, line_count),
            file_path: file_path.to_string(),
            start_line: 1,
            end_line: line_count,
            content: content.to_string(),
            kind: ChunkKind::Module,
            name,
            signature: String::new(),
            docstring: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> CodeChunker {
        CodeChunker::new(500)
    }

    #[test]
    fn python_functions_become_chunks() {
        let source = "def alpha():\n    return 1\n\ndef beta():\n    return 2\n";
        let chunks = chunker().chunk_file("m.py", source);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "alpha");
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert!(chunks[0].content.contains("return 1"));
        assert!(!chunks[0].content.contains("beta"));
    }

    #[test]
    fn rust_functions_and_structs_become_chunks() {
        let source = "pub struct Point {\n    x: i32,\n}\n\nfn origin() -> Point {\n    Point { x: 0 }\n}\n";
        let chunks = chunker().chunk_file("geo.rs", source);
        let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"Point"));
        assert!(names.contains(&"origin"));
    }

    #[test]
    fn chunk_ids_encode_line_ranges() {
        let source = "def only():\n    pass\n";
        let chunks = chunker().chunk_file("one.py", source);
        assert_eq!(chunks[0].id, "one.py:1-2");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
    }

    #[test]
    fn docstring_and_signature_extracted() {
        let source = "def documented(a, b):\n    \"\"\"Adds two numbers.\"\"\"\n    return a + b\n";
        let chunks = chunker().chunk_file("d.py", source);
        assert_eq!(chunks[0].signature, "def documented(a, b):");
        assert_eq!(chunks[0].docstring, "Adds two numbers.");
    }

    #[test]
    fn file_without_boundaries_is_one_module_chunk() {
        let source = "x = 1\ny = 2\n";
        let chunks = chunker().chunk_file("consts.py", source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Module);
        assert_eq!(chunks[0].name, "consts");
    }

    #[test]
    fn oversized_chunks_split_into_parts() {
        let body: String = (0..200)
            .map(|i| format!("    line_{} = {}\n", i, "x".repeat(60)))
            .collect();
        let source = format!("def big():\n{}", body);
        let chunks = CodeChunker::new(100).chunk_file("big.py", &source);
        assert!(chunks.len() > 1);
        assert!(chunks[0].id.ends_with(":part0"));
        assert!(!chunks[0].signature.is_empty());
        assert!(chunks[1].signature.is_empty());
        for chunk in &chunks {
            assert!(
                chunk.estimated_tokens() <= 100 || chunk.id.contains(":part"),
                "chunk {} too large",
                chunk.id
            );
        }
    }

    #[test]
    fn deterministic_across_calls() {
        let source = "def a():\n    pass\n\nclass B:\n    def c(self):\n        pass\n";
        let first = chunker().chunk_file("f.py", source);
        let second = chunker().chunk_file("f.py", source);
        let ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ids2);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        assert!(chunker().chunk_file("e.py", "   \n  ").is_empty());
    }
}
