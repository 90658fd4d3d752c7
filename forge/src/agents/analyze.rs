//! Project-analysis agent: summarize structure from the index plus the
//! most relevant chunks.

use crate::context::ProjectIndex;

/// Per-project statistics shown alongside the analysis.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ProjectStats {
    pub files: usize,
    pub chunks: usize,
    pub functions: usize,
    pub classes: usize,
}

pub fn stats(index: &ProjectIndex) -> ProjectStats {
    let mut stats = ProjectStats {
        files: index.len(),
        chunks: 0,
        functions: 0,
        classes: 0,
    };
    for chunks in index.values() {
        stats.chunks += chunks.len();
        for chunk in chunks {
            match chunk.kind {
                crate::context::ChunkKind::Function => stats.functions += 1,
                crate::context::ChunkKind::Class => stats.classes += 1,
                crate::context::ChunkKind::Module => {}
            }
        }
    }
    stats
}

pub fn prompt(task: &str, stats: &ProjectStats, file_list: &[String], context: &str) -> String {
    let listing = file_list.join("\n");
    format!(
        "Analyze this project and answer the request.\n\nREQUEST: {}\n\n\
         The project has {} files, {} functions, {} classes.\nFiles:\n{}\n\n\
         Most relevant code:\n{}\n\n\
         Describe the structure, the main components, and anything notable.",
        task, stats.files, stats.functions, stats.classes, listing, context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CodeChunker;

    #[test]
    fn stats_count_kinds() {
        let chunker = CodeChunker::new(500);
        let mut index = ProjectIndex::new();
        index.insert(
            "a.py".to_string(),
            chunker.chunk_file("a.py", "class A:\n    pass\n\ndef f():\n    pass\n"),
        );
        let s = stats(&index);
        assert_eq!(s.files, 1);
        assert_eq!(s.classes, 1);
        assert_eq!(s.functions, 1);
    }
}
