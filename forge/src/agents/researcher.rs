//! Research agent: RAG confidence heuristic and context assembly.
//!
//! The confidence heuristic maps the best (minimum) cosine distance among
//! retrieved documents into [0, 1], scaled by how many documents came back.
//! Below the configured threshold the research stage augments with web
//! search.

/// Confidence in the retrieved documents, from the minimum distance and the
/// result count.
pub fn rag_confidence(distances: &[f32]) -> f32 {
    if distances.is_empty() {
        return 0.0;
    }
    let min_distance = distances.iter().copied().fold(f32::INFINITY, f32::min);
    let base = if min_distance < 0.3 {
        0.9
    } else if min_distance < 0.5 {
        0.75
    } else if min_distance < 0.7 {
        0.6
    } else {
        0.4
    };
    let count_factor = (distances.len() as f32 / 4.0).min(1.0);
    (base * (0.7 + 0.3 * count_factor)).min(1.0)
}

/// Assembles the research context block from its parts, skipping empty ones.
pub fn assemble(
    memory_recommendations: &str,
    project_context: &str,
    rag_context: &str,
    web_context: &str,
) -> String {
    let mut parts = Vec::new();
    if !memory_recommendations.is_empty() {
        parts.push(memory_recommendations.to_string());
    }
    if !project_context.is_empty() {
        parts.push(format!("[Project context]\n{}", project_context));
    }
    if !rag_context.is_empty() {
        parts.push(format!("[Local context]\n{}", rag_context));
    }
    if !web_context.is_empty() {
        parts.push(format!("[Web context]\n{}", web_context));
    }
    parts.join("\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_documents_means_zero_confidence() {
        assert_eq!(rag_confidence(&[]), 0.0);
    }

    #[test]
    fn close_documents_score_high() {
        let confidence = rag_confidence(&[0.1, 0.4, 0.6, 0.8]);
        assert!(confidence > 0.8, "got {}", confidence);
    }

    #[test]
    fn distant_documents_score_low() {
        let confidence = rag_confidence(&[0.9]);
        assert!(confidence < 0.5, "got {}", confidence);
    }

    #[test]
    fn more_documents_raise_confidence() {
        let few = rag_confidence(&[0.4]);
        let many = rag_confidence(&[0.4, 0.4, 0.4, 0.4]);
        assert!(many > few);
    }

    #[test]
    fn assemble_skips_empty_sections() {
        let block = assemble("", "project stuff", "", "web stuff");
        assert!(block.contains("[Project context]"));
        assert!(block.contains("[Web context]"));
        assert!(!block.contains("[Local context]"));
    }
}
