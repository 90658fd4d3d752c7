//! Vector store contract and the in-memory implementation.
//!
//! The contract mirrors the external store: `add` takes parallel arrays of
//! ids, embeddings, documents, and metadata; `query` returns hits ordered by
//! distance, where a larger distance means less similar. The in-memory
//! store computes cosine distance and can snapshot itself to a JSON file per
//! collection so indices survive restarts.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One query hit. `distance` grows as similarity falls; cosine distance is
/// `1 - cosine_similarity`, so 0 means identical direction.
#[derive(Clone, Debug)]
pub struct VectorQueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(
        &self,
        ids: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        documents: Vec<String>,
        metadatas: Vec<Value>,
    ) -> Result<(), CoreError>;

    async fn query(&self, embedding: &[f32], n: usize) -> Result<Vec<VectorQueryHit>, CoreError>;

    async fn count(&self) -> Result<usize, CoreError>;
}

#[derive(Clone, Serialize, Deserialize)]
struct VectorEntry {
    id: String,
    vector: Vec<f32>,
    document: String,
    metadata: Value,
}

/// Cosine-distance store over an in-memory entry list, with optional JSON
/// persistence under a collection directory.
pub struct InMemoryVectorStore {
    entries: Mutex<Vec<VectorEntry>>,
    persist_file: Option<PathBuf>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            persist_file: None,
        }
    }

    /// A store backed by `<collection_dir>/index.json`, loading any existing
    /// snapshot. An unreadable snapshot starts the collection empty rather
    /// than failing startup.
    pub fn persistent(collection_dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = collection_dir.into();
        std::fs::create_dir_all(&dir)?;
        let file = dir.join("index.json");
        let entries = match std::fs::read_to_string(&file) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Ok(Self {
            entries: Mutex::new(entries),
            persist_file: Some(file),
        })
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }

    fn snapshot(&self, entries: &[VectorEntry]) -> Result<(), CoreError> {
        if let Some(ref file) = self.persist_file {
            let raw = serde_json::to_string(entries)?;
            std::fs::write(file, raw)?;
        }
        Ok(())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(
        &self,
        ids: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        documents: Vec<String>,
        metadatas: Vec<Value>,
    ) -> Result<(), CoreError> {
        if ids.len() != embeddings.len() || ids.len() != documents.len() || ids.len() != metadatas.len()
        {
            return Err(CoreError::InternalInvariant(
                "vector add: parallel arrays must have equal length".into(),
            ));
        }
        let mut entries = self.entries.lock().expect("vector store lock poisoned");
        for (((id, vector), document), metadata) in ids
            .into_iter()
            .zip(embeddings)
            .zip(documents)
            .zip(metadatas)
        {
            entries.push(VectorEntry {
                id,
                vector,
                document,
                metadata,
            });
        }
        self.snapshot(&entries)
    }

    async fn query(&self, embedding: &[f32], n: usize) -> Result<Vec<VectorQueryHit>, CoreError> {
        let entries = self.entries.lock().expect("vector store lock poisoned");
        let mut hits: Vec<VectorQueryHit> = entries
            .iter()
            .map(|entry| VectorQueryHit {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                distance: 1.0 - Self::cosine_similarity(embedding, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, CoreError> {
        Ok(self.entries.lock().expect("vector store lock poisoned").len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn query_orders_by_distance() {
        let store = InMemoryVectorStore::new();
        store
            .add(
                vec!["a".into(), "b".into()],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                vec!["doc a".into(), "doc b".into()],
                vec![json!({}), json!({})],
            )
            .await
            .unwrap();
        let hits = store.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn identical_vector_has_zero_distance() {
        let store = InMemoryVectorStore::new();
        store
            .add(
                vec!["x".into()],
                vec![vec![0.6, 0.8]],
                vec!["doc".into()],
                vec![json!({"k": "v"})],
            )
            .await
            .unwrap();
        let hits = store.query(&[0.6, 0.8], 1).await.unwrap();
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[0].metadata["k"], "v");
    }

    #[tokio::test]
    async fn mismatched_arrays_rejected() {
        let store = InMemoryVectorStore::new();
        let result = store
            .add(vec!["a".into()], vec![], vec!["d".into()], vec![json!({})])
            .await;
        assert!(matches!(result, Err(CoreError::InternalInvariant(_))));
    }

    #[tokio::test]
    async fn persistent_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = InMemoryVectorStore::persistent(dir.path().join("tasks")).unwrap();
            store
                .add(
                    vec!["1".into()],
                    vec![vec![1.0, 0.0]],
                    vec!["remembered".into()],
                    vec![json!({"intent": "create"})],
                )
                .await
                .unwrap();
        }
        let reloaded = InMemoryVectorStore::persistent(dir.path().join("tasks")).unwrap();
        assert_eq!(reloaded.count().await.unwrap(), 1);
        let hits = reloaded.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].document, "remembered");
    }
}
