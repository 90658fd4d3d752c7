//! Context engine: index a project, rank chunks, compose a budgeted context.
//!
//! Indexing walks the project (skipping hidden directories and tool caches),
//! chunks every matching file, and caches the result keyed by a hash of the
//! absolute project path plus the sorted extension list. The cache is
//! process-wide and safe under concurrent reads; building an index for one
//! key is serialized by a per-key mutex.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::context::chunker::{CodeChunk, CodeChunker};
use crate::context::composer::ContextComposer;
use crate::context::scorer::RelevanceScorer;
use crate::error::CoreError;
use crate::logfab::{LogEvent, LogManager, LogSource};

/// Directory names never indexed, on top of hidden (dot-prefixed) ones.
const SKIPPED_DIRS: [&str; 4] = ["__pycache__", "target", "node_modules", "venv"];

/// File path → chunks, ordered for deterministic iteration.
pub type ProjectIndex = BTreeMap<String, Vec<CodeChunk>>;

pub struct ContextEngine {
    chunker: CodeChunker,
    scorer: RelevanceScorer,
    composer: ContextComposer,
    cache: DashMap<String, Arc<ProjectIndex>>,
    build_locks: DashMap<String, Arc<Mutex<()>>>,
    logs: Arc<LogManager>,
}

impl ContextEngine {
    pub fn new(max_context_tokens: usize, max_chunk_tokens: usize, logs: Arc<LogManager>) -> Self {
        Self {
            chunker: CodeChunker::new(max_chunk_tokens),
            scorer: RelevanceScorer::new(),
            composer: ContextComposer::new(max_context_tokens),
            cache: DashMap::new(),
            build_locks: DashMap::new(),
            logs,
        }
    }

    fn cache_key(project_path: &Path, extensions: &[String]) -> String {
        let mut sorted = extensions.to_vec();
        sorted.sort();
        let mut hasher = Sha256::new();
        hasher.update(project_path.to_string_lossy().as_bytes());
        hasher.update(b":");
        hasher.update(sorted.join(",").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn is_indexable(entry: &walkdir::DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if entry.depth() > 0 && (name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())) {
            return false;
        }
        true
    }

    /// Chunks every matching file under the project root. Repeated calls
    /// with the same `(path, extensions)` return the cached index.
    pub fn index_project(
        &self,
        project_path: &str,
        extensions: &[String],
    ) -> Result<Arc<ProjectIndex>, CoreError> {
        let root = Path::new(project_path)
            .canonicalize()
            .map_err(|_| CoreError::NotFound(format!("project not found: {}", project_path)))?;
        let extensions: Vec<String> = if extensions.is_empty() {
            vec![".py".to_string(), ".rs".to_string()]
        } else {
            extensions.to_vec()
        };
        let key = Self::cache_key(&root, &extensions);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }

        let build_lock = self
            .build_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = build_lock.lock().expect("index build lock poisoned");

        // another indexer may have finished while we waited
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }

        let mut index = ProjectIndex::new();
        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(Self::is_indexable)
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let matches_extension = extensions.iter().any(|ext| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{}", e) == *ext)
                    .unwrap_or(false)
            });
            if !matches_extension {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(path) else {
                // unreadable or non-UTF-8 files are skipped, not fatal
                continue;
            };
            let relative = path
                .strip_prefix(&root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            let chunks = self.chunker.chunk_file(&relative, &content);
            if !chunks.is_empty() {
                index.insert(relative, chunks);
            }
        }

        self.logs.emit(
            LogEvent::info(format!(
                "indexed {} files under {}",
                index.len(),
                root.display()
            ))
            .source(LogSource::Infrastructure),
        );

        let index = Arc::new(index);
        self.cache.insert(key, Arc::clone(&index));
        Ok(index)
    }

    /// Prompt-sized context for the query, at most `max_context_tokens`
    /// (modulo the formatting frames around each chunk).
    pub fn get_context(
        &self,
        query: &str,
        project_path: &str,
        extensions: &[String],
    ) -> Result<String, CoreError> {
        let index = self.index_project(project_path, extensions)?;

        let all_chunks: Vec<CodeChunk> = index.values().flatten().cloned().collect();
        if all_chunks.is_empty() {
            return Ok(String::new());
        }

        let scored = self.scorer.score_chunks(query, &all_chunks);
        let context = self.composer.compose(&scored);
        if context.is_empty() {
            self.logs.emit(
                LogEvent::warning("no chunk fit the context budget".to_string())
                    .source(LogSource::Infrastructure),
            );
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfab::LogFabricConfig;

    fn quiet_logs() -> Arc<LogManager> {
        Arc::new(LogManager::new(LogFabricConfig {
            enable_console: false,
            enable_file: false,
            ..Default::default()
        }))
    }

    fn engine(max_context: usize) -> ContextEngine {
        ContextEngine::new(max_context, 500, quiet_logs())
    }

    fn write_project(dir: &Path) {
        std::fs::write(
            dir.join("parsing.py"),
            "def parse_config(path):\n    \"\"\"Reads config.\"\"\"\n    return path\n\ndef helper():\n    return 1\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.join(".hidden")).unwrap();
        std::fs::write(dir.join(".hidden").join("secret.py"), "def hidden():\n    pass\n").unwrap();
        std::fs::create_dir_all(dir.join("__pycache__")).unwrap();
        std::fs::write(dir.join("__pycache__").join("c.py"), "def cached():\n    pass\n").unwrap();
    }

    #[test]
    fn indexing_skips_hidden_and_cache_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let engine = engine(4000);
        let index = engine
            .index_project(dir.path().to_str().unwrap(), &[".py".to_string()])
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("parsing.py"));
    }

    #[test]
    fn repeated_indexing_is_deterministic_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let engine = engine(4000);
        let path = dir.path().to_str().unwrap();
        let first = engine.index_project(path, &[".py".to_string()]).unwrap();
        let second = engine.index_project(path, &[".py".to_string()]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let ids: Vec<&str> = first.values().flatten().map(|c| c.id.as_str()).collect();
        let ids2: Vec<&str> = second.values().flatten().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ids2);
    }

    #[test]
    fn missing_project_is_not_found() {
        let engine = engine(4000);
        let result = engine.index_project("/definitely/not/a/project", &[]);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn get_context_returns_relevant_chunk() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let engine = engine(4000);
        let context = engine
            .get_context("parse config", dir.path().to_str().unwrap(), &[".py".to_string()])
            .unwrap();
        assert!(context.contains("parse_config"));
    }

    #[test]
    fn context_respects_token_budget_with_slack() {
        let dir = tempfile::tempdir().unwrap();
        // 20 functions of ~200 tokens each
        for i in 0..20 {
            let body = format!(
                "def func_{i}():\n    \"\"\"function {i} about foo\"\"\"\n{}    return {i}\n",
                format!("    data_{i} = \"{}\"\n", "x".repeat(700)),
            );
            std::fs::write(dir.path().join(format!("m{}.py", i)), body).unwrap();
        }
        let engine = engine(400);
        let context = engine
            .get_context("foo", dir.path().to_str().unwrap(), &[".py".to_string()])
            .unwrap();
        assert!(!context.is_empty());
        assert!(context.len() <= 400 * 4 * 12 / 10, "context too large: {}", context.len());
    }
}
