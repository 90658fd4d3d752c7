//! Administration of the persisted stores: discovery, stats, backup,
//! restore, and age-based cleanup.
//!
//! Covers the vector collections under `rag_persist_directory`, the
//! conversation JSON files under `output/conversations`, and the context
//! cache. Backups are a directory per backup under `output/backups`, with a
//! sibling `<name>.metadata.json` recording the original path, type, and
//! timestamp. Cleanup is dry-run by default.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    VectorCollection,
    Conversations,
    ContextCache,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::VectorCollection => "vector_collection",
            StoreKind::Conversations => "conversations",
            StoreKind::ContextCache => "context_cache",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoreInfo {
    pub name: String,
    pub kind: StoreKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub record_count: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub name: String,
    pub kind: StoreKind,
    pub original_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one cleanup pass over conversations.
#[derive(Clone, Debug, Serialize)]
pub struct CleanupPlan {
    pub candidates: Vec<String>,
    pub deleted: usize,
    pub dry_run: bool,
}

pub struct StoreAdmin {
    rag_dir: PathBuf,
    conversations_dir: PathBuf,
    cache_dir: PathBuf,
    backup_dir: PathBuf,
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(from).into_iter().filter_map(Result::ok) {
        let relative = entry.path().strip_prefix(from).expect("walk under from");
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl StoreAdmin {
    pub fn new(base_dir: &Path, settings: &env_config::Settings) -> Self {
        let output_dir = base_dir.join(&settings.paths.output_dir);
        Self {
            rag_dir: base_dir.join(&settings.paths.rag_persist_directory),
            conversations_dir: output_dir.join("conversations"),
            cache_dir: base_dir.join(&settings.paths.context_cache_directory),
            backup_dir: output_dir.join("backups"),
        }
    }

    /// Human-readable size.
    pub fn format_size(bytes: u64) -> String {
        const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
        let mut size = bytes as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", bytes, UNITS[unit])
        } else {
            format!("{:.1} {}", size, UNITS[unit])
        }
    }

    /// Every persisted store currently on disk.
    pub fn discover(&self) -> Vec<StoreInfo> {
        let mut stores = Vec::new();

        if self.rag_dir.exists() {
            if let Ok(entries) = std::fs::read_dir(&self.rag_dir) {
                for entry in entries.flatten() {
                    if !entry.path().is_dir() {
                        continue;
                    }
                    let record_count = std::fs::read_to_string(entry.path().join("index.json"))
                        .ok()
                        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
                        .and_then(|v| v.as_array().map(|a| a.len()));
                    stores.push(StoreInfo {
                        name: entry.file_name().to_string_lossy().to_string(),
                        kind: StoreKind::VectorCollection,
                        size_bytes: dir_size(&entry.path()),
                        path: entry.path(),
                        record_count,
                    });
                }
            }
        }

        if self.conversations_dir.exists() {
            let count = std::fs::read_dir(&self.conversations_dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .filter(|e| {
                            e.path().extension().and_then(|x| x.to_str()) == Some("json")
                        })
                        .count()
                })
                .unwrap_or(0);
            stores.push(StoreInfo {
                name: "conversations".to_string(),
                kind: StoreKind::Conversations,
                size_bytes: dir_size(&self.conversations_dir),
                path: self.conversations_dir.clone(),
                record_count: Some(count),
            });
        }

        if self.cache_dir.exists() {
            stores.push(StoreInfo {
                name: "context_cache".to_string(),
                kind: StoreKind::ContextCache,
                size_bytes: dir_size(&self.cache_dir),
                path: self.cache_dir.clone(),
                record_count: None,
            });
        }

        stores
    }

    /// Totals across all discovered stores.
    pub fn statistics(&self) -> serde_json::Value {
        let stores = self.discover();
        let total_size: u64 = stores.iter().map(|s| s.size_bytes).sum();
        let total_records: usize = stores.iter().filter_map(|s| s.record_count).sum();
        serde_json::json!({
            "total_stores": stores.len(),
            "total_size_bytes": total_size,
            "total_size_formatted": Self::format_size(total_size),
            "total_records": total_records,
            "stores": stores,
        })
    }

    fn find_store(&self, name: &str) -> Result<StoreInfo, CoreError> {
        self.discover()
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CoreError::NotFound(format!("store not found: {}", name)))
    }

    /// Copies one store into `output/backups/<name>_<timestamp>` and writes
    /// the metadata file next to it.
    pub fn backup(&self, store_name: &str, backup_name: Option<&str>) -> Result<PathBuf, CoreError> {
        let store = self.find_store(store_name)?;
        let created_at = Utc::now();
        let dir_name = backup_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", store.name, created_at.format("%Y%m%d_%H%M%S")));
        let backup_path = self.backup_dir.join(&dir_name);
        std::fs::create_dir_all(&backup_path)?;
        copy_dir(&store.path, &backup_path)?;

        let metadata = BackupMetadata {
            name: store.name.clone(),
            kind: store.kind,
            original_path: store.path.clone(),
            created_at,
        };
        let metadata_path = self.backup_dir.join(format!("{}.metadata.json", dir_name));
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        Ok(backup_path)
    }

    /// Backs up every discovered store; per-store failures are reported,
    /// not fatal.
    pub fn backup_all(&self) -> Vec<(String, Result<PathBuf, CoreError>)> {
        self.discover()
            .into_iter()
            .map(|store| {
                let result = self.backup(&store.name, None);
                (store.name, result)
            })
            .collect()
    }

    /// Restores a backup over its original location (or over the named
    /// store). The current content is kept as a `.pre_restore` sibling.
    pub fn restore(&self, backup_path: &Path, store_name: Option<&str>) -> Result<(), CoreError> {
        if !backup_path.is_dir() {
            return Err(CoreError::NotFound(format!(
                "backup not found: {}",
                backup_path.display()
            )));
        }
        let metadata_path = backup_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!(
                "{}.metadata.json",
                backup_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            ));
        let metadata: BackupMetadata = serde_json::from_str(
            &std::fs::read_to_string(&metadata_path)
                .map_err(|_| CoreError::NotFound(format!("missing {}", metadata_path.display())))?,
        )?;

        let target = match store_name {
            Some(name) => self.find_store(name)?.path,
            None => metadata.original_path.clone(),
        };

        if target.exists() {
            let safety = target.with_extension("pre_restore");
            let _ = std::fs::remove_dir_all(&safety);
            copy_dir(&target, &safety)?;
            std::fs::remove_dir_all(&target)?;
        }
        std::fs::create_dir_all(&target)?;
        copy_dir(backup_path, &target)?;
        Ok(())
    }

    /// Deletes (or, by default, just lists) conversations idle for more
    /// than `days` days.
    pub fn cleanup_conversations(&self, days: i64, execute: bool) -> Result<CleanupPlan, CoreError> {
        let deadline = Utc::now() - Duration::days(days);
        let mut candidates = Vec::new();
        if self.conversations_dir.exists() {
            for entry in std::fs::read_dir(&self.conversations_dir)?.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let modified: Option<DateTime<Utc>> = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from);
                if matches!(modified, Some(m) if m < deadline) {
                    candidates.push(path);
                }
            }
        }
        let names: Vec<String> = candidates
            .iter()
            .map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default())
            .collect();

        let mut deleted = 0;
        if execute {
            for path in &candidates {
                if std::fs::remove_file(path).is_ok() {
                    deleted += 1;
                }
            }
        }
        Ok(CleanupPlan {
            candidates: names,
            deleted,
            dry_run: !execute,
        })
    }
}
