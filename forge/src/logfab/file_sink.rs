//! JSONL file sink with size-based rotation.
//!
//! One JSON object per line. When the file grows past `max_bytes` the sink
//! rotates: `log.jsonl.N-1` → `log.jsonl.N` … `log.jsonl` → `log.jsonl.1`,
//! keeping `backup_count` backups.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::logfab::models::LogEvent;
use crate::logfab::sink::{LogSink, SinkError};

pub struct FileSink {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    state: Mutex<FileState>,
}

struct FileState {
    file: File,
    written: u64,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, backup_count: usize) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = Self::open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            max_bytes,
            backup_count,
            state: Mutex::new(FileState { file, written }),
        })
    }

    fn open(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(format!(".{}", n));
        PathBuf::from(os)
    }

    fn rotate(&self, state: &mut FileState) -> std::io::Result<()> {
        for n in (1..self.backup_count).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                let _ = std::fs::rename(&from, self.backup_path(n + 1));
            }
        }
        if self.backup_count > 0 {
            let _ = std::fs::rename(&self.path, self.backup_path(1));
        } else {
            let _ = std::fs::remove_file(&self.path);
        }
        state.file = Self::open(&self.path)?;
        state.written = 0;
        Ok(())
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(&event.to_value())
            .map_err(|e| SinkError::Other(format!("serialize: {}", e)))?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkError::Other("file sink lock poisoned".into()))?;
        if state.written + line.len() as u64 + 1 > self.max_bytes && state.written > 0 {
            self.rotate(&mut state)?;
        }
        writeln!(state.file, "{}", line)?;
        state.written += line.len() as u64 + 1;
        Ok(())
    }
}
