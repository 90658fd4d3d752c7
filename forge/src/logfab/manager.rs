//! LogManager: the single entry point of the log fabric.
//!
//! Applies level filtering, multicasts to every configured sink, and
//! isolates sink failures: a sink that errors during emit is reported on
//! stderr directly (not through the fabric, to avoid recursion) and the
//! remaining sinks still receive the event.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::logfab::console_sink::ConsoleSink;
use crate::logfab::file_sink::FileSink;
use crate::logfab::memory_sink::MemorySink;
use crate::logfab::models::{LogEvent, LogLevel};
use crate::logfab::sink::LogSink;

/// Sink selection and bounds for one manager.
#[derive(Clone, Debug)]
pub struct LogFabricConfig {
    pub level: LogLevel,
    pub enable_console: bool,
    pub enable_file: bool,
    pub file_path: PathBuf,
    pub max_file_size_mb: u64,
    pub file_backup_count: usize,
    pub enable_memory: bool,
    pub memory_max_events: usize,
}

impl Default for LogFabricConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_console: true,
            enable_file: false,
            file_path: PathBuf::from("output/logs/forge.jsonl"),
            max_file_size_mb: 10,
            file_backup_count: 3,
            enable_memory: true,
            memory_max_events: 1000,
        }
    }
}

impl LogFabricConfig {
    /// Console + memory, for interactive development.
    pub fn for_dev() -> Self {
        Self::default()
    }

    /// File + memory (no console), for serving a UI.
    pub fn for_ui(output_dir: &std::path::Path, max_events: usize) -> Self {
        Self {
            enable_console: false,
            enable_file: true,
            file_path: output_dir.join("logs").join("forge.jsonl"),
            memory_max_events: max_events,
            ..Self::default()
        }
    }
}

pub struct LogManager {
    sinks: Vec<Arc<dyn LogSink>>,
    memory: Option<Arc<MemorySink>>,
    level: Mutex<LogLevel>,
}

impl LogManager {
    pub fn new(config: LogFabricConfig) -> Self {
        let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
        let mut memory = None;

        if config.enable_file {
            match FileSink::new(
                &config.file_path,
                config.max_file_size_mb * 1024 * 1024,
                config.file_backup_count,
            ) {
                Ok(sink) => sinks.push(Arc::new(sink)),
                Err(e) => eprintln!("log fabric: file sink unavailable: {}", e),
            }
        }
        if config.enable_console {
            sinks.push(Arc::new(ConsoleSink::new()));
        }
        if config.enable_memory {
            let sink = Arc::new(MemorySink::new(config.memory_max_events));
            memory = Some(Arc::clone(&sink));
            sinks.push(sink);
        }

        Self {
            sinks,
            memory,
            level: Mutex::new(config.level),
        }
    }

    /// Process-wide default manager (console + memory). The composition root
    /// normally builds its own; this exists for contexts that have none.
    pub fn global() -> Arc<LogManager> {
        static GLOBAL: OnceCell<Arc<LogManager>> = OnceCell::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LogManager::new(LogFabricConfig::default()))))
    }

    /// The memory sink, when configured (needed by the stream adapter).
    pub fn memory_sink(&self) -> Option<Arc<MemorySink>> {
        self.memory.clone()
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.lock().expect("level lock poisoned") = level;
    }

    pub fn level(&self) -> LogLevel {
        *self.level.lock().expect("level lock poisoned")
    }

    /// Multicasts one event to every sink, honoring the level filter.
    pub fn emit(&self, event: LogEvent) {
        if event.level < self.level() {
            return;
        }
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&event) {
                // Not routed through the fabric: a broken sink reporting
                // through itself would recurse.
                eprintln!("log fabric: sink '{}' failed: {}", sink.name(), e);
            }
        }
    }
}
