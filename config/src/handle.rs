//! Live configuration handle.
//!
//! Handlers read settings once per request through [`ConfigHandle::current`];
//! the handle re-reads the backing file when its mtime changed, so toggles
//! flipped by an admin take effect without a restart. A parse failure on
//! reload keeps the last good snapshot.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::settings::Settings;

enum Inner {
    /// Fixed snapshot, used by tests and embedded callers.
    Fixed(Arc<Settings>),
    /// File-backed, reloaded on mtime change.
    File {
        path: PathBuf,
        state: Mutex<FileState>,
    },
}

struct FileState {
    modified: Option<SystemTime>,
    snapshot: Arc<Settings>,
}

/// Shared, cheaply clonable access point for the current settings.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<Inner>,
}

impl ConfigHandle {
    /// A handle that always returns the given snapshot.
    pub fn fixed(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Inner::Fixed(Arc::new(settings))),
        }
    }

    /// A file-backed handle. The file does not need to exist yet; defaults
    /// apply until it does.
    pub fn from_path(path: PathBuf) -> Self {
        let snapshot = Arc::new(crate::load_from(&path).unwrap_or_default());
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Self {
            inner: Arc::new(Inner::File {
                path,
                state: Mutex::new(FileState { modified, snapshot }),
            }),
        }
    }

    /// A handle over the default config location, or fixed defaults when no
    /// config directory can be resolved.
    pub fn from_default_location() -> Self {
        match crate::default_config_path() {
            Some(path) => Self::from_path(path),
            None => Self::fixed(Settings::default()),
        }
    }

    /// The current settings snapshot. File-backed handles re-read when the
    /// file's mtime changed since the last call.
    pub fn current(&self) -> Arc<Settings> {
        match &*self.inner {
            Inner::Fixed(snapshot) => Arc::clone(snapshot),
            Inner::File { path, state } => {
                let mut state = state.lock().expect("config state lock poisoned");
                let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
                if modified != state.modified {
                    if let Ok(settings) = crate::load_from(path) {
                        state.snapshot = Arc::new(settings);
                    }
                    state.modified = modified;
                }
                Arc::clone(&state.snapshot)
            }
        }
    }
}
