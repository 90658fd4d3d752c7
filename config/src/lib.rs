//! Load typed configuration for forge from a TOML file.
//!
//! One `Settings` tree covers every table the service reads:
//! `[structured_output]`, `[agent_resources]`, `[debug]`, `[models]`,
//! `[paths]`, `[limits]`, `[router]`, `[retry]`, `[pacing]`. Every field has
//! a default, so a missing file or a partial file is never an error.
//!
//! Feature toggles must be honored live: handlers hold a [`ConfigHandle`]
//! and call [`ConfigHandle::current`] once per request, which re-reads the
//! file when its mtime changed instead of capturing values at startup.

mod handle;
mod settings;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use handle::ConfigHandle;
pub use settings::{
    AgentResourceSettings, DebugSettings, LimitSettings, ModelSettings, PacingSettings,
    PathSettings, RetrySettings, RouterSettings, Settings, StructuredOutputSettings,
    ValidatorCommandSettings,
};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read config: {0}")]
    Read(std::io::Error),
    #[error("parse config toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads settings from a TOML file. A missing file yields defaults; a file
/// that exists but does not parse is an error (bad config should be loud).
pub fn load_from(path: &Path) -> Result<Settings, LoadError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => return Err(LoadError::Read(e)),
    };
    Ok(toml::from_str(&raw)?)
}

/// Default config path: `$XDG_CONFIG_HOME/forge/config.toml` (or the platform
/// equivalent via `dirs`). `None` when no config dir can be resolved.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("forge").join("config.toml"))
}
