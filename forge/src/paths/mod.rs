//! Path guard against traversal out of the project root.
//!
//! Paths are resolved (symlinks followed, `..` collapsed) before the
//! containment check, so `"/proj/../etc/passwd"` cannot slip through. A
//! path outside the root is `AccessDenied`; empty or malformed input is
//! `InvalidRequest`.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Project root for containment checks: the given path, resolved, or the
/// working directory when none is given.
pub fn project_root(project_path: Option<&str>) -> Result<PathBuf, CoreError> {
    match project_path {
        Some(path) => Path::new(path)
            .canonicalize()
            .map_err(|e| CoreError::InvalidRequest(format!("bad project root {}: {}", path, e))),
        None => std::env::current_dir()
            .map_err(|e| CoreError::InvalidRequest(format!("no working directory: {}", e))),
    }
}

fn resolve_under(file_path: &str, root: &Path) -> Result<PathBuf, CoreError> {
    if file_path.trim().is_empty() {
        return Err(CoreError::InvalidRequest("empty path".into()));
    }
    let candidate = Path::new(file_path);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = absolute
        .canonicalize()
        .map_err(|e| CoreError::InvalidRequest(format!("bad path {}: {}", file_path, e)))?;
    if !resolved.starts_with(root) {
        return Err(CoreError::AccessDenied(format!(
            "path {} resolves outside the project root",
            file_path
        )));
    }
    Ok(resolved)
}

/// Validates that `file_path` is a file within `root`.
pub fn validate_file_path(file_path: &str, root: &Path) -> Result<PathBuf, CoreError> {
    let resolved = resolve_under(file_path, root)?;
    if !resolved.is_file() {
        return Err(CoreError::NotFound(format!("file not found: {}", file_path)));
    }
    Ok(resolved)
}

/// Validates that `dir_path` is a directory within `root`.
pub fn validate_directory_path(dir_path: &str, root: &Path) -> Result<PathBuf, CoreError> {
    let resolved = resolve_under(dir_path, root)?;
    if !resolved.is_dir() {
        return Err(CoreError::NotFound(format!(
            "directory not found: {}",
            dir_path
        )));
    }
    Ok(resolved)
}
