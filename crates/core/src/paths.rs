// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project path validation and the nesting check.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from project path validation.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),

    #[error("path cannot be canonicalized: {0}")]
    Canonicalize(std::io::Error),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Validate a client-supplied project path.
///
/// The path must be non-empty, absolute, resolvable on disk, and a
/// directory. Returns the canonicalized form, which is what the registry
/// stores and the nesting check compares.
pub fn validate_project_path(raw: &str) -> Result<PathBuf, PathError> {
    if raw.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(PathError::NotAbsolute(path.to_path_buf()));
    }
    let canonical = path.canonicalize().map_err(PathError::Canonicalize)?;
    if !canonical.is_dir() {
        return Err(PathError::NotADirectory(canonical));
    }
    Ok(canonical)
}

/// Whether two canonical paths nest, by path components.
///
/// `Path::starts_with` compares whole components, so `/a/b` does not nest
/// with `/a/bc`. Equal paths nest (each is a prefix of the other).
pub fn nests_with(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
