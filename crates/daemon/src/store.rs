// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk project metadata.
//!
//! One directory per project under `<data_dir>/projects/<project_id>/`,
//! holding `metadata.json` and the `logs/` segment directory. Metadata
//! writes go through a temporary sibling file and an atomic rename, so a
//! crash never leaves a half-written record.

use std::fs;
use std::path::{Path, PathBuf};

use tether_core::{Project, ProjectId};
use thiserror::Error;
use tracing::warn;

const METADATA_FILE: &str = "metadata.json";
const LOGS_DIR: &str = "logs";

/// Errors from metadata persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Project metadata store rooted at `<data_dir>/projects`.
#[derive(Debug)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(data_dir: &Path) -> Self {
        Self { root: data_dir.join("projects") }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, id: &ProjectId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Directory holding a project's message-log segments.
    pub fn logs_dir(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id).join(LOGS_DIR)
    }

    /// Create the project's directory tree (metadata parent and logs dir).
    pub fn prepare(&self, id: &ProjectId) -> Result<(), StoreError> {
        fs::create_dir_all(self.logs_dir(id))?;
        Ok(())
    }

    /// Persist metadata atomically: write a temp sibling, then rename over
    /// the target.
    pub fn save(&self, project: &Project) -> Result<(), StoreError> {
        let dir = self.project_dir(&project.id);
        fs::create_dir_all(&dir)?;
        let target = dir.join(METADATA_FILE);
        let tmp = dir.join(format!("{METADATA_FILE}.tmp"));

        let json = serde_json::to_vec_pretty(project)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    /// Remove a project's directory tree (metadata and log segments).
    pub fn remove(&self, id: &ProjectId) -> Result<(), StoreError> {
        let dir = self.project_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Load every project from disk. Decode failures are logged and
    /// skipped; one corrupt record must not take the daemon down.
    pub fn load_all(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects = Vec::new();
        if !self.root.exists() {
            return Ok(projects);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join(METADATA_FILE);
            let bytes = match fs::read(&meta_path) {
                Ok(b) => b,
                Err(e) => {
                    warn!(path = %meta_path.display(), error = %e, "skipping unreadable project metadata");
                    continue;
                }
            };
            match serde_json::from_slice::<Project>(&bytes) {
                Ok(project) => projects.push(project),
                Err(e) => {
                    warn!(path = %meta_path.display(), error = %e, "skipping undecodable project metadata");
                }
            }
        }
        Ok(projects)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
