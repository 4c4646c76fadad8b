// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory project registry.
//!
//! The registry owns every live project: an id-keyed map of handles, each
//! handle owning the project metadata, its message log, and its subscriber
//! set. Insertion enforces the process-wide invariants (unique id, unique
//! canonical path, no path-component nesting, count limit); removal refuses
//! while an execution is in flight.
//!
//! Lock order is registry → handle metadata → subscriber set, and no lock
//! is ever held across network or child-process I/O; broadcasters iterate
//! defensive snapshots.

mod broadcast;

pub use broadcast::broadcast;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tether_core::{nests_with, ConnId, Project, ProjectId, ProjectState};
use tether_wire::ProjectSnapshot;
use thiserror::Error;

use crate::logstore::MessageLog;
use crate::server::session::Session;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("project not found: {0}")]
    NotFound(ProjectId),

    #[error("path nests with existing project {existing}")]
    Nesting { existing: ProjectId },

    #[error("project limit reached ({max})")]
    Limit { max: usize },

    #[error("project is executing")]
    Executing,
}

/// A live project: metadata, owned message log, subscriber set.
pub struct ProjectHandle {
    pub id: ProjectId,
    /// Canonical path, fixed for the project's lifetime.
    pub path: PathBuf,
    meta: Mutex<Project>,
    pub log: MessageLog,
    subscribers: Mutex<HashMap<ConnId, Weak<Session>>>,
}

impl std::fmt::Debug for ProjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ProjectHandle {
    pub fn new(project: Project, log: MessageLog) -> Self {
        Self {
            id: project.id,
            path: project.path.clone(),
            meta: Mutex::new(project),
            log,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Clone of the current metadata.
    pub fn meta(&self) -> Project {
        self.meta.lock().clone()
    }

    /// Run a closure against the metadata under the handle lock.
    pub fn with_meta<R>(&self, f: impl FnOnce(&mut Project) -> R) -> R {
        f(&mut self.meta.lock())
    }

    pub fn state(&self) -> ProjectState {
        self.meta.lock().state
    }

    /// Point-in-time wire snapshot (metadata + live subscriber count).
    pub fn snapshot(&self) -> ProjectSnapshot {
        let meta = self.meta.lock().clone();
        ProjectSnapshot::from_project(&meta, self.subscriber_count())
    }

    pub fn add_subscriber(&self, session: &Arc<Session>) {
        self.subscribers.lock().insert(session.id, Arc::downgrade(session));
    }

    pub fn remove_subscriber(&self, id: &ConnId) {
        self.subscribers.lock().remove(id);
    }

    pub fn is_subscriber(&self, id: &ConnId) -> bool {
        self.subscribers.lock().get(id).is_some_and(|w| w.strong_count() > 0)
    }

    /// Live subscriber count; dead references are pruned as a side effect.
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|_, weak| weak.strong_count() > 0);
        subs.len()
    }

    /// Defensive copy of the live subscribers, for iteration without the
    /// lock. Dead references are pruned as a side effect.
    pub fn snapshot_subscribers(&self) -> Vec<Arc<Session>> {
        let mut subs = self.subscribers.lock();
        let mut live = Vec::with_capacity(subs.len());
        subs.retain(|_, weak| match weak.upgrade() {
            Some(session) => {
                live.push(session);
                true
            }
            None => false,
        });
        live
    }

    /// Drop every subscriber, returning the live ones (for a final
    /// notification after project deletion).
    pub fn clear_subscribers(&self) -> Vec<Arc<Session>> {
        let mut subs = self.subscribers.lock();
        let live = subs.values().filter_map(Weak::upgrade).collect();
        subs.clear();
        live
    }

    #[cfg(test)]
    pub(crate) fn add_dead_subscriber(&self, id: ConnId) {
        self.subscribers.lock().insert(id, Weak::new());
    }
}

/// Process-wide set of projects.
pub struct ProjectRegistry {
    max_projects: usize,
    inner: RwLock<HashMap<ProjectId, Arc<ProjectHandle>>>,
}

impl ProjectRegistry {
    pub fn new(max_projects: usize) -> Self {
        Self { max_projects, inner: RwLock::new(HashMap::new()) }
    }

    /// Insert a new project, enforcing the count limit and the nesting
    /// invariant against every existing path.
    pub fn insert(&self, handle: ProjectHandle) -> Result<Arc<ProjectHandle>, RegistryError> {
        let mut inner = self.inner.write();
        if inner.len() >= self.max_projects {
            return Err(RegistryError::Limit { max: self.max_projects });
        }
        for existing in inner.values() {
            if nests_with(&handle.path, &existing.path) {
                return Err(RegistryError::Nesting { existing: existing.id });
            }
        }
        let handle = Arc::new(handle);
        inner.insert(handle.id, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, id: &ProjectId) -> Result<Arc<ProjectHandle>, RegistryError> {
        self.inner.read().get(id).cloned().ok_or(RegistryError::NotFound(*id))
    }

    /// Remove a project. Refused while an execution is in flight.
    pub fn remove(&self, id: &ProjectId) -> Result<Arc<ProjectHandle>, RegistryError> {
        let mut inner = self.inner.write();
        let handle = inner.get(id).cloned().ok_or(RegistryError::NotFound(*id))?;
        if handle.state() == ProjectState::Executing {
            return Err(RegistryError::Executing);
        }
        inner.remove(id);
        Ok(handle)
    }

    pub fn list(&self) -> Vec<Arc<ProjectHandle>> {
        self.inner.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Wire snapshots of every project, oldest first.
    pub fn snapshots(&self) -> Vec<ProjectSnapshot> {
        let mut snapshots: Vec<ProjectSnapshot> =
            self.list().iter().map(|h| h.snapshot()).collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_str().cmp(b.id.as_str())));
        snapshots
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
