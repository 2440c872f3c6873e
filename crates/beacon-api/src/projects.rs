//! Registry of project scopes seen by the service.

use std::fmt;

use async_trait::async_trait;
use beacon_core::ProjectId;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// One registered project
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Accepted writes carrying this scope
    pub writes: u64,
}

impl ProjectRecord {
    fn new(id: ProjectId, name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            created_at: now,
            last_seen: now,
            writes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectStoreError {
    #[error("Project {0} already exists")]
    AlreadyExists(ProjectId),
}

/// Storage for project metadata
#[async_trait]
pub trait ProjectStore: Send + Sync + fmt::Debug {
    /// Register a new project; fails if the id is taken
    async fn create(
        &self,
        id: ProjectId,
        name: Option<String>,
    ) -> Result<ProjectRecord, ProjectStoreError>;

    /// All projects, ordered by id
    async fn list(&self) -> Vec<ProjectRecord>;

    /// Record an accepted write, registering the project on first sight
    async fn touch(&self, id: &ProjectId);
}

/// In-memory project store
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: DashMap<ProjectId, ProjectRecord>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn create(
        &self,
        id: ProjectId,
        name: Option<String>,
    ) -> Result<ProjectRecord, ProjectStoreError> {
        match self.projects.entry(id.clone()) {
            Entry::Occupied(_) => Err(ProjectStoreError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                let record = ProjectRecord::new(id, name, Utc::now());
                slot.insert(record.clone());
                debug!(project = %record.id, "Project created");
                Ok(record)
            }
        }
    }

    async fn list(&self) -> Vec<ProjectRecord> {
        let mut projects: Vec<_> = self.projects.iter().map(|p| p.value().clone()).collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        projects
    }

    async fn touch(&self, id: &ProjectId) {
        let now = Utc::now();
        let mut entry = self
            .projects
            .entry(id.clone())
            .or_insert_with(|| ProjectRecord::new(id.clone(), None, now));
        entry.last_seen = now;
        entry.writes += 1;
    }
}
