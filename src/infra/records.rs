//! Project record sources.
//!
//! The project CRUD layer lives elsewhere; these adapters read the export
//! records it produces.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::application::repos::{AccessDecision, OwnershipPolicy, ProjectSource, RepoError};
use crate::domain::project::ProjectExportRecord;

/// Reads `<project_id>.json` files from a directory. The record's
/// `project.owner_id` decides ownership.
#[derive(Debug, Clone)]
pub struct FsProjectSource {
    directory: PathBuf,
}

impl FsProjectSource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, project_id: &str) -> Option<PathBuf> {
        let valid = !project_id.is_empty()
            && project_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        valid.then(|| self.directory.join(format!("{project_id}.json")))
    }

    async fn read(&self, project_id: &str) -> Result<Option<ProjectExportRecord>, RepoError> {
        let Some(path) = self.record_path(project_id) else {
            debug!(
                target = "infra::records",
                op = "records::read",
                project_id,
                "Rejected project id that cannot name a record file"
            );
            return Ok(None);
        };

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RepoError::from_persistence(err)),
        };

        let record: ProjectExportRecord = serde_json::from_str(&raw)
            .map_err(|err| RepoError::malformed(format!("{}: {err}", path.display())))?;
        if record.project.id != project_id {
            return Err(RepoError::malformed(format!(
                "{} holds project `{}`",
                path.display(),
                record.project.id
            )));
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl ProjectSource for FsProjectSource {
    async fn load_export_record(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectExportRecord>, RepoError> {
        self.read(project_id).await
    }
}

#[async_trait]
impl OwnershipPolicy for FsProjectSource {
    async fn check(&self, caller: &str, project_id: &str) -> Result<AccessDecision, RepoError> {
        Ok(match self.read(project_id).await? {
            None => AccessDecision::UnknownProject,
            Some(record) if record.project.owner_id == caller => AccessDecision::Granted,
            Some(_) => AccessDecision::Denied,
        })
    }
}

/// In-process records; grants every caller. Used by the one-shot render
/// command and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectSource {
    records: Arc<DashMap<String, ProjectExportRecord>>,
}

impl InMemoryProjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ProjectExportRecord) {
        self.records.insert(record.project.id.clone(), record);
    }
}

#[async_trait]
impl ProjectSource for InMemoryProjectSource {
    async fn load_export_record(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectExportRecord>, RepoError> {
        Ok(self.records.get(project_id).map(|entry| entry.clone()))
    }
}

#[async_trait]
impl OwnershipPolicy for InMemoryProjectSource {
    async fn check(&self, _caller: &str, project_id: &str) -> Result<AccessDecision, RepoError> {
        Ok(if self.records.contains_key(project_id) {
            AccessDecision::Granted
        } else {
            AccessDecision::UnknownProject
        })
    }
}
