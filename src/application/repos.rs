//! Collaborator traits the export pipeline depends on.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::project::ProjectExportRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("stored record is malformed: {message}")]
    Malformed { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Result of an ownership check performed at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied,
    UnknownProject,
}

#[async_trait]
pub trait ProjectSource: Send + Sync {
    /// Only called from inside the background job.
    async fn load_export_record(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectExportRecord>, RepoError>;
}

#[async_trait]
pub trait OwnershipPolicy: Send + Sync {
    async fn check(&self, caller: &str, project_id: &str) -> Result<AccessDecision, RepoError>;
}
