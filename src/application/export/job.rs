use bytes::Bytes;
use folio_api_types::ExportStatus;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::types::{ExportStage, checkpoints};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: &'static str,
}

impl ExportArtifact {
    pub fn pdf(bytes: Bytes, filename: String) -> Self {
        Self {
            bytes,
            filename,
            content_type: PDF_CONTENT_TYPE,
        }
    }
}

/// Latest known state of one export. Only the newest record is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub id: Uuid,
    pub project_id: String,
    pub created_at: OffsetDateTime,
    pub progress: u8,
    pub stage: ExportStage,
    pub message: String,
    pub result: Option<ExportArtifact>,
}

impl ExportJob {
    pub fn new(id: Uuid, project_id: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            project_id: project_id.into(),
            created_at,
            progress: checkpoints::STARTING,
            stage: ExportStage::Starting,
            message: "Export queued".to_string(),
            result: None,
        }
    }

    /// Move to a later stage. Progress may never decrease and terminal
    /// records never change again.
    pub fn advance(
        &self,
        stage: ExportStage,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<Self, DomainError> {
        if self.stage.is_terminal() {
            return Err(DomainError::AlreadyTerminal {
                stage: self.stage.as_str(),
            });
        }
        let progress = progress.min(checkpoints::COMPLETED);
        if progress < self.progress {
            return Err(DomainError::ProgressRegression {
                from: self.progress,
                to: progress,
            });
        }
        Ok(Self {
            progress,
            stage,
            message: message.into(),
            ..self.clone()
        })
    }

    pub fn complete(
        &self,
        artifact: ExportArtifact,
        message: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let mut next = self.advance(ExportStage::Completed, checkpoints::COMPLETED, message)?;
        next.result = Some(artifact);
        Ok(next)
    }

    /// The error stage keeps the progress reached so far.
    pub fn fail(&self, message: impl Into<String>) -> Result<Self, DomainError> {
        self.advance(ExportStage::Error, self.progress, message)
    }

    pub fn download_ready(&self) -> bool {
        self.stage == ExportStage::Completed && self.result.is_some()
    }

    pub fn status(&self) -> ExportStatus {
        ExportStatus {
            job_id: self.id,
            progress: self.progress,
            stage: self.stage,
            message: self.message.clone(),
            download_ready: self.download_ready(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn job() -> ExportJob {
        ExportJob::new(Uuid::nil(), "p1", datetime!(2026-10-19 08:00 UTC))
    }

    #[test]
    fn new_jobs_start_at_zero() {
        let status = job().status();
        assert_eq!(status.stage, ExportStage::Starting);
        assert_eq!(status.progress, 0);
        assert!(!status.download_ready);
    }

    #[test]
    fn progress_cannot_regress() {
        let fetched = job()
            .advance(ExportStage::Fetching, 10, "Loading project data")
            .expect("advance");
        let err = fetched
            .advance(ExportStage::Generating, 5, "oops")
            .expect_err("regression rejected");
        assert!(matches!(
            err,
            DomainError::ProgressRegression { from: 10, to: 5 }
        ));
    }

    #[test]
    fn terminal_jobs_are_frozen() {
        let done = job()
            .complete(
                ExportArtifact::pdf(Bytes::from_static(b"%PDF"), "a.pdf".into()),
                "Export ready",
            )
            .expect("complete");
        assert!(done.download_ready());
        assert_eq!(done.progress, 100);
        assert!(done.fail("late failure").is_err());
    }

    #[test]
    fn failure_keeps_progress() {
        let failed = job()
            .advance(ExportStage::Rendering, 60, "Launching render engine")
            .and_then(|job| job.fail("Render engine unavailable"))
            .expect("fail");
        assert_eq!(failed.stage, ExportStage::Error);
        assert_eq!(failed.progress, 60);
        assert!(!failed.download_ready());
    }
}
