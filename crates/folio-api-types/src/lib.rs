//! Wire types for the folio export polling protocol.
//!
//! A client submits an export, polls [`ExportStatus`] at a fixed interval
//! until `download_ready` flips to `true` (or the stage turns terminal), then
//! fetches the artifact once.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stages of an export job, in the order a job moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Starting,
    Fetching,
    Generating,
    Rendering,
    Finalizing,
    Completed,
    Error,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Starting => "starting",
            ExportStage::Fetching => "fetching",
            ExportStage::Generating => "generating",
            ExportStage::Rendering => "rendering",
            ExportStage::Finalizing => "finalizing",
            ExportStage::Completed => "completed",
            ExportStage::Error => "error",
        }
    }

    /// Terminal stages never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStage::Completed | ExportStage::Error)
    }
}

/// Response body returned when an export is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSubmitted {
    pub job_id: Uuid,
}

/// Polling snapshot of an export job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStatus {
    pub job_id: Uuid,
    /// Percentage in `0..=100`, never decreasing for a given job.
    pub progress: u8,
    pub stage: ExportStage,
    pub message: String,
    pub download_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_as_snake_case() {
        let json = serde_json::to_string(&ExportStage::Finalizing).expect("serialize");
        assert_eq!(json, "\"finalizing\"");
    }

    #[test]
    fn status_round_trips_through_json() {
        let status = ExportStatus {
            job_id: Uuid::nil(),
            progress: 45,
            stage: ExportStage::Generating,
            message: "Assembling document".to_string(),
            download_ready: false,
        };
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["stage"], "generating");
        assert_eq!(json["download_ready"], false);
        let back: ExportStatus = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, status);
    }

    #[test]
    fn only_completed_and_error_are_terminal() {
        assert!(ExportStage::Completed.is_terminal());
        assert!(ExportStage::Error.is_terminal());
        assert!(!ExportStage::Rendering.is_terminal());
    }
}
