//! Export jobs: the progress store and the orchestrator that drives the
//! transform, assemble and render stages in the background.

mod job;
mod service;
mod store;

pub use self::job::{ExportArtifact, ExportJob, PDF_CONTENT_TYPE};
pub use self::service::{ExportService, ExportSettings, SubmitError, TakeResult};
pub use self::store::{InMemoryProgressStore, ProgressStore, StoreError};

pub const METRIC_EXPORT_SUBMITTED: &str = "folio_export_submitted_total";
pub const METRIC_EXPORT_COMPLETED: &str = "folio_export_completed_total";
pub const METRIC_EXPORT_FAILED: &str = "folio_export_failed_total";
pub const METRIC_EXPORT_DEGRADED: &str = "folio_export_degraded_total";
pub const METRIC_EXPORT_EVICTED: &str = "folio_export_evicted_total";
pub const METRIC_EXPORT_DURATION_MS: &str = "folio_export_duration_ms";
pub const METRIC_EXPORT_IN_FLIGHT: &str = "folio_export_in_flight";
