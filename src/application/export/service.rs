use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use folio_api_types::ExportStatus;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{sync::mpsc, time::Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::document::{AssembleError, AssemblyOptions, assemble, transform_sections};
use crate::application::engine::{
    CancelHandle, CancelSignal, EngineError, RenderEngine, RenderPhase, cancel_pair,
};
use crate::application::repos::{AccessDecision, OwnershipPolicy, ProjectSource, RepoError};
use crate::domain::error::DomainError;
use crate::domain::filename::export_filename;
use crate::domain::types::{ExportStage, checkpoints};

use super::job::{ExportArtifact, ExportJob};
use super::store::{ProgressStore, StoreError};
use super::{
    METRIC_EXPORT_COMPLETED, METRIC_EXPORT_DEGRADED, METRIC_EXPORT_DURATION_MS,
    METRIC_EXPORT_EVICTED, METRIC_EXPORT_FAILED, METRIC_EXPORT_IN_FLIGHT,
    METRIC_EXPORT_SUBMITTED,
};

#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    /// Wall-clock budget for one job, render included.
    pub job_timeout: Duration,
    /// How long a delivered artifact stays downloadable.
    pub download_grace: Duration,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("caller does not own the project")]
    Forbidden,
    #[error("project not found")]
    UnknownProject,
    #[error("ownership check failed: {0}")]
    Ownership(#[from] RepoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a result retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeResult {
    Ready(ExportArtifact),
    NotReady(ExportStage),
    NotFound,
}

/// Why a job ended in the error stage. Only [`JobFailure::user_message`]
/// reaches pollers.
#[derive(Debug, Error)]
enum JobFailure {
    #[error("project record not found")]
    RecordMissing,
    #[error("project record could not be loaded: {0}")]
    Repo(#[from] RepoError),
    #[error("document assembly failed: {0}")]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("job exceeded {0:?}")]
    TimedOut(Duration),
}

impl JobFailure {
    fn code(&self) -> &'static str {
        match self {
            JobFailure::RecordMissing => "record-missing",
            JobFailure::Repo(_) => "record-unavailable",
            JobFailure::Assemble(_) => "assembly-failed",
            JobFailure::Engine(err) => err.code(),
            JobFailure::TimedOut(_) => "timeout",
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            JobFailure::RecordMissing => "Project not found",
            JobFailure::Repo(_) => "Project data could not be loaded",
            JobFailure::Assemble(_) => "Document could not be assembled",
            JobFailure::Engine(err) => err.user_message(),
            JobFailure::TimedOut(_) => "Export timed out",
        }
    }
}

/// Sole writer of one job's progress record.
struct JobReporter {
    store: Arc<dyn ProgressStore>,
    job: ExportJob,
}

impl JobReporter {
    async fn publish(&mut self, next: Result<ExportJob, DomainError>) {
        let next = match next {
            Ok(next) => next,
            Err(err) => {
                warn!(
                    target = "application::export",
                    op = "export::progress",
                    job_id = %self.job.id,
                    error = %err,
                    "Progress update rejected"
                );
                return;
            }
        };
        if let Err(err) = self.store.set(next.clone()).await {
            warn!(
                target = "application::export",
                op = "export::progress",
                job_id = %self.job.id,
                error = %err,
                "Progress update could not be stored"
            );
        }
        self.job = next;
    }

    async fn advance(&mut self, stage: ExportStage, progress: u8, message: &str) {
        let next = self.job.advance(stage, progress, message);
        self.publish(next).await;
    }

    async fn render_phase(&mut self, phase: RenderPhase) {
        match phase {
            RenderPhase::Launched => {
                self.advance(ExportStage::Rendering, checkpoints::LOADING, "Loading document")
                    .await
            }
            RenderPhase::Loaded => {
                self.advance(
                    ExportStage::Rendering,
                    checkpoints::DIAGRAMS,
                    "Rendering diagrams",
                )
                .await
            }
            RenderPhase::Rasterizing => {
                self.advance(
                    ExportStage::Rendering,
                    checkpoints::RASTERIZING,
                    "Generating PDF",
                )
                .await
            }
        }
    }
}

/// Export orchestrator: accepts submissions, runs each job as detached
/// background work and answers polls from the progress store.
#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn ProgressStore>,
    source: Arc<dyn ProjectSource>,
    ownership: Arc<dyn OwnershipPolicy>,
    engine: RenderEngine,
    assembly: AssemblyOptions,
    settings: ExportSettings,
    running: Arc<DashMap<Uuid, CancelHandle>>,
}

impl ExportService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        source: Arc<dyn ProjectSource>,
        ownership: Arc<dyn OwnershipPolicy>,
        engine: RenderEngine,
        assembly: AssemblyOptions,
        settings: ExportSettings,
    ) -> Self {
        Self {
            store,
            source,
            ownership,
            engine,
            assembly,
            settings,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Check ownership, record the job and schedule it. Returns without
    /// waiting for any pipeline work.
    pub async fn submit(&self, caller: &str, project_id: &str) -> Result<Uuid, SubmitError> {
        match self.ownership.check(caller, project_id).await? {
            AccessDecision::Granted => {}
            AccessDecision::Denied => return Err(SubmitError::Forbidden),
            AccessDecision::UnknownProject => return Err(SubmitError::UnknownProject),
        }

        let job = ExportJob::new(Uuid::new_v4(), project_id, OffsetDateTime::now_utc());
        let job_id = job.id;
        self.store.set(job.clone()).await?;

        let (handle, signal) = cancel_pair();
        self.running.insert(job_id, handle);
        counter!(METRIC_EXPORT_SUBMITTED).increment(1);
        gauge!(METRIC_EXPORT_IN_FLIGHT).set(self.running.len() as f64);

        info!(
            target = "application::export",
            op = "export::submit",
            job_id = %job_id,
            project_id,
            "Export accepted"
        );

        let service = self.clone();
        tokio::spawn(async move { service.run_job(job, signal).await });

        Ok(job_id)
    }

    pub async fn status(&self, job_id: Uuid) -> Result<Option<ExportStatus>, StoreError> {
        Ok(self.store.get(job_id).await?.map(|job| job.status()))
    }

    /// Hand out the artifact. Retrieval shortens the record's remaining
    /// lifetime to the download grace window; repeated calls inside that
    /// window return the same artifact.
    pub async fn take_result(&self, job_id: Uuid) -> Result<TakeResult, StoreError> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(TakeResult::NotFound);
        };
        let Some(artifact) = job.result.filter(|_| job.stage == ExportStage::Completed) else {
            return Ok(TakeResult::NotReady(job.stage));
        };

        self.store
            .retain_until(job_id, Instant::now() + self.settings.download_grace)
            .await?;
        info!(
            target = "application::export",
            op = "export::take_result",
            job_id = %job_id,
            bytes = artifact.bytes.len(),
            "Export artifact delivered"
        );
        Ok(TakeResult::Ready(artifact))
    }

    /// Ask a running job to stop. Returns `false` if the job is unknown,
    /// finished, or already cancelled.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let signalled = self
            .running
            .get(&job_id)
            .is_some_and(|handle| handle.cancel());
        if signalled {
            info!(
                target = "application::export",
                op = "export::cancel",
                job_id = %job_id,
                "Cancellation requested"
            );
        }
        signalled
    }

    /// Evict records whose retention window has passed.
    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let evicted = self.store.evict_expired(Instant::now()).await?;
        if evicted > 0 {
            counter!(METRIC_EXPORT_EVICTED).increment(evicted as u64);
            info!(
                target = "application::export",
                op = "export::sweep",
                evicted,
                "Expired export records evicted"
            );
        }
        Ok(evicted)
    }

    async fn run_job(self, job: ExportJob, signal: CancelSignal) {
        let started_at = Instant::now();
        let job_id = job.id;
        let project_id = job.project_id.clone();
        let mut reporter = JobReporter {
            store: Arc::clone(&self.store),
            job,
        };

        let job_timeout = self.settings.job_timeout;
        let outcome = match tokio::time::timeout(job_timeout, self.pipeline(&mut reporter, &signal))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(JobFailure::TimedOut(job_timeout)),
        };
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match outcome {
            Ok((artifact, degraded)) => {
                let message = if degraded {
                    "Export ready (diagrams could not be rendered)"
                } else {
                    "Export ready"
                };
                let next = reporter.job.complete(artifact, message);
                reporter.publish(next).await;
                counter!(METRIC_EXPORT_COMPLETED).increment(1);
                if degraded {
                    counter!(METRIC_EXPORT_DEGRADED).increment(1);
                }
                info!(
                    target = "application::export",
                    op = "export::run",
                    result = "completed",
                    job_id = %job_id,
                    project_id,
                    degraded,
                    elapsed_ms,
                    "Export completed"
                );
            }
            Err(failure) => {
                let next = reporter.job.fail(failure.user_message());
                reporter.publish(next).await;
                counter!(METRIC_EXPORT_FAILED, "code" => failure.code()).increment(1);
                error!(
                    target = "application::export",
                    op = "export::run",
                    result = "error",
                    job_id = %job_id,
                    project_id,
                    error_code = failure.code(),
                    elapsed_ms,
                    error = %failure,
                    "Export failed"
                );
            }
        }

        histogram!(METRIC_EXPORT_DURATION_MS).record(elapsed_ms as f64);
        self.running.remove(&job_id);
        gauge!(METRIC_EXPORT_IN_FLIGHT).set(self.running.len() as f64);
    }

    async fn pipeline(
        &self,
        reporter: &mut JobReporter,
        signal: &CancelSignal,
    ) -> Result<(ExportArtifact, bool), JobFailure> {
        reporter
            .advance(ExportStage::Fetching, checkpoints::FETCHING, "Loading project data")
            .await;
        let record = self
            .source
            .load_export_record(&reporter.job.project_id)
            .await?
            .ok_or(JobFailure::RecordMissing)?;
        if signal.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }

        reporter
            .advance(
                ExportStage::Generating,
                checkpoints::TRANSFORMING,
                "Transforming content",
            )
            .await;
        let sections = transform_sections(&record);

        reporter
            .advance(
                ExportStage::Generating,
                checkpoints::ASSEMBLING,
                "Assembling document",
            )
            .await;
        let document = assemble(&record, &sections, &self.assembly, OffsetDateTime::now_utc())?;
        info!(
            target = "application::export",
            op = "export::assemble",
            job_id = %reporter.job.id,
            html_bytes = document.html.len(),
            diagrams = document.diagram_count,
            diagram_errors = document.diagram_error_count,
            sections = document.toc.len(),
            "Document assembled"
        );
        if signal.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }

        reporter
            .advance(
                ExportStage::Rendering,
                checkpoints::LAUNCHING,
                "Launching render engine",
            )
            .await;
        let (phase_tx, mut phase_rx) = mpsc::unbounded_channel();
        let render = self.engine.render(&document, signal, move |phase| {
            let _ = phase_tx.send(phase);
        });
        tokio::pin!(render);
        let rendered = loop {
            tokio::select! {
                result = &mut render => break result,
                Some(phase) = phase_rx.recv() => reporter.render_phase(phase).await,
            }
        };
        while let Ok(phase) = phase_rx.try_recv() {
            reporter.render_phase(phase).await;
        }
        let rendered = rendered?;

        reporter
            .advance(
                ExportStage::Finalizing,
                checkpoints::FINALIZING,
                "Preparing download",
            )
            .await;
        let filename = export_filename(&record.project.name, OffsetDateTime::now_utc().date());
        Ok((
            ExportArtifact::pdf(rendered.bytes, filename),
            rendered.degraded,
        ))
    }
}
