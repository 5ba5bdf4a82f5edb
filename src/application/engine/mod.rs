//! Render engine adapter.
//!
//! Drives one freshly launched [`RenderTarget`] per document: load, wait for
//! the diagram library, fit oversized content, rasterize, release. Launch and
//! load failures are fatal; a missing diagram library only degrades the
//! output; fitting is best effort.

mod cancel;
mod fit;
mod target;

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::application::document::Document;

pub use self::cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use self::fit::{FitDecision, FitPolicy};
pub use self::target::{
    LoadOptions, PageFormat, PageOptions, RenderTarget, TargetError, TargetLauncher, WaitCondition,
};

/// Global exposed by the diagram library once its script has loaded.
pub const DIAGRAM_LIBRARY_GLOBAL: &str = "mermaid";

/// Diagram placeholders only; restored code blocks must not be re-rendered.
pub const DIAGRAM_SELECTOR: &str = "pre.mermaid[data-role=\"diagram\"]";

/// Appends the diagram library script named by the document's
/// `folio:diagram-script` meta tag. Runs after load so the download is only
/// bounded by the library wait.
const INJECT_LIBRARY_SCRIPT: &str = r#"(() => {
  const meta = document.querySelector('meta[name="folio:diagram-script"]');
  if (!meta || !meta.content) {
    return false;
  }
  const script = document.createElement('script');
  script.src = meta.content;
  script.async = true;
  document.head.appendChild(script);
  return true;
})()"#;

const RUN_DIAGRAMS_SCRIPT: &str = r#"(() => {
  window.mermaid.initialize({ startOnLoad: false, securityLevel: 'strict' });
  return window.mermaid
    .run({ querySelector: 'pre.mermaid[data-role="diagram"]', suppressErrors: true })
    .then(() => document.querySelectorAll('pre.mermaid[data-role="diagram"] svg').length);
})()"#;

/// Elements subject to content-fit scaling.
pub const FIT_SELECTORS: &[&str] = &[
    ".diagram-container",
    "iframe[data-role=\"mockup-frame\"]",
    "img.mockup__image, img.inline-image",
];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("render engine unavailable: {0}")]
    Unavailable(#[source] TargetError),
    #[error("page load timed out after {0:?}")]
    PageLoadTimeout(Duration),
    #[error("page load failed: {0}")]
    LoadFailed(#[source] TargetError),
    #[error("rasterization failed: {0}")]
    RenderFailed(#[source] TargetError),
    #[error("render cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable identifier, safe to expose.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unavailable(_) => "render-engine-unavailable",
            EngineError::PageLoadTimeout(_) => "page-load-timeout",
            EngineError::LoadFailed(_) | EngineError::RenderFailed(_) => "render-failed",
            EngineError::Cancelled => "cancelled",
        }
    }

    /// Short message for pollers; the error itself is only logged.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::Unavailable(_) => "Render engine unavailable",
            EngineError::PageLoadTimeout(_) => "Document took too long to load",
            EngineError::LoadFailed(_) => "Document could not be loaded for rendering",
            EngineError::RenderFailed(_) => "Document could not be rendered",
            EngineError::Cancelled => "Export cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub load_timeout: Duration,
    pub library_timeout: Duration,
    pub blocked_resource_types: Vec<String>,
    pub diagram_script_url: String,
    pub page: PageOptions,
    pub fit: FitPolicy,
}

/// Milestones reported while a render is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Launched,
    Loaded,
    Rasterizing,
}

#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub bytes: Bytes,
    /// Diagrams the library reported as rendered; zero when degraded.
    pub diagrams_rendered: usize,
    /// The diagram library never became available.
    pub degraded: bool,
    pub fitted_elements: usize,
}

#[derive(Clone)]
pub struct RenderEngine {
    launcher: Arc<dyn TargetLauncher>,
    settings: EngineSettings,
}

impl RenderEngine {
    pub fn new(launcher: Arc<dyn TargetLauncher>, settings: EngineSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Single attempt; callers decide about retries.
    ///
    /// The target is closed on every path that returns. If the returned
    /// future is dropped instead (job timeout), dropping the boxed target
    /// releases it.
    pub async fn render<F>(
        &self,
        document: &Document,
        cancel: &CancelSignal,
        mut on_phase: F,
    ) -> Result<RenderedArtifact, EngineError>
    where
        F: FnMut(RenderPhase) + Send,
    {
        let started_at = Instant::now();
        let mut target = guarded(cancel, self.launcher.launch())
            .await?
            .map_err(|err| {
                warn!(
                    target = "application::engine",
                    op = "engine::launch",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Render target could not be launched"
                );
                EngineError::Unavailable(err)
            })?;
        on_phase(RenderPhase::Launched);

        let outcome = self
            .drive(target.as_mut(), document, cancel, &mut on_phase)
            .await;

        if let Err(err) = target.close().await {
            debug!(
                target = "application::engine",
                op = "engine::close",
                result = "error",
                error = %err,
                "Render target did not close cleanly"
            );
        }

        match &outcome {
            Ok(artifact) => info!(
                target = "application::engine",
                op = "engine::render",
                result = if artifact.degraded { "degraded" } else { "ok" },
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                bytes = artifact.bytes.len(),
                diagrams_rendered = artifact.diagrams_rendered,
                fitted_elements = artifact.fitted_elements,
                "Document rendered"
            ),
            Err(err) => warn!(
                target = "application::engine",
                op = "engine::render",
                result = "error",
                error_code = err.code(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %err,
                "Document render failed"
            ),
        }

        outcome
    }

    async fn drive<F>(
        &self,
        target: &mut dyn RenderTarget,
        document: &Document,
        cancel: &CancelSignal,
        on_phase: &mut F,
    ) -> Result<RenderedArtifact, EngineError>
    where
        F: FnMut(RenderPhase) + Send,
    {
        let load_options = LoadOptions {
            blocked_resource_types: self.settings.blocked_resource_types.clone(),
            allowed_urls: vec![self.settings.diagram_script_url.clone()],
        };
        let load_timeout = self.settings.load_timeout;
        let load = timeout(load_timeout, target.load(&document.html, &load_options));
        match guarded(cancel, load).await? {
            Ok(Ok(())) => {}
            Ok(Err(TargetError::Timeout { .. })) | Err(_) => {
                return Err(EngineError::PageLoadTimeout(load_timeout));
            }
            Ok(Err(err)) => return Err(EngineError::LoadFailed(err)),
        }
        on_phase(RenderPhase::Loaded);

        let (diagrams_rendered, degraded) = if document.has_diagrams() {
            self.render_diagrams(target, cancel).await?
        } else {
            (0, false)
        };

        let fitted_elements = self.fit_content(target, cancel).await?;

        on_phase(RenderPhase::Rasterizing);
        let bytes = guarded(cancel, target.rasterize(&self.settings.page))
            .await?
            .map_err(EngineError::RenderFailed)?;
        if bytes.is_empty() {
            return Err(EngineError::RenderFailed(TargetError::protocol(
                "rasterizer returned an empty document",
            )));
        }

        Ok(RenderedArtifact {
            bytes,
            diagrams_rendered,
            degraded,
            fitted_elements,
        })
    }

    /// Returns the rendered diagram count and whether the library was
    /// missing.
    async fn render_diagrams(
        &self,
        target: &mut dyn RenderTarget,
        cancel: &CancelSignal,
    ) -> Result<(usize, bool), EngineError> {
        let library_timeout = self.settings.library_timeout;
        let injected = match guarded(cancel, target.evaluate(INJECT_LIBRARY_SCRIPT)).await? {
            Ok(value) => value.as_bool() != Some(false),
            Err(err) => {
                warn!(
                    target = "application::engine",
                    op = "engine::inject_library",
                    result = "error",
                    error = %err,
                    "Diagram library could not be requested"
                );
                false
            }
        };
        if !injected {
            warn!(
                target = "application::engine",
                op = "engine::inject_library",
                result = "degraded",
                "Diagram library not requested; leaving diagrams unrendered"
            );
            return Ok((0, true));
        }

        let condition = WaitCondition::GlobalDefined(DIAGRAM_LIBRARY_GLOBAL.to_string());
        let available = match guarded(
            cancel,
            timeout(library_timeout, target.wait_for(&condition, library_timeout)),
        )
        .await?
        {
            Ok(Ok(available)) => available,
            Ok(Err(err)) => {
                warn!(
                    target = "application::engine",
                    op = "engine::wait_for_library",
                    result = "error",
                    error = %err,
                    "Diagram library wait failed; leaving diagrams unrendered"
                );
                false
            }
            Err(_) => false,
        };

        if !available {
            warn!(
                target = "application::engine",
                op = "engine::wait_for_library",
                result = "degraded",
                timeout_ms = library_timeout.as_millis() as u64,
                "Diagram library unavailable; leaving diagrams unrendered"
            );
            return Ok((0, true));
        }

        let rendered = match guarded(cancel, target.evaluate(RUN_DIAGRAMS_SCRIPT)).await? {
            Ok(value) => value.as_u64().unwrap_or_default() as usize,
            Err(err) => {
                warn!(
                    target = "application::engine",
                    op = "engine::run_diagrams",
                    result = "error",
                    error = %err,
                    "Diagram library reported render errors"
                );
                0
            }
        };
        Ok((rendered, false))
    }

    async fn fit_content(
        &self,
        target: &mut dyn RenderTarget,
        cancel: &CancelSignal,
    ) -> Result<usize, EngineError> {
        let mut fitted = 0;
        for selector in FIT_SELECTORS {
            let heights = match guarded(cancel, target.measure(selector)).await? {
                Ok(heights) => heights,
                Err(err) => {
                    debug!(
                        target = "application::engine",
                        op = "engine::fit",
                        selector,
                        error = %err,
                        "Measurement unavailable; skipping"
                    );
                    continue;
                }
            };

            for (index, height) in heights.into_iter().enumerate() {
                let Some(decision) = self.settings.fit.decide(height) else {
                    continue;
                };
                let styles = decision.styles();
                match guarded(cancel, target.set_style(selector, index, &styles)).await? {
                    Ok(()) => fitted += 1,
                    Err(err) => debug!(
                        target = "application::engine",
                        op = "engine::fit",
                        selector,
                        index,
                        error = %err,
                        "Could not apply fit scaling; skipping"
                    ),
                }
            }
        }
        Ok(fitted)
    }
}

/// Race a target operation against cancellation.
async fn guarded<T>(
    cancel: &CancelSignal,
    operation: impl Future<Output = T>,
) -> Result<T, EngineError> {
    let mut cancel = cancel.clone();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        value = operation => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone, Default)]
    struct Behaviour {
        launch_fails: bool,
        load_fails: bool,
        load_hangs: bool,
        library_available: bool,
        library_delay: Option<Duration>,
        measure_fails: bool,
        heights: Vec<Option<f64>>,
    }

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct FakeTarget {
        behaviour: Behaviour,
        calls: CallLog,
    }

    impl FakeTarget {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().expect("call log").push(call.into());
        }
    }

    impl Drop for FakeTarget {
        fn drop(&mut self) {
            self.record("drop");
        }
    }

    #[async_trait]
    impl RenderTarget for FakeTarget {
        async fn load(&mut self, _html: &str, options: &LoadOptions) -> Result<(), TargetError> {
            self.record(format!("load:{}", options.blocked_resource_types.join(",")));
            if self.behaviour.load_hangs {
                std::future::pending::<()>().await;
            }
            if self.behaviour.load_fails {
                return Err(TargetError::command("load", "net::ERR_ABORTED"));
            }
            Ok(())
        }

        async fn wait_for(
            &mut self,
            _condition: &WaitCondition,
            _timeout: Duration,
        ) -> Result<bool, TargetError> {
            self.record("wait_for");
            if let Some(delay) = self.behaviour.library_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.behaviour.library_available)
        }

        async fn evaluate(&mut self, script: &str) -> Result<Value, TargetError> {
            if script == INJECT_LIBRARY_SCRIPT {
                self.record("inject_library");
                return Ok(json!(true));
            }
            self.record("evaluate");
            Ok(json!(2))
        }

        async fn measure(&mut self, selector: &str) -> Result<Vec<Option<f64>>, TargetError> {
            self.record(format!("measure:{selector}"));
            if self.behaviour.measure_fails {
                return Err(TargetError::command("measure", "cross-origin frame"));
            }
            if selector == FIT_SELECTORS[0] {
                Ok(self.behaviour.heights.clone())
            } else {
                Ok(Vec::new())
            }
        }

        async fn set_style(
            &mut self,
            _selector: &str,
            index: usize,
            styles: &[(String, String)],
        ) -> Result<(), TargetError> {
            self.record(format!("set_style:{index}:{}", styles[0].1));
            Ok(())
        }

        async fn rasterize(&mut self, _options: &PageOptions) -> Result<Bytes, TargetError> {
            self.record("rasterize");
            Ok(Bytes::from_static(b"%PDF-1.7 fake"))
        }

        async fn close(&mut self) -> Result<(), TargetError> {
            self.record("close");
            Ok(())
        }
    }

    struct FakeLauncher {
        behaviour: Behaviour,
        calls: CallLog,
    }

    #[async_trait]
    impl TargetLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Box<dyn RenderTarget>, TargetError> {
            if self.behaviour.launch_fails {
                return Err(TargetError::Launch("No such file or directory (os error 2)".into()));
            }
            Ok(Box::new(FakeTarget {
                behaviour: self.behaviour.clone(),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn engine(behaviour: Behaviour) -> (RenderEngine, CallLog) {
        let calls = CallLog::default();
        let launcher = FakeLauncher {
            behaviour,
            calls: Arc::clone(&calls),
        };
        let settings = EngineSettings {
            load_timeout: Duration::from_secs(30),
            library_timeout: Duration::from_secs(10),
            blocked_resource_types: vec!["media".to_string(), "font".to_string()],
            diagram_script_url: "https://cdn.example.com/mermaid.min.js".to_string(),
            page: PageOptions {
                format: PageFormat::A4,
                margin_mm: 15.0,
                print_background: true,
            },
            fit: FitPolicy::for_page(PageFormat::A4, 15.0, 0.4, 1200.0),
        };
        (RenderEngine::new(Arc::new(launcher), settings), calls)
    }

    fn document(diagram_count: usize) -> Document {
        Document {
            title: "Atlas".to_string(),
            html: "<html></html>".to_string(),
            toc: Vec::new(),
            diagram_count,
            diagram_error_count: 0,
            mockup_frame_count: 0,
        }
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().expect("call log").clone()
    }

    #[tokio::test]
    async fn full_render_runs_steps_in_order() {
        let (engine, log) = engine(Behaviour {
            library_available: true,
            heights: vec![Some(400.0), Some(3000.0)],
            ..Behaviour::default()
        });
        let mut phases = Vec::new();

        let artifact = engine
            .render(&document(2), &CancelSignal::never(), |phase| phases.push(phase))
            .await
            .expect("render succeeds");

        assert_eq!(artifact.diagrams_rendered, 2);
        assert!(!artifact.degraded);
        assert_eq!(artifact.fitted_elements, 1);
        assert_eq!(
            phases,
            [RenderPhase::Launched, RenderPhase::Loaded, RenderPhase::Rasterizing]
        );
        assert_eq!(
            calls(&log),
            [
                "load:media,font",
                "inject_library",
                "wait_for",
                "evaluate",
                "measure:.diagram-container",
                "set_style:1:scale(0.4000)",
                "measure:iframe[data-role=\"mockup-frame\"]",
                "measure:img.mockup__image, img.inline-image",
                "rasterize",
                "close",
                "drop",
            ]
        );
    }

    #[tokio::test]
    async fn documents_without_diagrams_skip_the_library_wait() {
        let (engine, log) = engine(Behaviour::default());
        engine
            .render(&document(0), &CancelSignal::never(), |_| {})
            .await
            .expect("render succeeds");
        assert!(!calls(&log).iter().any(|call| call == "wait_for"));
    }

    #[tokio::test]
    async fn missing_library_degrades_instead_of_failing() {
        let (engine, log) = engine(Behaviour::default());
        let artifact = engine
            .render(&document(1), &CancelSignal::never(), |_| {})
            .await
            .expect("degraded render still succeeds");

        assert!(artifact.degraded);
        assert_eq!(artifact.diagrams_rendered, 0);
        let calls = calls(&log);
        assert!(!calls.iter().any(|call| call == "evaluate"));
        assert!(calls.iter().any(|call| call == "rasterize"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_library_download_degrades_after_library_timeout() {
        let (engine, log) = engine(Behaviour {
            library_available: true,
            library_delay: Some(Duration::from_secs(60)),
            ..Behaviour::default()
        });
        let started_at = Instant::now();

        let artifact = engine
            .render(&document(1), &CancelSignal::never(), |_| {})
            .await
            .expect("slow library only degrades the render");

        assert!(artifact.degraded);
        assert!(started_at.elapsed() < Duration::from_secs(30));
        assert_eq!(
            calls(&log),
            [
                "load:media,font",
                "inject_library",
                "wait_for",
                "measure:.diagram-container",
                "measure:iframe[data-role=\"mockup-frame\"]",
                "measure:img.mockup__image, img.inline-image",
                "rasterize",
                "close",
                "drop",
            ]
        );
    }

    #[tokio::test]
    async fn launch_failure_is_unavailable() {
        let (engine, _) = engine(Behaviour {
            launch_fails: true,
            ..Behaviour::default()
        });
        let err = engine
            .render(&document(0), &CancelSignal::never(), |_| {})
            .await
            .expect_err("launch fails");

        assert!(matches!(err, EngineError::Unavailable(_)));
        assert_eq!(err.code(), "render-engine-unavailable");
        assert!(!err.user_message().contains("os error"));
    }

    #[tokio::test]
    async fn load_failure_still_releases_target() {
        let (engine, log) = engine(Behaviour {
            load_fails: true,
            ..Behaviour::default()
        });
        let err = engine
            .render(&document(0), &CancelSignal::never(), |_| {})
            .await
            .expect_err("load fails");

        assert!(matches!(err, EngineError::LoadFailed(_)));
        assert_eq!(calls(&log), ["load:media,font", "close", "drop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_load_times_out_and_releases_target() {
        let (engine, log) = engine(Behaviour {
            load_hangs: true,
            ..Behaviour::default()
        });
        let err = engine
            .render(&document(0), &CancelSignal::never(), |_| {})
            .await
            .expect_err("load times out");

        assert!(matches!(err, EngineError::PageLoadTimeout(_)));
        assert_eq!(err.code(), "page-load-timeout");
        assert_eq!(calls(&log), ["load:media,font", "close", "drop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_between_steps_and_releases_target() {
        let (engine, log) = engine(Behaviour {
            load_hangs: true,
            ..Behaviour::default()
        });
        let (handle, signal) = cancel_pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        });

        let err = engine
            .render(&document(0), &signal, |_| {})
            .await
            .expect_err("render cancelled");

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(calls(&log), ["load:media,font", "close", "drop"]);
    }

    #[tokio::test]
    async fn collapsed_elements_are_left_unscaled() {
        let (engine, log) = engine(Behaviour {
            heights: vec![Some(0.0), Some(3000.0), Some(0.0)],
            ..Behaviour::default()
        });
        let artifact = engine
            .render(&document(0), &CancelSignal::never(), |_| {})
            .await
            .expect("render succeeds");

        assert_eq!(artifact.fitted_elements, 1);
        let styled: Vec<String> = calls(&log)
            .into_iter()
            .filter(|call| call.starts_with("set_style"))
            .collect();
        assert_eq!(styled, ["set_style:1:scale(0.4000)"]);
    }

    #[tokio::test]
    async fn measurement_failures_are_skipped() {
        let (engine, _) = engine(Behaviour {
            measure_fails: true,
            ..Behaviour::default()
        });
        let artifact = engine
            .render(&document(0), &CancelSignal::never(), |_| {})
            .await
            .expect("fit is best effort");
        assert_eq!(artifact.fitted_elements, 0);
    }
}
