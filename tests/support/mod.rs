//! Shared fixtures: a scripted render target and export service wiring.
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio::application::document::AssemblyOptions;
use folio::application::engine::{
    EngineSettings, FitPolicy, LoadOptions, PageFormat, PageOptions, RenderEngine, RenderTarget,
    TargetError, TargetLauncher, WaitCondition,
};
use folio::application::export::{ExportService, ExportSettings, InMemoryProgressStore};
use folio::application::repos::{OwnershipPolicy, ProjectSource};
use folio::domain::project::{Project, ProjectExportRecord, Requirement};
use folio_api_types::ExportStatus;
use serde_json::{Value, json};
use uuid::Uuid;

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n% folio test artifact\n%%EOF\n";
pub const DIAGRAM_SCRIPT_URL: &str = "https://cdn.example.com/mermaid.min.js";

#[derive(Debug, Clone, Default)]
pub enum LoadBehaviour {
    #[default]
    Ready,
    Delay(Duration),
    Hang,
}

/// Scripted browser. Every launched target shares the recorders below.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub launch_error: Option<String>,
    pub load: LoadBehaviour,
    pub library_available: bool,
    /// How long the diagram library takes to show up once requested.
    pub library_delay: Option<Duration>,
    /// Heights reported for every diagram container, in document order.
    pub diagram_heights: Vec<Option<f64>>,
    pub loaded_html: Arc<Mutex<Vec<String>>>,
    pub styles: Arc<Mutex<Vec<(String, usize, Vec<(String, String)>)>>>,
    pub launched: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn working() -> Self {
        Self {
            library_available: true,
            ..Self::default()
        }
    }

    pub fn last_html(&self) -> String {
        self.loaded_html
            .lock()
            .expect("html log")
            .last()
            .cloned()
            .expect("a document was loaded")
    }

    pub fn applied_styles(&self) -> Vec<(String, usize, Vec<(String, String)>)> {
        self.styles.lock().expect("style log").clone()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct FakeTarget {
    browser: FakeBrowser,
    html: String,
}

impl Drop for FakeTarget {
    fn drop(&mut self) {
        self.browser.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderTarget for FakeTarget {
    async fn load(&mut self, html: &str, _options: &LoadOptions) -> Result<(), TargetError> {
        self.browser
            .loaded_html
            .lock()
            .expect("html log")
            .push(html.to_string());
        self.html = html.to_string();
        match &self.browser.load {
            LoadBehaviour::Ready => {}
            LoadBehaviour::Delay(delay) => tokio::time::sleep(*delay).await,
            LoadBehaviour::Hang => std::future::pending::<()>().await,
        }
        Ok(())
    }

    async fn wait_for(
        &mut self,
        _condition: &WaitCondition,
        _timeout: Duration,
    ) -> Result<bool, TargetError> {
        let delay = self.browser.library_delay.unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;
        Ok(self.browser.library_available)
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, TargetError> {
        if script.contains("folio:diagram-script") {
            return Ok(json!(self.html.contains("name=\"folio:diagram-script\"")));
        }
        Ok(json!(self.html.matches("data-role=\"diagram\"").count()))
    }

    async fn measure(&mut self, selector: &str) -> Result<Vec<Option<f64>>, TargetError> {
        if selector == ".diagram-container" {
            Ok(self.browser.diagram_heights.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn set_style(
        &mut self,
        selector: &str,
        index: usize,
        styles: &[(String, String)],
    ) -> Result<(), TargetError> {
        self.browser.styles.lock().expect("style log").push((
            selector.to_string(),
            index,
            styles.to_vec(),
        ));
        Ok(())
    }

    async fn rasterize(&mut self, _options: &PageOptions) -> Result<Bytes, TargetError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Bytes::from_static(FAKE_PDF))
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        Ok(())
    }
}

#[async_trait]
impl TargetLauncher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn RenderTarget>, TargetError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Some(message) = &self.launch_error {
            return Err(TargetError::Launch(message.clone()));
        }
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTarget {
            browser: self.clone(),
            html: String::new(),
        }))
    }
}

pub fn export_settings() -> ExportSettings {
    ExportSettings {
        job_timeout: Duration::from_secs(30),
        download_grace: Duration::from_secs(5),
    }
}

pub fn fit_policy() -> FitPolicy {
    FitPolicy::for_page(PageFormat::A4, 15.0, 0.4, 1200.0)
}

pub fn export_service(
    browser: &FakeBrowser,
    source: Arc<dyn ProjectSource>,
    ownership: Arc<dyn OwnershipPolicy>,
    settings: ExportSettings,
) -> ExportService {
    let engine = RenderEngine::new(
        Arc::new(browser.clone()),
        EngineSettings {
            load_timeout: Duration::from_secs(10),
            library_timeout: Duration::from_secs(2),
            blocked_resource_types: vec!["media".to_string(), "font".to_string()],
            diagram_script_url: DIAGRAM_SCRIPT_URL.to_string(),
            page: PageOptions {
                format: PageFormat::A4,
                margin_mm: 15.0,
                print_background: true,
            },
            fit: fit_policy(),
        },
    );
    ExportService::new(
        Arc::new(InMemoryProgressStore::new(Duration::from_secs(600))),
        source,
        ownership,
        engine,
        AssemblyOptions {
            diagram_script_url: DIAGRAM_SCRIPT_URL.to_string(),
        },
        settings,
    )
}

/// Poll until the job turns terminal, returning every distinct snapshot.
pub async fn poll_until_terminal(service: &ExportService, job_id: Uuid) -> Vec<ExportStatus> {
    let mut seen: Vec<ExportStatus> = Vec::new();
    for _ in 0..10_000 {
        let status = service
            .status(job_id)
            .await
            .expect("store available")
            .expect("job visible while running");
        if seen.last() != Some(&status) {
            seen.push(status.clone());
        }
        if status.stage.is_terminal() {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("job {job_id} never reached a terminal stage: {seen:?}");
}

pub fn project(id: &str, name: &str, owner: &str) -> Project {
    Project {
        id: id.to_string(),
        name: name.to_string(),
        description: Some("Customer relationship tooling".to_string()),
        owner_id: owner.to_string(),
    }
}

pub fn requirement(title: &str) -> Requirement {
    Requirement {
        title: title.to_string(),
        description: format!("{title} must be **supported**."),
        priority: Some("high".to_string()),
        category: None,
    }
}

pub fn bare_record(id: &str) -> ProjectExportRecord {
    ProjectExportRecord::bare(project(id, "Atlas CRM", "alice"))
}
