use std::{process, sync::Arc, time::Duration};

use folio::{
    application::{
        document::{AssemblyOptions, MOCKUP_FRAME_HEIGHT_PX},
        engine::{EngineSettings, FitPolicy, PageOptions, RenderEngine},
        error::AppError,
        export::{ExportService, ExportSettings, InMemoryProgressStore, TakeResult},
        repos::{OwnershipPolicy, ProjectSource},
    },
    config,
    domain::{project::ProjectExportRecord, types::ExportStage},
    infra::{
        browser::{DriverLauncher, DriverSettings},
        error::InfraError,
        http::{self, ApiState},
        records::{FsProjectSource, InMemoryProjectSource},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

/// Caller recorded for exports started from the command line.
const CLI_CALLER: &str = "cli";
const CLI_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let records = Arc::new(FsProjectSource::new(settings.records.directory.clone()));
    let exports = build_export_service(&settings, records.clone(), records);

    let sweeper = {
        let exports = exports.clone();
        let interval = settings.exports.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = exports.sweep_expired().await {
                    warn!(
                        target = "folio::sweeper",
                        op = "export::sweep",
                        result = "error",
                        error = %err,
                        "Retention sweep failed"
                    );
                }
            }
        })
    };

    let router = http::build_router(ApiState::new(exports));
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "folio::server",
        addr = %settings.server.addr,
        records = %settings.records.directory.display(),
        "Export service listening"
    );

    let result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    sweeper.abort();
    let _ = sweeper.await;
    result
}

/// One export through the same submit, poll and take-result cycle a remote
/// client uses.
async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let raw = tokio::fs::read_to_string(&args.record)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let record: ProjectExportRecord = serde_json::from_str(&raw).map_err(|err| {
        AppError::validation(format!("{} is not a project record: {err}", args.record.display()))
    })?;
    let project_id = record.project.id.clone();

    let records = Arc::new(InMemoryProjectSource::new());
    records.insert(record);
    let exports = build_export_service(&settings, records.clone(), records);

    let job_id = exports
        .submit(CLI_CALLER, &project_id)
        .await
        .map_err(|err| AppError::export(err.to_string()))?;

    let mut last_progress = None;
    let status = loop {
        let status = exports
            .status(job_id)
            .await
            .map_err(|err| AppError::export(err.to_string()))?
            .ok_or_else(|| AppError::unexpected("export record vanished while polling"))?;
        if last_progress != Some(status.progress) {
            info!(
                target = "folio::render",
                job_id = %job_id,
                progress = status.progress,
                stage = status.stage.as_str(),
                "{}",
                status.message
            );
            last_progress = Some(status.progress);
        }
        if status.download_ready || status.stage.is_terminal() {
            break status;
        }
        tokio::time::sleep(CLI_POLL_INTERVAL).await;
    };

    if status.stage == ExportStage::Error {
        return Err(AppError::export(status.message));
    }

    let artifact = match exports
        .take_result(job_id)
        .await
        .map_err(|err| AppError::export(err.to_string()))?
    {
        TakeResult::Ready(artifact) => artifact,
        TakeResult::NotReady(stage) => {
            return Err(AppError::unexpected(format!(
                "export reported ready but is {}",
                stage.as_str()
            )));
        }
        TakeResult::NotFound => return Err(AppError::unexpected("export record was evicted")),
    };

    tokio::fs::write(&args.output, &artifact.bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "folio::render",
        job_id = %job_id,
        output = %args.output.display(),
        bytes = artifact.bytes.len(),
        suggested_name = %artifact.filename,
        "Export written"
    );
    Ok(())
}

fn build_export_service(
    settings: &config::Settings,
    source: Arc<dyn ProjectSource>,
    ownership: Arc<dyn OwnershipPolicy>,
) -> ExportService {
    let render = &settings.render;
    let launcher = DriverLauncher::new(DriverSettings {
        program: render.driver_program.clone(),
        args: render.driver_args.clone(),
        startup_timeout: render.driver_startup_timeout,
        command_timeout: render.driver_command_timeout,
    });
    let engine = RenderEngine::new(
        Arc::new(launcher),
        EngineSettings {
            load_timeout: render.load_timeout,
            library_timeout: render.library_timeout,
            blocked_resource_types: render.blocked_resource_types.clone(),
            diagram_script_url: render.diagram_script_url.clone(),
            page: PageOptions {
                format: render.page_format,
                margin_mm: render.margin_mm,
                print_background: true,
            },
            fit: FitPolicy::for_page(
                render.page_format,
                render.margin_mm,
                render.min_scale,
                f64::from(MOCKUP_FRAME_HEIGHT_PX),
            ),
        },
    );

    ExportService::new(
        Arc::new(InMemoryProgressStore::new(settings.exports.retention)),
        source,
        ownership,
        engine,
        AssemblyOptions {
            diagram_script_url: render.diagram_script_url.clone(),
        },
        ExportSettings {
            job_timeout: settings.exports.job_timeout,
            download_grace: settings.exports.download_grace,
        },
    )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "folio::server",
            error = %err,
            "Failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(target = "folio::server", "Shutdown signal received");
}
