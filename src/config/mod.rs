//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::engine::PageFormat;

pub use self::cli::{CliArgs, Command, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_RECORDS_DIR: &str = "records";
const DEFAULT_DRIVER_PROGRAM: &str = "node";
const DEFAULT_DRIVER_SCRIPT: &str = "assets/render-driver.mjs";
const DEFAULT_DRIVER_STARTUP_SECS: u64 = 10;
const DEFAULT_DRIVER_COMMAND_SECS: u64 = 30;
const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LIBRARY_TIMEOUT_SECS: u64 = 10;
pub(crate) const DEFAULT_DIAGRAM_SCRIPT_URL: &str =
    "https://cdn.jsdelivr.net/npm/mermaid@10.9.1/dist/mermaid.min.js";
const DEFAULT_MARGIN_MM: f64 = 15.0;
const DEFAULT_MIN_SCALE: f64 = 0.4;
const DEFAULT_BLOCKED_RESOURCE_TYPES: &[&str] = &["media", "font"];
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETENTION_SECS: u64 = 600;
const DEFAULT_DOWNLOAD_GRACE_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub records: RecordsSettings,
    pub render: RenderSettings,
    pub exports: ExportsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RecordsSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub driver_program: PathBuf,
    pub driver_args: Vec<String>,
    pub driver_startup_timeout: Duration,
    pub driver_command_timeout: Duration,
    pub load_timeout: Duration,
    pub library_timeout: Duration,
    pub diagram_script_url: String,
    pub page_format: PageFormat,
    pub margin_mm: f64,
    /// In `(0, 1]`.
    pub min_scale: f64,
    pub blocked_resource_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExportsSettings {
    pub job_timeout: Duration,
    pub retention: Duration,
    pub download_grace: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("render.driver_args")
            .with_list_parse_key("render.blocked_resource_types")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    records: RawRecordsSettings,
    render: RawRenderSettings,
    exports: RawExportsSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRecordsSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    driver_program: Option<PathBuf>,
    driver_args: Option<Vec<String>>,
    driver_startup_timeout_seconds: Option<u64>,
    driver_command_timeout_seconds: Option<u64>,
    load_timeout_seconds: Option<u64>,
    library_timeout_seconds: Option<u64>,
    diagram_script_url: Option<String>,
    page_format: Option<String>,
    margin_mm: Option<f64>,
    min_scale: Option<f64>,
    blocked_resource_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportsSettings {
    job_timeout_seconds: Option<u64>,
    retention_seconds: Option<u64>,
    download_grace_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = overrides.records_directory.as_ref() {
            self.records.directory = Some(directory.clone());
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(program) = overrides.driver_program.as_ref() {
            self.render.driver_program = Some(program.clone());
        }
        if let Some(format) = overrides.page_format.as_ref() {
            self.render.page_format = Some(format.clone());
        }
        if let Some(scale) = overrides.min_scale {
            self.render.min_scale = Some(scale);
        }
        if let Some(seconds) = overrides.job_timeout_seconds {
            self.exports.job_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            records,
            render,
            exports,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            records: build_records_settings(records)?,
            render: build_render_settings(render)?,
            exports: build_exports_settings(exports)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_records_settings(records: RawRecordsSettings) -> Result<RecordsSettings, LoadError> {
    let directory = records
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "records.directory",
            "path must not be empty",
        ));
    }
    Ok(RecordsSettings { directory })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let driver_program = render
        .driver_program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DRIVER_PROGRAM));
    if driver_program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.driver_program",
            "path must not be empty",
        ));
    }
    let driver_args = render
        .driver_args
        .unwrap_or_else(|| vec![DEFAULT_DRIVER_SCRIPT.to_string()]);

    let diagram_script_url = render
        .diagram_script_url
        .unwrap_or_else(|| DEFAULT_DIAGRAM_SCRIPT_URL.to_string());
    let parsed = Url::parse(&diagram_script_url).map_err(|err| {
        LoadError::invalid("render.diagram_script_url", format!("invalid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "render.diagram_script_url",
            "must be an http(s) URL",
        ));
    }

    let page_format = match render.page_format.as_deref().map(str::trim) {
        None => PageFormat::A4,
        Some(value) if value.eq_ignore_ascii_case("a4") => PageFormat::A4,
        Some(value) if value.eq_ignore_ascii_case("letter") => PageFormat::Letter,
        Some(other) => {
            return Err(LoadError::invalid(
                "render.page_format",
                format!("expected `a4` or `letter`, got `{other}`"),
            ));
        }
    };

    let margin_mm = render.margin_mm.unwrap_or(DEFAULT_MARGIN_MM);
    let (_, page_height_mm) = page_format.size_mm();
    if !margin_mm.is_finite() || margin_mm < 0.0 || margin_mm * 2.0 >= page_height_mm {
        return Err(LoadError::invalid(
            "render.margin_mm",
            "must be non-negative and leave room for content",
        ));
    }

    let min_scale = render.min_scale.unwrap_or(DEFAULT_MIN_SCALE);
    if !(min_scale > 0.0 && min_scale <= 1.0) {
        return Err(LoadError::invalid(
            "render.min_scale",
            "must be within (0, 1]",
        ));
    }

    let blocked_resource_types = render.blocked_resource_types.unwrap_or_else(|| {
        DEFAULT_BLOCKED_RESOURCE_TYPES
            .iter()
            .map(|kind| kind.to_string())
            .collect()
    });

    Ok(RenderSettings {
        driver_program,
        driver_args,
        driver_startup_timeout: seconds(
            render.driver_startup_timeout_seconds,
            DEFAULT_DRIVER_STARTUP_SECS,
            "render.driver_startup_timeout_seconds",
        )?,
        driver_command_timeout: seconds(
            render.driver_command_timeout_seconds,
            DEFAULT_DRIVER_COMMAND_SECS,
            "render.driver_command_timeout_seconds",
        )?,
        load_timeout: seconds(
            render.load_timeout_seconds,
            DEFAULT_LOAD_TIMEOUT_SECS,
            "render.load_timeout_seconds",
        )?,
        library_timeout: seconds(
            render.library_timeout_seconds,
            DEFAULT_LIBRARY_TIMEOUT_SECS,
            "render.library_timeout_seconds",
        )?,
        diagram_script_url,
        page_format,
        margin_mm,
        min_scale,
        blocked_resource_types,
    })
}

fn build_exports_settings(exports: RawExportsSettings) -> Result<ExportsSettings, LoadError> {
    let settings = ExportsSettings {
        job_timeout: seconds(
            exports.job_timeout_seconds,
            DEFAULT_JOB_TIMEOUT_SECS,
            "exports.job_timeout_seconds",
        )?,
        retention: seconds(
            exports.retention_seconds,
            DEFAULT_RETENTION_SECS,
            "exports.retention_seconds",
        )?,
        download_grace: seconds(
            exports.download_grace_seconds,
            DEFAULT_DOWNLOAD_GRACE_SECS,
            "exports.download_grace_seconds",
        )?,
        sweep_interval: seconds(
            exports.sweep_interval_seconds,
            DEFAULT_SWEEP_INTERVAL_SECS,
            "exports.sweep_interval_seconds",
        )?,
    };

    if settings.download_grace > settings.retention {
        return Err(LoadError::invalid(
            "exports.download_grace_seconds",
            "must not exceed exports.retention_seconds",
        ));
    }
    Ok(settings)
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn seconds(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}
