use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Project document export service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the export HTTP service.
    Serve(Box<ServeArgs>),
    /// Export one project record to a PDF file without starting the server.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Project export record in JSON.
    #[arg(value_name = "RECORD_JSON", value_hint = ValueHint::FilePath)]
    pub record: PathBuf,

    /// Where to write the PDF.
    #[arg(long, short, value_name = "PDF", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the program that runs the render driver.
    #[arg(long = "render-driver-program", value_name = "PATH")]
    pub driver_program: Option<PathBuf>,

    /// Override the page format (a4|letter).
    #[arg(long = "render-page-format", value_name = "FORMAT")]
    pub page_format: Option<String>,

    /// Override the smallest scale applied to oversized content.
    #[arg(long = "render-min-scale", value_name = "SCALE")]
    pub min_scale: Option<f64>,

    /// Override the overall export timeout.
    #[arg(long = "exports-job-timeout-seconds", value_name = "SECONDS")]
    pub job_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the directory holding `<project_id>.json` records.
    #[arg(long = "records-directory", value_name = "PATH")]
    pub records_directory: Option<PathBuf>,
}
