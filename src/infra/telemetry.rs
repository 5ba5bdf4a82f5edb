use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::export::{
    METRIC_EXPORT_COMPLETED, METRIC_EXPORT_DEGRADED, METRIC_EXPORT_DURATION_MS,
    METRIC_EXPORT_EVICTED, METRIC_EXPORT_FAILED, METRIC_EXPORT_IN_FLIGHT,
    METRIC_EXPORT_SUBMITTED,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber described by `logging`.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_EXPORT_SUBMITTED,
            Unit::Count,
            "Export jobs accepted for background processing."
        );
        describe_counter!(
            METRIC_EXPORT_COMPLETED,
            Unit::Count,
            "Export jobs that reached the completed stage."
        );
        describe_counter!(
            METRIC_EXPORT_FAILED,
            Unit::Count,
            "Export jobs that ended in the error stage, labelled by code."
        );
        describe_counter!(
            METRIC_EXPORT_DEGRADED,
            Unit::Count,
            "Completed exports whose diagrams were left unrendered."
        );
        describe_counter!(
            METRIC_EXPORT_EVICTED,
            Unit::Count,
            "Export records evicted after their retention window."
        );
        describe_gauge!(
            METRIC_EXPORT_IN_FLIGHT,
            Unit::Count,
            "Export jobs currently running."
        );
        describe_histogram!(
            METRIC_EXPORT_DURATION_MS,
            Unit::Milliseconds,
            "Wall-clock duration of export jobs in milliseconds."
        );
    });
}
