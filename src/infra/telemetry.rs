use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::views::{
    METRIC_BATCH_FAILURE, METRIC_PROVIDER_FAILURE, METRIC_PROVIDER_REQUEST_MS,
    METRIC_THROTTLE_WAIT_MS,
};
use crate::cache::lock::METRIC_LOCK_POISON_RECOVERED;
use crate::cache::{METRIC_CACHE_ENTRIES, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so the `views` command can print JSON on stdout.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "View lookups answered from a fresh cache entry."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "View lookups that had to compute a count."
        );
        describe_gauge!(
            METRIC_CACHE_ENTRIES,
            Unit::Count,
            "Number of routes currently held in the view cache."
        );
        describe_counter!(
            METRIC_PROVIDER_FAILURE,
            Unit::Count,
            "Analytics provider calls that failed or timed out."
        );
        describe_counter!(
            METRIC_BATCH_FAILURE,
            Unit::Count,
            "Entries of a bulk lookup that were reported as zero after an error."
        );
        describe_histogram!(
            METRIC_PROVIDER_REQUEST_MS,
            Unit::Milliseconds,
            "Analytics provider request latency in milliseconds."
        );
        describe_histogram!(
            METRIC_THROTTLE_WAIT_MS,
            Unit::Milliseconds,
            "Time spent waiting for the provider request throttle."
        );
        describe_counter!(
            METRIC_LOCK_POISON_RECOVERED,
            Unit::Count,
            "Poisoned locks recovered after a panic."
        );
    });
}
