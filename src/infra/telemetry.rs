use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
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
            "dispensa_lookup_hit_total",
            Unit::Count,
            "Total number of key lookups that returned an inline artifact."
        );
        describe_counter!(
            "dispensa_lookup_miss_total",
            Unit::Count,
            "Total number of key lookups that found no live artifact."
        );
        describe_counter!(
            "dispensa_store_put_total",
            Unit::Count,
            "Total number of new artifacts admitted into the content store."
        );
        describe_counter!(
            "dispensa_store_dedup_total",
            Unit::Count,
            "Total number of store requests collapsed onto an existing artifact."
        );
        describe_counter!(
            "dispensa_store_evict_total",
            Unit::Count,
            "Total number of artifacts evicted to reclaim capacity."
        );
        describe_counter!(
            "dispensa_integrity_mismatch_total",
            Unit::Count,
            "Total number of store requests whose declared digest disagreed with the content."
        );
        describe_counter!(
            "dispensa_dispatch_rejected_total",
            Unit::Count,
            "Total number of requests rejected because the concurrency ceiling was reached."
        );
        describe_counter!(
            "dispensa_dispatch_timeout_total",
            Unit::Count,
            "Total number of requests aborted at the per-request deadline."
        );
    });
}
