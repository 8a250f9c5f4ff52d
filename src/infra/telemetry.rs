use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Dependencies that are chatty at `info`; `RUST_LOG` still overrides them.
const QUIET_DEPENDENCIES: [&str; 3] = ["sqlx=warn", "reqwest=warn", "hyper_util=warn"];

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for directive in QUIET_DEPENDENCIES {
            let parsed: Directive = directive.parse().map_err(|err| {
                InfraError::telemetry(format!("bad directive `{directive}`: {err}"))
            })?;
            env_filter = env_filter.add_directive(parsed);
        }
    }

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
            "happylife_query_cache_hit_total",
            Unit::Count,
            "Total number of query reads served from a fresh cache entry."
        );
        describe_counter!(
            "happylife_query_cache_miss_total",
            Unit::Count,
            "Total number of query reads that needed a fetch."
        );
        describe_counter!(
            "happylife_query_cache_evict_total",
            Unit::Count,
            "Total number of unobserved entries evicted due to capacity."
        );
        describe_counter!(
            "happylife_query_cache_fetch_total",
            Unit::Count,
            "Total number of fetches started by the query cache."
        );
        describe_counter!(
            "happylife_query_cache_retry_total",
            Unit::Count,
            "Total number of automatic fetch retries."
        );
        describe_histogram!(
            "happylife_query_cache_fetch_ms",
            Unit::Milliseconds,
            "Fetch latency including retries, in milliseconds."
        );
        describe_gauge!(
            "happylife_realtime_active_channels",
            Unit::Count,
            "Realtime channels currently open in this process."
        );
        describe_counter!(
            "happylife_realtime_invalidation_total",
            Unit::Count,
            "Total number of change notices forwarded to the query cache."
        );
        describe_counter!(
            "happylife_mutation_total",
            Unit::Count,
            "Total number of admin and contact mutations, by collection and outcome."
        );
    });
}
