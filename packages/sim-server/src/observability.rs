// packages/sim-server/src/observability.rs
//! Logging and metrics setup
//!
//! Logging goes through `tracing`; `RUST_LOG` overrides the configured level.
//! Metrics are recorded through the `metrics` facade everywhere and only
//! exported when a Prometheus listen address is configured; without an
//! installed recorder the macros are no-ops.

use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{Result, ServerError};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ServerError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ServerError::Config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install the Prometheus exporter if a listen address is configured
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    let Some(addr) = config.listen_addr else {
        debug!("Metrics exporter disabled");
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ServerError::Config(format!("Failed to install metrics exporter: {}", e)))?;

    describe_metrics();
    info!("Prometheus metrics exported on {}", addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "sim_server_connections_total",
        "Connections accepted by the listener"
    );
    describe_counter!(
        "sim_server_requests_total",
        "Requests handled, labelled by outcome"
    );
    describe_counter!(
        "sim_server_engines_created_total",
        "Engine instances opened"
    );
    describe_counter!(
        "sim_server_engines_discarded_total",
        "Engine instances dropped after a failed simulation"
    );
    describe_gauge!(
        "sim_server_engine_pool_idle",
        "Engine instances waiting in the pool"
    );
    describe_histogram!(
        "sim_server_simulation_seconds",
        Unit::Seconds,
        "Wall time of successful simulations"
    );
}
