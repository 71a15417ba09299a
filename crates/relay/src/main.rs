//! Outbox relay entry point.

use std::process::ExitCode;

use metrics_exporter_prometheus::PrometheusBuilder;
use relay::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    relay::init_tracing(&config);

    // 2. Expose Prometheus metrics when an address is configured
    if let Some(addr) = config.metrics_addr {
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => tracing::info!(%addr, "serving Prometheus metrics"),
            Err(err) => tracing::warn!(error = %err, "failed to install Prometheus exporter"),
        }
    }

    // 3. Relay until the budget is spent or a signal arrives
    tracing::info!(daemon = config.is_daemon(), domain = %config.domain, "starting outbox relay");
    match relay::run(&config, relay::shutdown_signal()).await {
        Ok(summary) => {
            tracing::info!(
                iterations = summary.iterations,
                total_processed = summary.total_processed,
                "outbox relay shut down"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "outbox relay failed");
            ExitCode::FAILURE
        }
    }
}
