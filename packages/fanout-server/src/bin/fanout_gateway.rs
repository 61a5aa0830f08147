//! `fanout-gateway` binary: parse config, install tracing and metrics, serve.

use clap::Parser;
use fanout_server::observability::{init_metrics, init_tracing};
use fanout_server::{shutdown_signal, GatewayConfig, GatewayModule};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::parse();
    init_tracing(config.log_format, &config.log_level)?;
    if let Some(port) = config.metrics_port {
        init_metrics(port)?;
    }

    tracing::info!(
        endpoints = config.endpoints.len(),
        message_endpoints = config.message_endpoints.len(),
        fanout_timeout_ms = config.fanout_timeout_ms,
        cancel_losers = config.cancel_losers,
        "starting fan-out gateway"
    );

    let mut module = GatewayModule::new(config)?;
    module.start().await?;
    module.serve(shutdown_signal()).await
}
