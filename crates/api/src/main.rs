use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use rentdesk_api::app::{build_app, services::build_services};
use rentdesk_infra::config::AppConfig;
use rentdesk_infra::scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    rentdesk_observability::init(&config.logging.filter, config.logging.format);

    let services = Arc::new(
        build_services(&config)
            .await
            .context("failed to initialize storage")?,
    );

    let worker = if config.scheduler.enabled {
        Some(scheduler::spawn(
            services.scheduler.clone(),
            config.scheduler.run_on_startup,
        ))
    } else {
        info!("lifecycle scheduler disabled by configuration");
        None
    };

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;

    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
