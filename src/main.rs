// src/main.rs
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use liveness_probe::{
    config,
    engine::{ProbeEngine, Scheduler},
    metrics::MetricsRegistry,
    registry::Registry,
    server::{ServerBuilder, StatusHandler},
    state::{OutcomeUpdate, ProbeStatus},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("liveness_probe=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let registry = Registry::from_config(config.targets.clone());
    info!(
        "Loaded {} targets ({} probeable)",
        registry.len(),
        registry.pingable().len()
    );

    let metrics_registry = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new()?))
    } else {
        None
    };
    let metrics = metrics_registry.as_ref().map(|r| r.collector());

    let engine = Arc::new(ProbeEngine::from_config(
        config.probe.clone(),
        registry,
        metrics,
    ));

    // Render every outcome as it lands
    let mut updates = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => render(&update),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Status renderer lagged, {} updates skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let scheduler = Arc::new(Scheduler::new(engine.clone(), config.scheduler.clone()));
    let trigger = scheduler.trigger();
    tokio::spawn(scheduler.clone().start());

    let mut server_task = None;
    if config.server.enabled {
        let mut handler = StatusHandler::new(engine.table(), trigger);
        if let Some(registry) = &metrics_registry {
            handler = handler.with_metrics(registry.clone(), &config.metrics.path);
        }

        let server = ServerBuilder::new(config.server.listen)
            .with_handler(handler)
            .with_shutdown(scheduler.shutdown_receiver());
        server_task = Some(tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!("Status server error: {:#}", e);
            }
        }));
    }

    shutdown_signal().await;
    scheduler.shutdown();
    if let Some(task) = server_task {
        let _ = task.await;
    }

    Ok(())
}

fn render(update: &OutcomeUpdate) {
    match update.status {
        ProbeStatus::Online => info!(
            "[{}] {} online ({}, via {})",
            update.cycle, update.id, update.detail, update.method
        ),
        ProbeStatus::Offline | ProbeStatus::Error => warn!(
            "[{}] {} {} ({}, via {})",
            update.cycle, update.id, update.status, update.detail, update.method
        ),
        ProbeStatus::Pending | ProbeStatus::NotApplicable => {}
    }
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
