//! listfeed: binary entrypoint
//! Boots the aggregator, its scheduler, and the Axum HTTP server.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use listfeed::api::{self, AppState};
use listfeed::ingest::{self, scheduler};
use listfeed::metrics::Metrics;
use listfeed::{Aggregator, Config, ServiceState};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    listfeed::init_tracing();

    let cfg = Arc::new(Config::load().context("loading configuration")?);
    info!(
        lists = ?cfg.list_ids,
        interval_minutes = cfg.update_interval_minutes,
        output_dir = %cfg.output_dir.display(),
        "configuration loaded"
    );
    if cfg.list_ids.is_empty() {
        tracing::warn!("LIST_IDS is empty; passes will publish nothing");
    }

    let metrics = match Metrics::install() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let source = ingest::build_source(&cfg);
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&cfg), source));
    if aggregator.start().await == ServiceState::Disabled {
        tracing::warn!("serving the last persisted feed only; POST /update will fail until re-authenticated");
    }

    let sched = scheduler::spawn_scheduler(
        Arc::clone(&aggregator),
        scheduler::SchedulerCfg::from_config(&cfg),
    );

    let mut state = AppState::new(Arc::clone(&aggregator));
    if let Some(m) = &metrics {
        state = state.with_metrics(m.handle.clone());
    }
    let app = api::router(state);

    let served = async {
        let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
            .await
            .with_context(|| format!("binding {}", cfg.bind_addr))?;
        info!(addr = %cfg.bind_addr, "listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("http server")
    }
    .await;

    // Runs on every exit path of the server, including a failed bind.
    sched.stop().await;
    aggregator.shutdown().await;
    info!("bye");
    served
}
