//! tablesize-exporter
//!
//! - Scrape endpoint: GET /metrics (plus /healthz, /readyz, /status)
//! - Background refresh of `information_schema.TABLES` sizes
//! - Exit 0 on SIGINT/SIGTERM, 1 if the listener fails, 2 on bad config

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use tablesize_core::error::{ErrorKind, ExporterError, Result};
use tablesize_exporter::config::{self, ExporterConfig};
use tablesize_exporter::obs::ExporterMetrics;
use tablesize_exporter::refresh::Refresher;
use tablesize_exporter::source::MySqlSource;
use tablesize_exporter::{app_state, router};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let result = match config::load() {
        Ok(cfg) => run(cfg).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind().as_str(), error = %e, "tablesize-exporter exiting");
            match e.kind() {
                ErrorKind::Config => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

async fn run(cfg: ExporterConfig) -> Result<()> {
    let listen: SocketAddr = cfg
        .exporter
        .listen
        .parse()
        .map_err(|e| ExporterError::Config(format!("exporter.listen: {e}")))?;

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ExporterError::ListenerBind(format!("{listen}: {e}")))?;

    let metrics = Arc::new(ExporterMetrics::new());
    let refresher = Refresher::new(
        Arc::new(MySqlSource::new(&cfg.database)),
        Arc::clone(&metrics),
        Duration::from_millis(cfg.exporter.interval_ms),
        cfg.exporter.stale_policy,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_task = tokio::spawn(refresher.run_forever(shutdown_rx));

    let app = router::build_router(app_state::AppState::new(cfg, Arc::clone(&metrics)));

    tracing::info!(%listen, "tablesize-exporter starting; scrape at /metrics");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&metrics), shutdown_tx))
        .await;

    if let Err(e) = refresh_task.await {
        tracing::warn!(error = %e, "refresh task ended abnormally");
    }

    served.map_err(|e| ExporterError::Internal(format!("server failed: {e}")))
}

async fn shutdown_signal(metrics: Arc<ExporterMetrics>, shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown requested; draining");
    metrics.set_draining();
    let _ = shutdown_tx.send(true);
}
