//! HTTP front-end (axum)

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult};
pub use handlers::{HealthResponse, StatusResponse, BRIDGE_VERSION};

use std::path::PathBuf;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Staging directory for uploads
    pub temp_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, temp_dir: PathBuf) -> Self {
        Self {
            dispatcher,
            temp_dir,
            started_at: Utc::now(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/process", post(handlers::process))
        .route(
            "/process/upload",
            post(handlers::process_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/restart-acestep", post(handlers::restart))
        .with_state(state)
}

/// Serve HTTP until Ctrl-C or SIGTERM, then stop the engine.
pub async fn run(config: &BridgeConfig, dispatcher: Dispatcher) -> Result<()> {
    let supervisor = dispatcher.supervisor().clone();
    if supervisor.auto_start() {
        let warmup = supervisor.clone();
        tokio::spawn(async move {
            if !warmup.ensure_running().await {
                tracing::warn!("ACE-Step not available yet; will retry on the first request");
            }
        });
    }

    let app = create_router(AppState::new(dispatcher, config.temp_dir.clone()));

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, upstream = %config.upstream_url, "Nueva bridge listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Nueva bridge shutting down");
    supervisor.stop().await;
    served?;
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
