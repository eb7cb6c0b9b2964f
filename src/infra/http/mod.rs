pub mod error;
pub mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::{ListenAddr, ServerSettings};
use crate::dispatch::Dispatcher;

use super::error::InfraError;
use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<Dispatcher>,
}

/// Build the full HTTP surface: RPC routes plus the admin/inspection
/// routes, wrapped in the shared request-id and logging middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rpc/v1/get-value", post(handlers::get_value))
        .route("/rpc/v1/save", post(handlers::save))
        .route("/rpc/v1/put-value", post(handlers::put_value))
        .route("/rpc/v1/load", post(handlers::load))
        .route("/healthz", get(handlers::healthz))
        .route("/admin/v1/stats", get(handlers::stats))
        .route("/admin/v1/artifacts/{cas_id}", get(handlers::artifact_info))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

/// Serve the router on the configured listener until a shutdown signal
/// arrives, then drain within the configured grace period.
pub async fn serve(settings: &ServerSettings, router: Router) -> Result<(), InfraError> {
    let draining = Arc::new(Notify::new());
    let drain_started = draining.clone();
    let shutdown = async move {
        wait_for_shutdown_signal().await;
        drain_started.notify_waiters();
    };

    let drain_deadline = settings.graceful_shutdown;
    let drain_watchdog = async move {
        draining.notified().await;
        tokio::time::sleep(drain_deadline).await;
    };

    match &settings.listen {
        ListenAddr::Tcp(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(
                target = "dispensa::http",
                addr = %addr,
                "Listening on TCP"
            );
            let server = axum::serve(listener, router).with_graceful_shutdown(shutdown);
            tokio::select! {
                result = server => result?,
                _ = drain_watchdog => {
                    warn!(target = "dispensa::http", "Drain deadline exceeded; aborting open connections");
                }
            }
        }
        ListenAddr::Unix(path) => {
            // A stale socket file from a previous run would fail the bind.
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(InfraError::Io(err)),
            }
            let listener = tokio::net::UnixListener::bind(path)?;
            info!(
                target = "dispensa::http",
                path = %path.display(),
                "Listening on Unix domain socket"
            );
            let server = axum::serve(listener, router).with_graceful_shutdown(shutdown);
            tokio::select! {
                result = server => result?,
                _ = drain_watchdog => {
                    warn!(target = "dispensa::http", "Drain deadline exceeded; aborting open connections");
                }
            }
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(
                    target = "dispensa::http",
                    error = %err,
                    "Failed to install SIGTERM handler"
                );
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
}
