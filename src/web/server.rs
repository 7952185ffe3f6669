//! Web server for the dashboard and the snapshot endpoint

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::future::Future;
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;

use super::ServerConfig;
use crate::{Error, Result, storage};

/// Shared application state
#[derive(Clone)]
struct AppState {
    snapshot_path: Arc<PathBuf>,
}

/// Build the router: `/data` plus static files from the public directory.
pub fn router(config: &ServerConfig) -> Router {
    let state = AppState {
        snapshot_path: Arc::new(config.snapshot_path.clone()),
    };

    Router::new()
        .route("/data", get(get_data))
        .fallback_service(ServeDir::new(&config.public_dir))
        .with_state(state)
}

/// Serve until `shutdown` completes.
pub async fn serve<F>(config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| {
            Error::Other(format!(
                "Failed to bind {}:{}: {}",
                config.host, config.port, e
            ))
        })?;
    let addr = listener.local_addr()?;

    tracing::info!(%addr, public_dir = %config.public_dir.display(), "dashboard server started");
    println!("Serving dashboard at http://{}", addr);

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("dashboard server stopped");
    Ok(())
}

/// Resolve on Ctrl+C, or on Enter when stdin is a terminal.
pub async fn shutdown_signal() {
    let enter_rx = if io::stdin().is_terminal() {
        println!("Press Enter or Ctrl+C to stop");
        let (enter_tx, enter_rx) = tokio::sync::oneshot::channel::<()>();
        // Detached so a pending read never holds up runtime shutdown.
        std::thread::spawn(move || {
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line).is_ok() {
                let _ = enter_tx.send(());
            }
        });
        Some(enter_rx)
    } else {
        println!("Press Ctrl+C to stop");
        None
    };

    let enter = async move {
        if let Some(rx) = enter_rx {
            if rx.await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    };

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = enter => {}
    }
    tracing::debug!("shutdown requested");
}

/// Return the latest snapshot, read from disk on each request.
async fn get_data(State(state): State<AppState>) -> Response {
    let path = Arc::clone(&state.snapshot_path);
    let result = tokio::task::spawn_blocking(move || storage::read_snapshot(&path)).await;

    match result {
        Ok(Ok(snapshot)) => Json(snapshot).into_response(),
        Ok(Err(Error::NotFound(msg))) => (StatusCode::NOT_FOUND, msg).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to read snapshot");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "snapshot reader task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
