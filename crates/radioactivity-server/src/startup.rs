//! Server startup helper for embedding in the engine binary.
//!
//! [`spawn_server`] binds the listener eagerly, so a bad address or a port
//! in use fails startup, then serves on a background Tokio task.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError, bind, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the HTTP server and run it on a background Tokio task.
///
/// The task ends once `shutdown` turns `true` and in-flight requests
/// have completed. Await the returned handle to wait for that.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the listener cannot bind.
pub async fn spawn_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "HTTP server exited with error");
        }
    });

    tracing::info!(host = %config.host, port = config.port, "HTTP server spawned on background task");

    Ok(handle)
}
