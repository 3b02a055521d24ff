//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::services::PartyService;
use crate::state::Config;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Rooms, membership and host authority.
    pub party: Arc<PartyService>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<Config>,
}

/// Binds the listener described by `config`.
pub async fn bind_listener(config: &Config) -> Result<TcpListener, ServerError> {
    let addr = config.bind_addr();
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves the API on an already-bound listener until `shutdown` is cancelled.
///
/// On shutdown all WebSocket connections are force-closed so each runs its
/// normal departure path before the server returns.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local_addr = listener.local_addr()?;
    log::info!("Server listening on http://{}", local_addr);

    let ws_manager = Arc::clone(&state.ws_manager);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            ws_manager.close_all();
        })
        .await?;
    Ok(())
}

/// Binds the configured address and serves until `shutdown` is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let listener = bind_listener(&state.config).await?;
    serve(listener, state, shutdown).await
}
