//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the upstream upgrade route
//! - Reject a second upstream with 403 while one is attached
//! - Wire up middleware (tracing)
//! - Serve until shutdown

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::schema::ServerConfig;
use crate::http::websocket::from_socket;
use crate::link::hub::{HubError, UpstreamHub};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<UpstreamHub>,
    pub buffer_size: usize,
}

/// Upstream accept server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(server: &ServerConfig, hub: Arc<UpstreamHub>) -> Self {
        let state = AppState {
            hub,
            buffer_size: server.buffer_size,
        };
        Self {
            router: Self::build_router(&server.suffix, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(suffix: &str, state: AppState) -> Router {
        Router::new()
            .route(suffix, any(upstream_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Upgrade the gateway connection and hand it to the hub.
async fn upstream_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.hub.is_connected() {
        tracing::warn!("Rejecting upstream connection, one is already attached");
        return (StatusCode::FORBIDDEN, "upstream already connected").into_response();
    }

    ws.read_buffer_size(state.buffer_size)
        .write_buffer_size(state.buffer_size)
        .on_upgrade(move |socket| async move {
            match state.hub.accept(from_socket(socket)) {
                Ok(task) => {
                    let _ = task.await;
                }
                Err(HubError::AlreadyConnected) => {
                    tracing::warn!("Upstream attached concurrently, dropping upgraded socket");
                }
                Err(e) => tracing::error!(error = %e, "Failed to attach upstream"),
            }
        })
}
