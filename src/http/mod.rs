//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, 403 when an upstream is attached)
//!     → WebSocket upgrade (buffer sizes from config)
//!     → websocket.rs (socket → frame transport)
//!     → UpstreamHub::accept
//! ```

pub mod server;
pub mod websocket;

pub use server::HttpServer;
