//! OneBot message filter relay library.

pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod link;
pub mod message;
pub mod observability;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::{Relay, Shutdown};
