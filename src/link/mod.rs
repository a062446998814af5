//! Link layer: the upstream hub and downstream link supervisors.
//!
//! # Data Flow
//! ```text
//! upstream transport ──read──▶ UpstreamHub::fan_out ──try_send──▶ link queue (one per link)
//!                                                                    │
//!                                      write_pump: filter, rewrite ◀─┘──▶ bot app transport
//!
//! bot app transport ──read_pump──▶ UpstreamHub::submit_upstream ──▶ upstream writer ──▶ upstream
//! ```

pub mod downstream;
pub mod hub;
pub mod transport;

pub use downstream::{DownstreamLink, LinkSettings, LinkState};
pub use hub::{HubError, UpstreamHub};
pub use transport::{in_memory, DialTarget, Dialer, Frame, LinkId, Transport, TransportError, TransportPeer, WsDialer};
