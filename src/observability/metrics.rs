//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_frames_total` (counter): frames relayed, by direction
//! - `relay_filter_decisions_total` (counter): verdicts by link, verdict, reason
//! - `relay_fanout_dropped_total` (counter): frames dropped on a full or closed link queue
//! - `relay_link_reconnects_total` (counter): reconnect cycles by link
//! - `relay_links_connected` (gauge): downstream links currently connected
//! - `relay_upstream_connected` (gauge): 1 while the upstream is attached
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder the
//!   calls are no-ops, so tests need no setup
//! - Prometheus exporter is opt-in via `observability.metrics-enabled`

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::filter::Verdict;

/// Direction of a relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Upstream to downstream links.
    FanOut,
    /// Downstream link to upstream.
    FanIn,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::FanOut => "fan_out",
            Direction::FanIn => "fan_in",
        }
    }
}

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_frame(direction: Direction) {
    counter!("relay_frames_total", "direction" => direction.as_str()).increment(1);
}

pub fn record_decision(link: &str, verdict: &Verdict) {
    let outcome = if verdict.is_pass() { "pass" } else { "reject" };
    counter!(
        "relay_filter_decisions_total",
        "link" => link.to_string(),
        "verdict" => outcome,
        "reason" => verdict.reason().label()
    )
    .increment(1);
}

pub fn record_fanout_dropped(link: &str) {
    counter!("relay_fanout_dropped_total", "link" => link.to_string()).increment(1);
}

pub fn record_reconnect(link: &str) {
    counter!("relay_link_reconnects_total", "link" => link.to_string()).increment(1);
}

pub fn link_connected() {
    gauge!("relay_links_connected").increment(1.0);
}

pub fn link_disconnected() {
    gauge!("relay_links_connected").decrement(1.0);
}

pub fn set_upstream_connected(connected: bool) {
    gauge!("relay_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}
