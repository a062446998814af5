//! Per-bot-app link supervisor.
//!
//! # State Machine
//! ```text
//! Dialing ──dial ok + registered──▶ Connected ──read/write error──▶ Closing
//!    ▲  │                                                             │
//!    │  └──dial failed / name taken──▶ sleep ◀────────────────────────┘
//!    └──────────────────────────────────┘
//!
//! any state ──shutdown──▶ Stopped
//! ```
//!
//! # Design Decisions
//! - Retries forever at a fixed interval, read fresh from `LinkSettings` each time
//! - Every attempt gets a new `LinkId`, queue and cancellation signal
//! - The filter handle is loaded per frame, so a reload applies to the next frame

use arc_swap::ArcSwap;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::schema::ServerConfig;
use crate::filter::{filter_text, FilterHandle, Reason, Verdict};
use crate::link::hub::UpstreamHub;
use crate::link::transport::{
    DialTarget, Dialer, Frame, FrameSink, FrameStream, LinkId, Transport, TransportError, CLOSE_TIMEOUT,
};
use crate::observability::metrics;

/// Observable link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Dialing,
    Connected,
    Closing,
    Stopped,
}

/// Runtime settings shared by every link, replaced on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub reconnect_interval: Duration,
    pub debug: bool,
    pub queue_capacity: usize,
}

impl LinkSettings {
    pub fn from_server(server: &ServerConfig) -> Self {
        Self {
            reconnect_interval: server.reconnect_interval(),
            debug: server.debug,
            queue_capacity: server.queue_capacity.max(1),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::from_server(&ServerConfig::default())
    }
}

/// How an attempt ended.
enum AttemptEnd {
    Dropped,
    Shutdown,
}

/// Reconnecting connection to one bot app.
pub struct DownstreamLink {
    target: DialTarget,
    filter: FilterHandle,
    hub: Arc<UpstreamHub>,
    dialer: Arc<dyn Dialer>,
    settings: Arc<ArcSwap<LinkSettings>>,
    state: watch::Sender<LinkState>,
}

impl DownstreamLink {
    pub fn new(
        target: DialTarget,
        filter: FilterHandle,
        hub: Arc<UpstreamHub>,
        dialer: Arc<dyn Dialer>,
        settings: Arc<ArcSwap<LinkSettings>>,
    ) -> Self {
        let (state, _) = watch::channel(LinkState::Dialing);
        Self {
            target,
            filter,
            hub,
            dialer,
            settings,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LinkState) {
        tracing::trace!(link = %self.target.name, state = ?state, "Link state");
        self.state.send_replace(state);
    }

    /// Run the dial/serve/reconnect loop until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            self.set_state(LinkState::Dialing);
            tracing::info!(link = %self.target.name, uri = %self.target.uri, "Connecting to bot app");

            let dialed = tokio::select! {
                result = self.dialer.dial(&self.target) => result,
                _ = shutdown.recv() => break,
            };

            let transport = match dialed {
                Ok(transport) => transport,
                Err(e) => {
                    tracing::warn!(link = %self.target.name, error = %e, "Failed to connect to bot app");
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            match self.attempt(transport, &mut shutdown).await {
                AttemptEnd::Shutdown => break,
                AttemptEnd::Dropped => {
                    metrics::record_reconnect(&self.target.name);
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(LinkState::Stopped);
        tracing::info!(link = %self.target.name, "Link stopped");
    }

    /// Sleep the reconnect interval. Returns true if shutdown arrived first.
    async fn pause(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let interval = self.settings.load().reconnect_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            _ = shutdown.recv() => true,
        }
    }

    async fn attempt(&self, mut transport: Transport, shutdown: &mut broadcast::Receiver<()>) -> AttemptEnd {
        let name = self.target.name.clone();
        let id = LinkId::new();
        let settings = self.settings.load_full();
        let (tx, rx) = mpsc::channel(settings.queue_capacity);

        if let Err(e) = self.hub.register(&name, id, tx) {
            tracing::warn!(link = %name, link_id = %id, error = %e, "Registration rejected, closing new connection");
            let _ = transport.sink.close().await;
            return AttemptEnd::Dropped;
        }

        self.set_state(LinkState::Connected);
        metrics::link_connected();
        let spec = self.filter.load_full();
        tracing::info!(link = %name, link_id = %id, filter = %spec, "Connected to bot app");

        let end = self.serve(id, transport, rx, shutdown).await;

        self.set_state(LinkState::Closing);
        self.hub.unregister(&name);
        metrics::link_disconnected();
        tracing::info!(link = %name, link_id = %id, "Disconnected from bot app");
        end
    }

    /// Run both pumps until one ends or shutdown arrives.
    async fn serve(
        &self,
        id: LinkId,
        transport: Transport,
        from_hub: mpsc::Receiver<Frame>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> AttemptEnd {
        let Transport { sink, stream } = transport;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut reader = tokio::spawn(read_pump(
            self.target.name.clone(),
            id,
            stream,
            Arc::clone(&self.hub),
            cancel_rx.clone(),
        ));
        let mut writer = tokio::spawn(write_pump(
            self.target.name.clone(),
            id,
            sink,
            from_hub,
            self.filter.clone(),
            Arc::clone(&self.settings),
            cancel_rx,
        ));

        let end = tokio::select! {
            _ = &mut reader => AttemptEnd::Dropped,
            _ = &mut writer => AttemptEnd::Dropped,
            _ = shutdown.recv() => AttemptEnd::Shutdown,
        };

        let _ = cancel_tx.send(true);
        if !reader.is_finished() {
            let _ = reader.await;
        }
        if !writer.is_finished() {
            let _ = writer.await;
        }
        end
    }
}

/// Bot app → upstream, unfiltered.
async fn read_pump(
    name: String,
    id: LinkId,
    mut stream: FrameStream,
    hub: Arc<UpstreamHub>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.changed() => return,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(frame)) => {
                tokio::select! {
                    _ = cancel.changed() => return,
                    result = hub.submit_upstream(frame) => {
                        if let Err(e) = result {
                            tracing::warn!(link = %name, link_id = %id, error = %e, "Dropping frame for upstream");
                        }
                    }
                }
            }
            Some(Err(TransportError::Closed)) | None => {
                tracing::info!(link = %name, link_id = %id, "Bot app closed the connection");
                return;
            }
            Some(Err(e)) => {
                tracing::warn!(link = %name, link_id = %id, error = %e, "Read from bot app failed");
                return;
            }
        }
    }
}

/// Hub → bot app, through the link's filter.
async fn write_pump(
    name: String,
    id: LinkId,
    mut sink: FrameSink,
    mut from_hub: mpsc::Receiver<Frame>,
    filter: FilterHandle,
    settings: Arc<ArcSwap<LinkSettings>>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.changed() => break,
            frame = from_hub.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        let Some(frame) = admit(&name, &filter, settings.load().debug, frame) else {
            continue;
        };
        tokio::select! {
            _ = cancel.changed() => break,
            result = sink.send(frame) => {
                if let Err(e) = result {
                    tracing::warn!(link = %name, link_id = %id, error = %e, "Write to bot app failed");
                    break;
                }
            }
        }
    }
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        tracing::debug!(link = %name, link_id = %id, "Bot app transport did not close in time, dropping it");
    }
}

/// Apply the link's current filter to one frame. `None` means rejected.
pub fn admit(name: &str, filter: &FilterHandle, debug: bool, frame: Frame) -> Option<Frame> {
    let text = match frame {
        Frame::Text(text) => text,
        binary => return Some(binary),
    };

    let spec = filter.load();
    let verdict = filter_text(&spec, &text);
    metrics::record_decision(name, &verdict);
    log_verdict(name, debug, &verdict);

    match verdict {
        Verdict::Pass {
            rewritten: Some(rewritten),
            ..
        } => Some(Frame::Text(rewritten)),
        Verdict::Pass { .. } => Some(Frame::Text(text)),
        Verdict::Reject { .. } => None,
    }
}

fn log_verdict(name: &str, debug: bool, verdict: &Verdict) {
    let outcome = if verdict.is_pass() { "pass" } else { "reject" };
    if *verdict.reason() == Reason::NotFiltered {
        tracing::trace!(link = %name, verdict = outcome, "Relaying event unfiltered");
    } else if debug {
        tracing::info!(link = %name, verdict = outcome, reason = %verdict.reason(), "Filter decision");
    } else {
        tracing::debug!(link = %name, verdict = outcome, reason = %verdict.reason(), "Filter decision");
    }
}
