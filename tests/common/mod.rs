//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use onebot_filter::config::loader::parse_config;
use onebot_filter::link::{in_memory, DialTarget, Dialer, Frame, LinkState, Transport, TransportError, TransportPeer};
use onebot_filter::{Relay, RelayConfig};

pub const WAIT: Duration = Duration::from_secs(2);

/// Dialer handing the far end of every successful dial to the test.
pub struct MockDialer {
    failures: AtomicUsize,
    dials: AtomicUsize,
    peers: mpsc::UnboundedSender<(DialTarget, TransportPeer)>,
}

impl MockDialer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(DialTarget, TransportPeer)>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                failures: AtomicUsize::new(0),
                dials: AtomicUsize::new(0),
                peers,
            }),
            rx,
        )
    }

    /// Make the next `n` dials fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, target: &DialTarget) -> Result<Transport, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::InvalidRequest("connection refused".into()));
        }

        let (transport, peer) = in_memory(16);
        self.peers
            .send((target.clone(), peer))
            .map_err(|_| TransportError::Closed)?;
        Ok(transport)
    }
}

/// Parse a test configuration; server defaults are filled in.
pub fn config(bot_apps: &str) -> RelayConfig {
    parse_config(&format!(
        r#"
        [server]
        bot-id = "10001"
        sleep-time = 0.05
        queue-capacity = 16
        debug = true

        {}
        "#,
        bot_apps
    ))
    .unwrap()
}

pub fn relay(config: &RelayConfig) -> (Arc<Relay>, Arc<MockDialer>, mpsc::UnboundedReceiver<(DialTarget, TransportPeer)>) {
    let (dialer, peers) = MockDialer::new();
    let relay = Arc::new(Relay::new(&config.server, dialer.clone()));
    (relay, dialer, peers)
}

/// Attach an in-memory upstream to the relay.
pub fn attach_upstream(relay: &Relay) -> TransportPeer {
    let (transport, peer) = in_memory(16);
    relay.hub().accept(transport).unwrap();
    peer
}

pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<(DialTarget, TransportPeer)>) -> (DialTarget, TransportPeer) {
    timeout(WAIT, peers.recv()).await.expect("no dial in time").expect("dialer dropped")
}

pub async fn wait_for_state(state: &mut watch::Receiver<LinkState>, wanted: LinkState) {
    timeout(WAIT, state.wait_for(|s| *s == wanted))
        .await
        .expect("state not reached in time")
        .expect("link dropped");
}

pub async fn recv(peer: &mut TransportPeer) -> Frame {
    timeout(WAIT, peer.rx.recv()).await.expect("no frame in time").expect("transport closed")
}

/// Assert nothing arrives within a short window.
pub async fn assert_silent(peer: &mut TransportPeer) {
    if let Ok(Some(frame)) = timeout(Duration::from_millis(100), peer.rx.recv()).await {
        panic!("unexpected frame: {:?}", frame);
    }
}

pub fn json(frame: &Frame) -> serde_json::Value {
    serde_json::from_str(frame.as_text().expect("text frame")).unwrap()
}

pub fn private_message(user_id: i64, text: &str) -> Frame {
    Frame::Text(
        serde_json::json!({
            "post_type": "message",
            "message_type": "private",
            "message_format": "string",
            "user_id": user_id,
            "raw_message": text,
            "message": text,
        })
        .to_string(),
    )
}

pub fn group_message(group_id: i64, user_id: i64, text: &str) -> Frame {
    Frame::Text(
        serde_json::json!({
            "post_type": "message",
            "message_type": "group",
            "message_format": "array",
            "group_id": group_id,
            "user_id": user_id,
            "raw_message": text,
            "message": [{"type": "text", "data": {"text": text}}],
        })
        .to_string(),
    )
}

/// Poll `condition` until it holds.
pub async fn eventually(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
