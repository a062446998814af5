//! The single upstream connection and the set of registered downstream links.
//!
//! # Responsibilities
//! - Hold at most one upstream transport
//! - Fan every upstream frame out to each registered link's queue
//! - Serialize link frames into the upstream transport (fan-in)
//!
//! # Design Decisions
//! - Fan-out never waits: a full or closed link queue drops the frame for that
//!   link only, so one slow bot app cannot stall the others
//! - Fan-in waits on the bounded upstream queue, preserving per-link order

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::link::transport::{Frame, LinkId, Transport, TransportError, CLOSE_TIMEOUT};
use crate::observability::metrics::{self, Direction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("an upstream connection is already attached")]
    AlreadyConnected,

    #[error("link {0} is already registered")]
    DuplicateLink(String),

    #[error("no upstream connection attached")]
    NotConnected,

    #[error("relay is shutting down")]
    ShuttingDown,
}

#[derive(Debug)]
struct LinkEntry {
    id: LinkId,
    tx: mpsc::Sender<Frame>,
}

#[derive(Debug)]
struct UpstreamSlot {
    id: LinkId,
    tx: mpsc::Sender<Frame>,
}

/// Routing core shared by the accept layer and every downstream link.
#[derive(Debug)]
pub struct UpstreamHub {
    links: DashMap<String, LinkEntry>,
    upstream: Mutex<Option<UpstreamSlot>>,
    capacity: AtomicUsize,
    shutdown: Shutdown,
}

impl UpstreamHub {
    pub fn new(capacity: usize, shutdown: Shutdown) -> Self {
        Self {
            links: DashMap::new(),
            upstream: Mutex::new(None),
            capacity: AtomicUsize::new(capacity.max(1)),
            shutdown,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<UpstreamSlot>> {
        self.upstream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity used for the next upstream queue.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.slot().is_some()
    }

    /// Attach the upstream transport and start its pumps.
    ///
    /// The returned task finishes once the upstream is detached again.
    pub fn accept(self: &Arc<Self>, transport: Transport) -> Result<JoinHandle<()>, HubError> {
        let shutdown = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return Err(HubError::ShuttingDown);
        }

        let id = LinkId::new();
        let rx = {
            let mut slot = self.slot();
            if slot.is_some() {
                return Err(HubError::AlreadyConnected);
            }
            let (tx, rx) = mpsc::channel(self.capacity.load(Ordering::Relaxed));
            *slot = Some(UpstreamSlot { id, tx });
            rx
        };

        tracing::info!(upstream_id = %id, links = self.links.len(), "Upstream connected");
        metrics::set_upstream_connected(true);

        let hub = Arc::clone(self);
        Ok(tokio::spawn(async move { hub.pump(id, transport, rx, shutdown).await }))
    }

    async fn pump(
        self: Arc<Self>,
        id: LinkId,
        transport: Transport,
        mut rx: mpsc::Receiver<Frame>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let Transport { mut sink, mut stream } = transport;

        let mut writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!(upstream_id = %id, error = %e, "Upstream write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let writer_done = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(frame)) => self.fan_out(frame),
                    Some(Err(TransportError::Closed)) | None => {
                        tracing::info!(upstream_id = %id, "Upstream closed the connection");
                        break false;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(upstream_id = %id, error = %e, "Upstream read failed");
                        break false;
                    }
                },
                _ = &mut writer => break true,
                _ = shutdown.recv() => break false,
            }
        };

        // Detaching drops the queue's sender; the writer drains what is left
        // and closes the sink.
        self.detach(id);
        if !writer_done && tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            tracing::warn!(upstream_id = %id, "Upstream did not drain in time, dropping it");
            writer.abort();
            let _ = writer.await;
        }
    }

    fn detach(&self, id: LinkId) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
            metrics::set_upstream_connected(false);
            tracing::info!(upstream_id = %id, "Upstream detached");
        }
    }

    /// Deliver a frame to every registered link's queue.
    fn fan_out(&self, frame: Frame) {
        metrics::record_frame(Direction::FanOut);
        for entry in self.links.iter() {
            match entry.tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(link = %entry.key(), link_id = %entry.id, "Link queue full, dropping frame");
                    metrics::record_fanout_dropped(entry.key());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(link = %entry.key(), link_id = %entry.id, "Link queue closed, dropping frame");
                    metrics::record_fanout_dropped(entry.key());
                }
            }
        }
    }

    /// Queue a frame for the upstream, waiting while the queue is full.
    pub async fn submit_upstream(&self, frame: Frame) -> Result<(), HubError> {
        let tx = self
            .slot()
            .as_ref()
            .map(|s| s.tx.clone())
            .ok_or(HubError::NotConnected)?;
        tx.send(frame).await.map_err(|_| HubError::NotConnected)?;
        metrics::record_frame(Direction::FanIn);
        Ok(())
    }

    /// Add a link's queue to the fan-out set.
    pub fn register(&self, name: &str, id: LinkId, tx: mpsc::Sender<Frame>) -> Result<(), HubError> {
        match self.links.entry(name.to_string()) {
            Entry::Occupied(_) => Err(HubError::DuplicateLink(name.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(LinkEntry { id, tx });
                Ok(())
            }
        }
    }

    pub fn unregister(&self, name: &str) {
        self.links.remove(name);
    }

    pub fn link_names(&self) -> Vec<String> {
        self.links.iter().map(|e| e.key().clone()).collect()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}
