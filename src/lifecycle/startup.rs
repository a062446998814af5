//! Startup orchestration.
//!
//! # Responsibilities
//! - Own the hub, the filter registry, the shared link settings and the dialer
//! - Compile filters and spawn one supervisor per bot app
//! - Broadcast shutdown to every long-running task
//!
//! # Design Decisions
//! - Fail fast: a filter that does not compile at startup is fatal
//! - A filter lives exactly as long as its link supervisor

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::schema::{BotAppConfig, RelayConfig, ServerConfig};
use crate::filter::{CompileError, FilterRegistry, FilterSpec};
use crate::lifecycle::shutdown::Shutdown;
use crate::link::downstream::{DownstreamLink, LinkSettings, LinkState};
use crate::link::hub::UpstreamHub;
use crate::link::transport::{DialTarget, Dialer, WsDialer};

/// A spawned link supervisor.
#[derive(Debug)]
pub struct LinkHandle {
    pub name: String,
    pub state: watch::Receiver<LinkState>,
    pub task: JoinHandle<()>,
}

/// Composition root of the relay.
pub struct Relay {
    hub: Arc<UpstreamHub>,
    registry: Arc<FilterRegistry>,
    settings: Arc<ArcSwap<LinkSettings>>,
    dialer: Arc<dyn Dialer>,
    shutdown: Shutdown,
}

impl Relay {
    /// Build a relay that dials bot apps over WebSocket.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(&config.server, Arc::new(WsDialer::new(config.server.buffer_size)))
    }

    pub fn new(server: &ServerConfig, dialer: Arc<dyn Dialer>) -> Self {
        let shutdown = Shutdown::new();
        let settings = LinkSettings::from_server(server);
        Self {
            hub: Arc::new(UpstreamHub::new(settings.queue_capacity, shutdown.clone())),
            registry: Arc::new(FilterRegistry::new()),
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            dialer,
            shutdown,
        }
    }

    pub fn hub(&self) -> Arc<UpstreamHub> {
        Arc::clone(&self.hub)
    }

    pub fn registry(&self) -> Arc<FilterRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn settings(&self) -> Arc<LinkSettings> {
        self.settings.load_full()
    }

    /// Replace the runtime settings every link reads.
    pub fn apply_settings(&self, server: &ServerConfig) {
        let settings = LinkSettings::from_server(server);
        self.hub.set_capacity(settings.queue_capacity);
        self.settings.store(Arc::new(settings));
    }

    /// Compile `app`'s filter and spawn its link supervisor.
    ///
    /// Returns `Ok(None)` when a link with that name is already running or
    /// the relay is shutting down.
    pub fn start_link(&self, app: &BotAppConfig, server: &ServerConfig) -> Result<Option<LinkHandle>, CompileError> {
        let shutdown = self.shutdown.subscribe();
        if self.shutdown.is_triggered() || self.registry.contains(&app.name) {
            return Ok(None);
        }

        let spec = FilterSpec::compile(app, &server.default)?;
        tracing::info!(filter = %spec, "Filter loaded");
        let filter = self.registry.register(spec);

        let link = DownstreamLink::new(
            DialTarget::new(app, server),
            filter,
            Arc::clone(&self.hub),
            Arc::clone(&self.dialer),
            Arc::clone(&self.settings),
        );
        let state = link.subscribe();
        let registry = Arc::clone(&self.registry);
        let name = app.name.clone();

        let task = tokio::spawn({
            let name = name.clone();
            async move {
                link.run(shutdown).await;
                registry.unregister(&name);
            }
        });

        Ok(Some(LinkHandle { name, state, task }))
    }

    /// Start a link for every configured bot app.
    pub fn start_all(&self, config: &RelayConfig) -> Result<Vec<LinkHandle>, CompileError> {
        let mut handles = Vec::with_capacity(config.bot_apps.len());
        for app in &config.bot_apps {
            if let Some(handle) = self.start_link(app, &config.server)? {
                handles.push(handle);
            }
        }
        tracing::info!(links = handles.len(), "Bot app links started");
        Ok(handles)
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Stop every link and detach the upstream.
    pub fn shutdown(&self) {
        let tasks = self.shutdown.receiver_count();
        if self.shutdown.trigger() {
            tracing::info!(tasks, "Shutting down relay");
        }
    }
}
