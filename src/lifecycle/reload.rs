//! Hot reload of filters and link settings.
//!
//! # Data Flow
//! ```text
//! ConfigWatcher (load + validate)
//!     → ReloadCoordinator::apply
//!         → Relay::apply_settings (reconnect interval, debug, queue capacity)
//!         → FilterRegistry::recompile_all (atomic swap per link)
//!         → Relay::start_link for bot apps not yet running
//! ```
//!
//! Bot apps removed from the file keep running until restart.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::config::schema::RelayConfig;
use crate::config::validation::validate_config;
use crate::lifecycle::startup::{LinkHandle, Relay};

/// What a reload changed.
#[derive(Debug, Default)]
pub struct ReloadOutcome {
    pub recompiled: usize,
    pub started: Vec<LinkHandle>,
}

pub struct ReloadCoordinator {
    relay: Arc<Relay>,
}

impl ReloadCoordinator {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Apply one configuration. An invalid configuration changes nothing.
    pub fn apply(&self, config: &RelayConfig) -> ReloadOutcome {
        if let Err(errors) = validate_config(config) {
            for error in &errors {
                tracing::error!(error = %error, "Reload rejected");
            }
            return ReloadOutcome::default();
        }

        self.relay.apply_settings(&config.server);
        let recompiled = self.relay.registry().recompile_all(config);

        let mut started = Vec::new();
        for app in &config.bot_apps {
            match self.relay.start_link(app, &config.server) {
                Ok(Some(handle)) => {
                    tracing::info!(link = %handle.name, "Started link for new bot app");
                    started.push(handle);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Failed to start link for new bot app"),
            }
        }

        tracing::info!(recompiled, started = started.len(), "Configuration reloaded");
        ReloadOutcome { recompiled, started }
    }

    /// Apply every update until the channel closes or shutdown arrives.
    pub async fn run(self, mut updates: mpsc::UnboundedReceiver<RelayConfig>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => {
                        self.apply(&config);
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Reload coordinator stopped");
    }
}
