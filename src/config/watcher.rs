//! Configuration file watcher for hot reload.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::RelayConfig;

/// Watches the configuration file and forwards every valid new version.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by writing a temporary file and renaming it keep working.
/// Re-saving identical content is not forwarded.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as updates are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|name| name.to_os_string());
        let last = Mutex::new(std::fs::read_to_string(&path).ok());

        let watched = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                if !event.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == file_name) {
                    return;
                }

                let content = match std::fs::read_to_string(&watched) {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::debug!(path = ?watched, error = %e, "Config file not readable yet");
                        return;
                    }
                };
                {
                    let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
                    if last.as_deref() == Some(content.as_str()) {
                        return;
                    }
                    *last = Some(content.clone());
                }

                tracing::info!(path = ?watched, "Config file changed, reloading");
                match parse_config(&content) {
                    Ok(config) => {
                        let _ = update_tx.send(config);
                    }
                    Err(ConfigError::Validation(errors)) => {
                        for error in &errors {
                            tracing::error!(error = %error, "Invalid config, keeping current configuration");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
