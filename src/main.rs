//! OneBot filter relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────┐
//!                   │                ONEBOT FILTER                 │
//!                   │                                              │
//!  OneBot gateway   │  ┌─────────┐     ┌─────────────┐             │
//!  ─────────────────┼─▶│  http   │────▶│ UpstreamHub │             │
//!                   │  │ upgrade │     └──┬───────▲──┘             │
//!                   │  └─────────┘ fan-out│       │fan-in          │
//!                   │                     ▼       │                │
//!                   │              ┌────────────────┐              │   Bot apps
//!                   │              │ DownstreamLink │──────────────┼──▶ (one link per
//!                   │              │ filter/rewrite │              │    [[bot-apps]])
//!                   │              └────────────────┘              │
//!                   │                                              │
//!                   │  config + watcher → reload → FilterRegistry  │
//!                   └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use onebot_filter::config::{load_config, ConfigWatcher};
use onebot_filter::lifecycle::{signals, ReloadCoordinator, Relay};
use onebot_filter::observability::{logging, metrics};
use onebot_filter::HttpServer;

/// Route one OneBot connection to many bot apps, filtering per app.
#[derive(Debug, Parser)]
#[command(name = "onebot-filter", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(path = ?cli.config, error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    logging::init(&config.observability.log_level);

    if cli.check {
        tracing::info!(path = ?cli.config, bot_apps = config.bot_apps.len(), "Configuration is valid");
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.server.bind_address(),
        suffix = %config.server.suffix,
        bot_apps = config.bot_apps.len(),
        "onebot-filter starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = Arc::new(Relay::from_config(&config));
    relay.start_all(&config)?;

    let (watcher, updates) = ConfigWatcher::new(&cli.config);
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    tokio::spawn(ReloadCoordinator::new(Arc::clone(&relay)).run(updates, relay.subscribe_shutdown()));

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    let server = HttpServer::new(&config.server, relay.hub());
    let stop = {
        let relay = Arc::clone(&relay);
        async move {
            signals::wait_for_shutdown().await;
            relay.shutdown();
        }
    };
    server.run(listener, stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
