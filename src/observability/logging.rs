//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when neither `RUST_LOG` nor the config gives a usable level.
const FALLBACK_DIRECTIVE: &str = "onebot_filter=info,tower_http=info";

/// Filter built from `RUST_LOG`, else from `log_level`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
}

fn directive(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() {
        return FALLBACK_DIRECTIVE.to_string();
    }
    format!("onebot_filter={level},tower_http={level}")
}

/// Install the global subscriber. Safe to call once per process.
pub fn init(log_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_scopes_to_crate() {
        assert_eq!(directive("debug"), "onebot_filter=debug,tower_http=debug");
        assert_eq!(directive("  "), FALLBACK_DIRECTIVE);
    }
}
