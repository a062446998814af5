//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from the TOML config file.
//! Mode fields stay plain strings here; they are checked by `validation` and
//! turned into typed rules when a filter is compiled.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Upstream listener and connection-level settings.
    pub server: ServerConfig,

    /// Downstream bot applications, one link each.
    pub bot_apps: Vec<BotAppConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Server-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Listen host (e.g., "127.0.0.1").
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Path the upstream gateway connects to.
    pub suffix: String,

    /// Bot account id, sent as `x-self-id` when dialing bot apps.
    pub bot_id: String,

    /// User agent sent when dialing bot apps.
    pub user_agent: String,

    /// WebSocket read/write buffer size in bytes.
    pub buffer_size: usize,

    /// Reconnect interval in seconds.
    pub sleep_time: f32,

    /// Capacity of every internal frame queue.
    pub queue_capacity: usize,

    /// Log every filter decision.
    pub debug: bool,

    /// Identity rules inherited by bot apps whose mode is empty or `default`.
    pub default: DefaultRules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5700,
            suffix: "/".to_string(),
            bot_id: String::new(),
            user_agent: "OneBot/11".to_string(),
            buffer_size: 4096,
            sleep_time: 3.0,
            queue_capacity: 1024,
            debug: false,
            default: DefaultRules::default(),
        }
    }
}

impl ServerConfig {
    /// Socket address string the HTTP listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reconnect interval as a `Duration`. Invalid values collapse to zero.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::try_from_secs_f32(self.sleep_time).unwrap_or(Duration::ZERO)
    }
}

/// Server-wide identity fallbacks.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct DefaultRules {
    #[serde(alias = "private")]
    pub user_id: IdRuleConfig,

    #[serde(alias = "group")]
    pub group_id: IdRuleConfig,
}

/// A downstream bot application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct BotAppConfig {
    /// Unique link name; also the filter name.
    pub name: String,

    /// WebSocket URI to dial (ws:// or wss://).
    pub uri: String,

    /// Bearer token attached to the handshake.
    pub access_token: String,

    /// Identity rule applied to private messages.
    #[serde(alias = "private")]
    pub user_id: IdRuleConfig,

    /// Identity rule applied to group messages.
    #[serde(alias = "group")]
    pub group_id: IdRuleConfig,

    /// Content rule for private messages.
    pub private_message: Option<ContentRuleConfig>,

    /// Content rule for group messages.
    pub group_message: Option<ContentRuleConfig>,

    /// Legacy content rule, used when a scoped rule is absent.
    pub message: Option<ContentRuleConfig>,
}

impl BotAppConfig {
    /// Content rule effective for private messages.
    pub fn effective_private_message(&self) -> Option<&ContentRuleConfig> {
        self.private_message.as_ref().or(self.message.as_ref())
    }

    /// Content rule effective for group messages.
    pub fn effective_group_message(&self) -> Option<&ContentRuleConfig> {
        self.group_message.as_ref().or(self.message.as_ref())
    }
}

/// Identity admission rule: a mode plus an id set.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct IdRuleConfig {
    /// "", default, on, off, whitelist or blacklist.
    pub mode: String,
    pub ids: Vec<i64>,
}

/// Content admission rule.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContentRuleConfig {
    /// "", on, off, whitelist or blacklist.
    pub mode: String,

    /// Regular expressions matched against text content.
    pub filters: Vec<String>,

    /// Literal prefixes that always pass, checked in order.
    pub prefix: Prefixes,

    /// Replacement spliced in place of a matched prefix.
    pub prefix_replace: String,
}

/// One prefix or a list of them; older configs used a single string.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Prefixes {
    One(String),
    Many(Vec<String>),
}

impl Default for Prefixes {
    fn default() -> Self {
        Prefixes::Many(Vec::new())
    }
}

impl Prefixes {
    /// Non-empty prefixes in configured order.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Prefixes::One(p) => vec![p.clone()],
            Prefixes::Many(ps) => ps.clone(),
        }
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect()
    }
}

impl From<Vec<&str>> for Prefixes {
    fn from(ps: Vec<&str>) -> Self {
        Prefixes::Many(ps.into_iter().map(str::to_string).collect())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 6700
            suffix = "/ws"
            bot-id = "10001"
            sleep-time = 0.5

            [server.default.group]
            mode = "whitelist"
            ids = [42]

            [[bot-apps]]
            name = "echo"
            uri = "ws://127.0.0.1:8080/ws"
            access-token = "secret"

            [bot-apps.user-id]
            mode = "blacklist"
            ids = [7]

            [bot-apps.message]
            mode = "blacklist"
            filters = ["spam"]
            prefix = "!cmd "
        "#;

        let config: RelayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 6700);
        assert_eq!(config.server.default.group_id.mode, "whitelist");
        assert_eq!(config.server.reconnect_interval(), Duration::from_millis(500));

        let app = &config.bot_apps[0];
        assert_eq!(app.user_id.ids, vec![7]);
        assert!(app.private_message.is_none());
        let legacy = app.effective_group_message().unwrap();
        assert_eq!(legacy.prefix.to_vec(), vec!["!cmd ".to_string()]);
    }

    #[test]
    fn scoped_rule_wins_over_legacy() {
        let app = BotAppConfig {
            private_message: Some(ContentRuleConfig {
                mode: "whitelist".into(),
                ..Default::default()
            }),
            message: Some(ContentRuleConfig {
                mode: "blacklist".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(app.effective_private_message().unwrap().mode, "whitelist");
        assert_eq!(app.effective_group_message().unwrap().mode, "blacklist");
    }

    #[test]
    fn empty_prefixes_are_dropped() {
        let prefixes = Prefixes::from(vec!["", "/", ""]);
        assert_eq!(prefixes.to_vec(), vec!["/".to_string()]);
    }
}
