//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required server fields and value ranges
//! - Check every rule mode string
//! - Detect duplicate bot-app names and malformed URIs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, at startup and on reload

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::{BotAppConfig, ContentRuleConfig, RelayConfig, ServerConfig};
use crate::filter::mode::{ContentMode, IdMode};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `bot-apps[echo].uri`.
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_server(&config.server, &mut errors);

    let mut seen = HashSet::new();
    for (index, app) in config.bot_apps.iter().enumerate() {
        let scope = if app.name.is_empty() {
            format!("bot-apps[{}]", index)
        } else {
            format!("bot-apps[{}]", app.name)
        };
        if !app.name.is_empty() && !seen.insert(app.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", scope),
                "duplicate bot-app name",
            ));
        }
        validate_bot_app(&scope, app, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_server(server: &ServerConfig, errors: &mut Vec<ValidationError>) {
    if server.host.is_empty() {
        errors.push(ValidationError::new("server.host", "must not be empty"));
    }
    if server.port == 0 {
        errors.push(ValidationError::new("server.port", "must not be 0"));
    }
    if !server.suffix.starts_with('/') {
        errors.push(ValidationError::new("server.suffix", "must start with '/'"));
    }
    if server.bot_id.is_empty() {
        errors.push(ValidationError::new("server.bot-id", "must not be empty"));
    }
    if server.user_agent.is_empty() {
        errors.push(ValidationError::new("server.user-agent", "must not be empty"));
    }
    if !server.sleep_time.is_finite() || server.sleep_time < 0.0 {
        errors.push(ValidationError::new(
            "server.sleep-time",
            "must be a non-negative number of seconds",
        ));
    }
    if server.buffer_size == 0 {
        errors.push(ValidationError::new("server.buffer-size", "must be > 0"));
    }
    if server.queue_capacity == 0 {
        errors.push(ValidationError::new("server.queue-capacity", "must be > 0"));
    }
    if let Err(e) = server.default.user_id.mode.parse::<IdMode>() {
        errors.push(ValidationError::new("server.default.user-id.mode", e.to_string()));
    }
    if let Err(e) = server.default.group_id.mode.parse::<IdMode>() {
        errors.push(ValidationError::new("server.default.group-id.mode", e.to_string()));
    }
}

fn validate_bot_app(scope: &str, app: &BotAppConfig, errors: &mut Vec<ValidationError>) {
    if app.name.is_empty() {
        errors.push(ValidationError::new(format!("{}.name", scope), "must not be empty"));
    }

    if app.uri.is_empty() {
        errors.push(ValidationError::new(format!("{}.uri", scope), "must not be empty"));
    } else {
        match Url::parse(&app.uri) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("{}.uri", scope),
                format!("unsupported scheme \"{}\", expected ws or wss", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(format!("{}.uri", scope), e.to_string())),
        }
    }

    if let Err(e) = IdMode::parse_inheritable(&app.user_id.mode) {
        errors.push(ValidationError::new(format!("{}.user-id.mode", scope), e.to_string()));
    }
    if let Err(e) = IdMode::parse_inheritable(&app.group_id.mode) {
        errors.push(ValidationError::new(format!("{}.group-id.mode", scope), e.to_string()));
    }

    let content_rules = [
        ("private-message", app.private_message.as_ref()),
        ("group-message", app.group_message.as_ref()),
        ("message", app.message.as_ref()),
    ];
    for (key, rule) in content_rules {
        if let Some(rule) = rule {
            validate_content_rule(&format!("{}.{}", scope, key), rule, errors);
        }
    }
}

fn validate_content_rule(scope: &str, rule: &ContentRuleConfig, errors: &mut Vec<ValidationError>) {
    if let Err(e) = rule.mode.parse::<ContentMode>() {
        errors.push(ValidationError::new(format!("{}.mode", scope), e.to_string()));
    }
}
