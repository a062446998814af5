//! Compiled per-link filter and its evaluation algorithm.
//!
//! # Evaluation Order
//! 1. Events that are neither private nor group messages pass untouched
//! 2. Identity gate (group id for group messages, user id for private ones)
//! 3. Content rule of the message scope: `on` passes, `off` rejects
//! 4. Prefix match: strip, splice replacement, rewrite, pass (beats every mode)
//! 5. First pattern match: whitelist passes, blacklist rejects
//! 6. Nothing matched: whitelist rejects, blacklist passes

use std::fmt;
use thiserror::Error;

use crate::config::schema::{BotAppConfig, DefaultRules};
use crate::filter::content::ContentRule;
use crate::filter::identity::IdRule;
use crate::filter::mode::{ContentMode, ModeError};
use crate::message::{MessageType, ParsedMessage};

/// Error compiling a bot-app's rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("filter {name}: {field}: {source}")]
pub struct CompileError {
    pub name: String,
    pub field: &'static str,
    #[source]
    pub source: ModeError,
}

/// Message scope a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Private,
    Group,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Private => "private",
            Scope::Group => "group",
        })
    }
}

/// Why a verdict was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Not a private or group message.
    NotFiltered,
    IdentityBlocked { scope: Scope, id: i64 },
    /// Content rule mode is `on`.
    Unfiltered,
    /// Content rule mode is `off`.
    ContentDisabled,
    PrefixMatched { prefix: String },
    PatternAllowed { pattern: String },
    PatternBlocked { pattern: String },
    NotWhitelisted,
    NotBlacklisted,
    MisconfiguredMode(ContentMode),
}

impl Reason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Reason::NotFiltered => "not_filtered",
            Reason::IdentityBlocked { .. } => "identity_blocked",
            Reason::Unfiltered => "unfiltered",
            Reason::ContentDisabled => "content_disabled",
            Reason::PrefixMatched { .. } => "prefix_matched",
            Reason::PatternAllowed { .. } => "pattern_allowed",
            Reason::PatternBlocked { .. } => "pattern_blocked",
            Reason::NotWhitelisted => "not_whitelisted",
            Reason::NotBlacklisted => "not_blacklisted",
            Reason::MisconfiguredMode(_) => "misconfigured",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NotFiltered => write!(f, "not a chat message"),
            Reason::IdentityBlocked { scope, id } => write!(f, "{} id {} not admitted", scope, id),
            Reason::Unfiltered => write!(f, "content not filtered"),
            Reason::ContentDisabled => write!(f, "content disabled"),
            Reason::PrefixMatched { prefix } => write!(f, "prefix {:?} matched", prefix),
            Reason::PatternAllowed { pattern } => write!(f, "whitelisted by {:?}", pattern),
            Reason::PatternBlocked { pattern } => write!(f, "blacklisted by {:?}", pattern),
            Reason::NotWhitelisted => write!(f, "not in whitelist"),
            Reason::NotBlacklisted => write!(f, "not in blacklist"),
            Reason::MisconfiguredMode(mode) => write!(f, "content mode {} cannot decide", mode),
        }
    }
}

/// Outcome of evaluating one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the message; `rewritten` replaces the original text when set.
    Pass {
        reason: Reason,
        rewritten: Option<String>,
    },
    /// Drop the message.
    Reject { reason: Reason },
}

impl Verdict {
    fn pass(reason: Reason) -> Self {
        Verdict::Pass {
            reason,
            rewritten: None,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn reason(&self) -> &Reason {
        match self {
            Verdict::Pass { reason, .. } | Verdict::Reject { reason } => reason,
        }
    }
}

/// Compiled, immutable rule set of one link.
#[derive(Debug)]
pub struct FilterSpec {
    name: String,
    user_id: IdRule,
    group_id: IdRule,
    private_message: ContentRule,
    group_message: ContentRule,
}

impl FilterSpec {
    pub fn new(
        name: impl Into<String>,
        user_id: IdRule,
        group_id: IdRule,
        private_message: ContentRule,
        group_message: ContentRule,
    ) -> Self {
        Self {
            name: name.into(),
            user_id,
            group_id,
            private_message,
            group_message,
        }
    }

    /// Compile a bot-app's rules against the server defaults as they are now.
    pub fn compile(app: &BotAppConfig, defaults: &DefaultRules) -> Result<Self, CompileError> {
        let err = |field: &'static str| {
            let name = app.name.clone();
            move |source| CompileError {
                name,
                field,
                source,
            }
        };

        Ok(Self::new(
            app.name.clone(),
            IdRule::compile(&app.user_id, &defaults.user_id).map_err(err("user-id.mode"))?,
            IdRule::compile(&app.group_id, &defaults.group_id).map_err(err("group-id.mode"))?,
            ContentRule::compile(&app.name, app.effective_private_message())
                .map_err(err("private-message.mode"))?,
            ContentRule::compile(&app.name, app.effective_group_message())
                .map_err(err("group-message.mode"))?,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_id(&self) -> &IdRule {
        &self.user_id
    }

    pub fn group_id(&self) -> &IdRule {
        &self.group_id
    }

    pub fn private_message(&self) -> &ContentRule {
        &self.private_message
    }

    pub fn group_message(&self) -> &ContentRule {
        &self.group_message
    }

    /// Decide whether `message` reaches this link, rewriting it on a prefix match.
    pub fn evaluate(&self, message: &mut ParsedMessage) -> Verdict {
        let scope = match message.message_type {
            MessageType::Private => Scope::Private,
            MessageType::Group => Scope::Group,
            MessageType::Other(_) => return Verdict::pass(Reason::NotFiltered),
        };

        let (id_rule, id, rule) = match scope {
            Scope::Group => (&self.group_id, message.group_id, &self.group_message),
            Scope::Private => (&self.user_id, message.user_id, &self.private_message),
        };
        if !id_rule.admits(id) {
            return Verdict::Reject {
                reason: Reason::IdentityBlocked { scope, id },
            };
        }

        match rule.mode() {
            ContentMode::On => return Verdict::pass(Reason::Unfiltered),
            ContentMode::Off => {
                return Verdict::Reject {
                    reason: Reason::ContentDisabled,
                }
            }
            ContentMode::Whitelist | ContentMode::Blacklist => {}
        }

        if let Some(found) = rule.prefix_match(message) {
            match message.rewrite(found.delta) {
                Ok(rewritten) => {
                    return Verdict::Pass {
                        reason: Reason::PrefixMatched {
                            prefix: found.prefix,
                        },
                        rewritten: Some(rewritten),
                    }
                }
                Err(e) => tracing::error!(
                    filter = %self.name,
                    error = %e,
                    "Failed to re-serialize prefix rewrite, ignoring prefix"
                ),
            }
        }

        if let Some(pattern) = rule.first_match(&self.name, message) {
            let pattern = pattern.to_string();
            return match rule.mode() {
                ContentMode::Blacklist => Verdict::Reject {
                    reason: Reason::PatternBlocked { pattern },
                },
                _ => Verdict::pass(Reason::PatternAllowed { pattern }),
            };
        }

        match rule.mode() {
            ContentMode::Whitelist => Verdict::Reject {
                reason: Reason::NotWhitelisted,
            },
            ContentMode::Blacklist => Verdict::pass(Reason::NotBlacklisted),
            mode => {
                tracing::error!(filter = %self.name, mode = %mode, "Content mode must be whitelist or blacklist");
                Verdict::Reject {
                    reason: Reason::MisconfiguredMode(mode),
                }
            }
        }
    }
}

fn write_content_rule(f: &mut fmt::Formatter<'_>, label: &str, rule: &ContentRule) -> fmt::Result {
    write!(
        f,
        " {}=[mode={} filters={:?} prefix={:?} replace={:?}]",
        label,
        rule.mode(),
        rule.patterns().collect::<Vec<_>>(),
        rule.prefixes(),
        rule.replacement()
    )
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} user-id=[{} {:?}] group-id=[{} {:?}]",
            self.name,
            self.user_id.mode(),
            self.user_id.ids().collect::<Vec<_>>(),
            self.group_id.mode(),
            self.group_id.ids().collect::<Vec<_>>(),
        )?;
        write_content_rule(f, "private-message", &self.private_message)?;
        write_content_rule(f, "group-message", &self.group_message)
    }
}
