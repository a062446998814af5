//! Filter engine.
//!
//! # Data Flow
//! ```text
//! BotAppConfig + server defaults
//!     → spec.rs (compile: modes, identity sets, patterns, prefixes)
//!     → registry.rs (one swappable slot per link name)
//!
//! text frame for a link
//!     → message::ParsedMessage::parse
//!     → FilterSpec::evaluate (identity gate, prefix rewrite, patterns)
//!     → Verdict
//! ```
//!
//! # Design Decisions
//! - Compiled specs are immutable; reload swaps the whole `Arc`
//! - Unparseable frames and non-text frames are never filtered

pub mod content;
pub mod identity;
pub mod matcher;
pub mod mode;
pub mod registry;
pub mod spec;

pub use registry::{FilterHandle, FilterRegistry};
pub use spec::{CompileError, FilterSpec, Reason, Scope, Verdict};

use crate::message::ParsedMessage;

/// Evaluate a text frame against `spec`.
///
/// Frames that do not parse as a filterable event are passed unchanged.
pub fn filter_text(spec: &FilterSpec, text: &str) -> Verdict {
    match ParsedMessage::parse(text) {
        Ok(mut message) => spec.evaluate(&mut message),
        Err(e) => {
            if e.is_content_error() {
                tracing::warn!(filter = %spec.name(), error = %e, "Relaying undecodable message unfiltered");
            } else {
                tracing::trace!(filter = %spec.name(), error = %e, "Relaying non-message event");
            }
            Verdict::Pass {
                reason: Reason::NotFiltered,
                rewritten: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::content::ContentRule;
    use crate::filter::identity::IdRule;
    use crate::filter::mode::IdMode;

    fn closed() -> FilterSpec {
        FilterSpec::new(
            "closed",
            IdRule::new(IdMode::Off, []),
            IdRule::new(IdMode::Off, []),
            ContentRule::default(),
            ContentRule::default(),
        )
    }

    #[test]
    fn unparseable_frames_pass() {
        let spec = closed();
        assert!(filter_text(&spec, "not json").is_pass());
        assert!(filter_text(&spec, r#"{"post_type":"meta_event"}"#).is_pass());
        assert!(filter_text(
            &spec,
            r#"{"message_type":"private","message_format":"array","user_id":5,"message":"oops"}"#
        )
        .is_pass());
    }

    #[test]
    fn parsed_frames_are_evaluated() {
        let verdict = filter_text(
            &closed(),
            r#"{"message_type":"private","message_format":"string","user_id":5,"message":"x"}"#,
        );
        assert!(!verdict.is_pass());
    }
}
