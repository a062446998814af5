//! Content pattern matching.
//!
//! # Responsibilities
//! - Match a single text unit against one configured pattern
//! - Report evaluation failures instead of panicking
//!
//! # Design Decisions
//! - Patterns are compiled once, when the filter is compiled
//! - Backtracking patterns (lookaround, backreferences) are accepted, so a
//!   match can fail at runtime (backtrack limit); callers treat a failure
//!   as "no match"

use fancy_regex::Regex;
use std::fmt;
use thiserror::Error;

/// A pattern that could not be evaluated against some input.
#[derive(Debug, Clone, Error)]
#[error("pattern evaluation failed: {0}")]
pub struct MatchError(pub String);

/// Trait for matching text against a compiled condition.
pub trait ContentMatcher: Send + Sync + fmt::Debug {
    /// Returns true if the text matches this condition.
    fn is_match(&self, text: &str) -> Result<bool, MatchError>;

    /// Source pattern, for logs.
    fn pattern(&self) -> &str;
}

/// Regular expression matcher.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl ContentMatcher for RegexMatcher {
    fn is_match(&self, text: &str) -> Result<bool, MatchError> {
        self.regex
            .is_match(text)
            .map_err(|e| MatchError(e.to_string()))
    }

    fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Compile every pattern, dropping (and logging) the ones that do not compile.
pub fn compile_patterns(filter: &str, patterns: &[String]) -> Vec<Box<dyn ContentMatcher>> {
    patterns
        .iter()
        .filter_map(|pattern| match RegexMatcher::new(pattern) {
            Ok(m) => Some(Box::new(m) as Box<dyn ContentMatcher>),
            Err(e) => {
                tracing::warn!(filter = %filter, pattern = %pattern, error = %e, "Dropping pattern that failed to compile");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_matcher() {
        let matcher = RegexMatcher::new("sp[a@]m").unwrap();
        assert!(matcher.is_match("this is sp@m").unwrap());
        assert!(!matcher.is_match("ham").unwrap());
        assert_eq!(matcher.pattern(), "sp[a@]m");
    }

    #[test]
    fn test_inline_flags() {
        let matcher = RegexMatcher::new(r"(?i)^hello\b").unwrap();
        assert!(matcher.is_match("HeLLo there").unwrap());
        assert!(!matcher.is_match("say hello").unwrap());
    }

    #[test]
    fn test_lookahead_and_backreference() {
        let patterns = vec![r"^(?!/).*".to_string(), r"(.)\1{3,}".to_string(), "spam".to_string()];
        let compiled = compile_patterns("test", &patterns);
        assert_eq!(compiled.len(), 3);

        assert!(compiled[0].is_match("hello").unwrap());
        assert!(!compiled[0].is_match("/help").unwrap());
        assert!(compiled[1].is_match("loooool").unwrap());
        assert!(!compiled[1].is_match("lool").unwrap());
    }

    #[test]
    fn test_bad_patterns_dropped() {
        let patterns = vec!["ok".to_string(), "(".to_string(), "fine$".to_string()];
        let compiled = compile_patterns("test", &patterns);
        let sources: Vec<_> = compiled.iter().map(|m| m.pattern()).collect();
        assert_eq!(sources, vec!["ok", "fine$"]);
    }
}
