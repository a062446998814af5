//! Content admission: prefix pass-through and pattern allow/deny lists.

use crate::config::schema::ContentRuleConfig;
use crate::filter::matcher::{compile_patterns, ContentMatcher};
use crate::filter::mode::{ContentMode, ModeError};
use crate::message::{Content, ContentDelta, ParsedMessage};

/// Compiled content rule for one message scope.
#[derive(Debug)]
pub struct ContentRule {
    mode: ContentMode,
    matchers: Vec<Box<dyn ContentMatcher>>,
    prefixes: Vec<String>,
    replacement: String,
}

/// A prefix that matched, and the rewrite it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixMatch {
    pub prefix: String,
    pub delta: ContentDelta,
}

impl ContentRule {
    pub fn new(
        mode: ContentMode,
        matchers: Vec<Box<dyn ContentMatcher>>,
        prefixes: Vec<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            matchers,
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
            replacement: replacement.into(),
        }
    }

    /// Compile a configured rule. No rule at all means content is not inspected.
    pub fn compile(filter: &str, config: Option<&ContentRuleConfig>) -> Result<Self, ModeError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };
        Ok(Self::new(
            config.mode.parse()?,
            compile_patterns(filter, &config.filters),
            config.prefix.to_vec(),
            config.prefix_replace.clone(),
        ))
    }

    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(|m| m.pattern())
    }

    /// Find a configured prefix on the first text unit and build the rewrite.
    ///
    /// Only the first text segment is considered. The prefix is stripped from
    /// its trimmed text and the replacement spliced in; a segment left blank is
    /// removed. `raw_message` gets the same substitution, once.
    pub fn prefix_match(&self, message: &ParsedMessage) -> Option<PrefixMatch> {
        if self.prefixes.is_empty() {
            return None;
        }

        let (index, original) = match &message.content {
            Content::Segments(segments) => segments
                .iter()
                .enumerate()
                .find_map(|(i, s)| s.as_text().map(|t| (Some(i), t.trim())))?,
            Content::Text(text) => (None, text.trim()),
        };
        if original.is_empty() {
            return None;
        }

        let prefix = self.prefixes.iter().find(|p| original.starts_with(p.as_str()))?;
        let text = format!("{}{}", self.replacement, &original[prefix.len()..]);

        let content = match (&message.content, index) {
            (Content::Segments(segments), Some(index)) => {
                let mut segments = segments.clone();
                if text.trim().is_empty() {
                    segments.remove(index);
                } else {
                    segments[index].set_text(text.clone());
                }
                Content::Segments(segments)
            }
            _ => Content::Text(text.clone()),
        };

        Some(PrefixMatch {
            prefix: prefix.clone(),
            delta: ContentDelta {
                content,
                raw_message: message.raw_message.replacen(original, &text, 1),
            },
        })
    }

    /// First pattern matching any trimmed text unit, in unit order.
    ///
    /// Evaluation failures are logged and count as no match.
    pub fn first_match(&self, filter: &str, message: &ParsedMessage) -> Option<&str> {
        for unit in message.content.text_units() {
            let unit = unit.trim();
            for matcher in &self.matchers {
                match matcher.is_match(unit) {
                    Ok(true) => return Some(matcher.pattern()),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(
                        filter = %filter,
                        pattern = %matcher.pattern(),
                        raw_message = %message.raw_message,
                        error = %e,
                        "Pattern evaluation failed, treating as no match"
                    ),
                }
            }
        }
        None
    }
}

impl Default for ContentRule {
    fn default() -> Self {
        Self::new(ContentMode::On, Vec::new(), Vec::new(), "")
    }
}
