//! Dual-view decoding of a OneBot event.
//!
//! # Responsibilities
//! - Keep every top-level field as its original serialized text (`intact`)
//! - Decode the handful of fields the filter needs (the projection)
//! - Decode `message` according to `message_format`
//!
//! # Design Decisions
//! - Both views are decoded independently from the same text
//! - Any decode failure makes the event unparseable; callers relay it unfiltered

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub const MESSAGE_FIELD: &str = "message";
pub const RAW_MESSAGE_FIELD: &str = "raw_message";
pub const TEXT_SEGMENT: &str = "text";

/// Why an event could not be parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a JSON object: {0}")]
    NotAnObject(#[source] serde_json::Error),

    #[error("unexpected field types: {0}")]
    Projection(#[source] serde_json::Error),

    #[error("unsupported message_format {0:?}")]
    UnsupportedFormat(Option<String>),

    #[error("message is not a valid {format:?} payload: {source}")]
    Content {
        format: MessageFormat,
        #[source]
        source: serde_json::Error,
    },
}

impl ParseError {
    /// Content errors are worth a warning; the rest is ordinary non-chat traffic.
    pub fn is_content_error(&self) -> bool {
        matches!(self, ParseError::Content { .. })
    }
}

/// `message_type` of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Private,
    Group,
    Other(String),
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "private" => MessageType::Private,
            "group" => MessageType::Group,
            other => MessageType::Other(other.to_string()),
        }
    }
}

/// `message_format` of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Array,
    String,
}

/// One `{type, data}` element of an array-format message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    /// Build a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert(TEXT_SEGMENT.to_string(), Value::String(text.into()));
        Self {
            kind: TEXT_SEGMENT.to_string(),
            data,
        }
    }

    /// The text of a `text` segment; `None` for every other kind.
    pub fn as_text(&self) -> Option<&str> {
        if self.kind != TEXT_SEGMENT {
            return None;
        }
        self.data.get(TEXT_SEGMENT)?.as_str()
    }

    pub fn set_text(&mut self, text: String) {
        self.data.insert(TEXT_SEGMENT.to_string(), Value::String(text));
    }
}

/// Decoded `message` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Segments(Vec<Segment>),
    Text(String),
}

impl Content {
    /// Text-bearing units in order: every text segment, or the whole string.
    pub fn text_units(&self) -> Vec<&str> {
        match self {
            Content::Segments(segments) => segments.iter().filter_map(Segment::as_text).collect(),
            Content::Text(text) => vec![text.as_str()],
        }
    }
}

#[derive(Deserialize)]
struct Projection<'a> {
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    message_format: Option<String>,
    #[serde(default, borrow)]
    message: Option<&'a RawValue>,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    raw_message: Option<String>,
}

/// A parsed OneBot event.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub(crate) intact: HashMap<String, Box<RawValue>>,
    pub message_type: MessageType,
    pub message_format: MessageFormat,
    /// 0 when absent or null.
    pub user_id: i64,
    /// 0 when absent or null.
    pub group_id: i64,
    pub raw_message: String,
    pub content: Content,
}

impl ParsedMessage {
    /// Decode an event from the text of a frame.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let intact: HashMap<String, Box<RawValue>> =
            serde_json::from_str(raw).map_err(ParseError::NotAnObject)?;
        let projection: Projection<'_> =
            serde_json::from_str(raw).map_err(ParseError::Projection)?;

        let format = match projection.message_format.as_deref() {
            Some("array") => MessageFormat::Array,
            Some("string") => MessageFormat::String,
            other => return Err(ParseError::UnsupportedFormat(other.map(str::to_string))),
        };

        let payload = projection.message.map(RawValue::get).unwrap_or("null");
        let content = match format {
            MessageFormat::Array => serde_json::from_str(payload).map(Content::Segments),
            MessageFormat::String => serde_json::from_str(payload).map(Content::Text),
        }
        .map_err(|source| ParseError::Content { format, source })?;

        Ok(Self {
            intact,
            message_type: MessageType::from(projection.message_type.as_deref().unwrap_or_default()),
            message_format: format,
            user_id: projection.user_id.unwrap_or_default(),
            group_id: projection.group_id.unwrap_or_default(),
            raw_message: projection.raw_message.unwrap_or_default(),
            content,
        })
    }

    /// Serialized text of a top-level field, exactly as received.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.intact.get(name).map(|v| v.get())
    }
}
