//! Localized mutation of a parsed event.
//!
//! Only `message` and `raw_message` are ever replaced; every other entry of
//! the verbatim map is written back exactly as it was received.

use serde_json::value::to_raw_value;

use crate::message::parsed::{Content, ParsedMessage, MESSAGE_FIELD, RAW_MESSAGE_FIELD};

/// New values for the two mutable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDelta {
    pub content: Content,
    pub raw_message: String,
}

impl ParsedMessage {
    /// Apply `delta` and return the re-serialized event.
    ///
    /// Both replacement values are serialized before anything is modified, so a
    /// failure leaves the message untouched.
    pub fn rewrite(&mut self, delta: ContentDelta) -> Result<String, serde_json::Error> {
        let message = to_raw_value(&delta.content)?;
        let raw_message = to_raw_value(&delta.raw_message)?;

        self.intact.insert(MESSAGE_FIELD.to_string(), message);
        self.intact.insert(RAW_MESSAGE_FIELD.to_string(), raw_message);
        self.content = delta.content;
        self.raw_message = delta.raw_message;

        self.to_json()
    }

    /// Serialize the verbatim map.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.intact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parsed::{MessageType, Segment};

    const EVENT: &str = r#"{"time":1700000000,"self_id":10001,"post_type":"message",
        "message_type":"group","sub_type":"normal","message_id":-12,
        "group_id":42,"user_id":7,"anonymous":null,"font":0,
        "sender":{"nickname":"alice","card":"","role":"member"},
        "message_format":"array","raw_message":"!cmd hello",
        "message":[{"type":"text","data":{"text":"!cmd hello"}}]}"#;

    #[test]
    fn rewrite_round_trips() {
        let mut parsed = ParsedMessage::parse(EVENT).unwrap();
        let before = parsed.clone();

        let out = parsed
            .rewrite(ContentDelta {
                content: Content::Segments(vec![Segment::text("hello")]),
                raw_message: "hello".into(),
            })
            .unwrap();

        let reparsed = ParsedMessage::parse(&out).unwrap();
        assert_eq!(reparsed.message_type, MessageType::Group);
        assert_eq!((reparsed.user_id, reparsed.group_id), (7, 42));
        assert_eq!(reparsed.raw_message, "hello");
        assert_eq!(reparsed.content.text_units(), vec!["hello"]);

        for (name, value) in &before.intact {
            if name == MESSAGE_FIELD || name == RAW_MESSAGE_FIELD {
                continue;
            }
            assert_eq!(reparsed.field(name), Some(value.get()), "field {} changed", name);
        }
        assert_eq!(reparsed.intact.len(), before.intact.len());
    }

    #[test]
    fn untouched_fields_keep_their_bytes() {
        let raw = r#"{"message_format":"string","message":"a","n":1.50,"s":"é"}"#;
        let mut parsed = ParsedMessage::parse(raw).unwrap();
        let out = parsed
            .rewrite(ContentDelta {
                content: Content::Text("b".into()),
                raw_message: "b".into(),
            })
            .unwrap();

        let reparsed = ParsedMessage::parse(&out).unwrap();
        assert_eq!(reparsed.field("n"), Some("1.50"));
        assert_eq!(reparsed.field("s"), Some(r#""é""#));
        assert_eq!(reparsed.field("raw_message"), Some(r#""b""#));
    }
}
