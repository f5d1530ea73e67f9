//! Message translators converting transport messages to events and back.
//!
//! Three strategies are provided:
//! - [`SimpleEventMessageTranslator`]: name and version travel inside the body
//! - [`TopicEventMessageTranslator`]: `topic/name/version` is the transport topic
//! - [`SchemaEventMessageTranslator`]: as topic-qualified, plus a schema identifier

mod schema;
mod simple;
mod topic;

pub use schema::SchemaEventMessageTranslator;
pub use simple::SimpleEventMessageTranslator;
pub use topic::TopicEventMessageTranslator;

use serde_json::{Map, Value};

use crate::error::{EventError, EventResult};
use crate::event::{Event, Message};
use crate::expression::ListenExpression;

/// Trait for bidirectional event ⇄ message conversion.
pub trait MessageTranslator: Send + Sync {
    /// Short identifier used in logs and configuration.
    fn name(&self) -> &str;

    /// Encodes an event as a transport message.
    fn to_message(&self, event: &Event) -> EventResult<Message>;

    /// Decodes a transport message into an event.
    fn to_event(&self, message: &Message) -> EventResult<Event>;

    /// Transport channel to subscribe to for events matching `expression`.
    fn subscription_channel(&self, expression: &ListenExpression) -> String;

    /// Schema identifier this translator assigns to the event, if any.
    fn schema_uri(&self, _event: &Event) -> Option<String> {
        None
    }
}

/// Delimiter between topic, name and version in qualified transport topics.
pub const TOPIC_DELIMITER: char = '/';

/// Parses a message body into a JSON object.
pub(crate) fn parse_body(message: &Message) -> EventResult<Map<String, Value>> {
    let value: Value = serde_json::from_str(&message.body).map_err(|e| {
        EventError::Translation(format!(
            "message on '{}' does not carry JSON: {}",
            message.topic, e
        ))
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(EventError::Translation(format!(
            "message on '{}' must carry a JSON object, got {}",
            message.topic,
            json_kind(&other)
        ))),
    }
}

/// Serializes a JSON object as a message body.
pub(crate) fn encode_body(body: Map<String, Value>) -> EventResult<String> {
    serde_json::to_string(&Value::Object(body))
        .map_err(|e| EventError::Translation(format!("could not encode message body: {}", e)))
}

/// Rejects events whose attributes use a key the translator reserves.
pub(crate) fn ensure_not_reserved(event: &Event, reserved: &[&str]) -> EventResult<()> {
    if let Some(key) = reserved.iter().find(|key| event.has_attribute(key)) {
        return Err(EventError::Translation(format!(
            "event {} uses reserved attribute '{}'",
            event, key
        )));
    }
    Ok(())
}

/// Encodes `topic/name/version` for qualified translators.
pub(crate) fn qualified_topic(event: &Event) -> EventResult<String> {
    for (label, segment) in [
        ("topic", &event.topic),
        ("name", &event.name),
        ("version", &event.version),
    ] {
        if segment.is_empty() {
            return Err(EventError::Translation(format!("event {} has an empty {}", event, label)));
        }
        if segment.contains(TOPIC_DELIMITER) {
            return Err(EventError::Translation(format!(
                "event {} {} '{}' contains the delimiter '{}'",
                event, label, segment, TOPIC_DELIMITER
            )));
        }
    }
    Ok(event.qualified_name())
}

/// Splits a qualified transport topic into `(topic, name, version)`.
pub(crate) fn parse_qualified_topic(topic: &str) -> EventResult<(String, String, String)> {
    let parts: Vec<&str> = topic.split(TOPIC_DELIMITER).collect();
    match parts.as_slice() {
        [t, n, v] if !t.is_empty() && !n.is_empty() && !v.is_empty() => {
            Ok((t.to_string(), n.to_string(), v.to_string()))
        }
        _ => Err(EventError::Translation(format!(
            "transport topic '{}' is not of the form topic{d}name{d}version",
            topic,
            d = TOPIC_DELIMITER
        ))),
    }
}

/// Subscription channel for qualified translators, `*` for wildcard segments.
pub(crate) fn qualified_channel(expression: &ListenExpression) -> String {
    use crate::expression::VersionMatcher;

    let version = match expression.version() {
        VersionMatcher::Exact(v) => v.as_str(),
        VersionMatcher::Any | VersionMatcher::Major(_) => "*",
    };
    format!(
        "{}{d}{}{d}{}",
        expression.topic().unwrap_or("*"),
        expression.name().unwrap_or("*"),
        version,
        d = TOPIC_DELIMITER
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_requires_object() {
        assert!(parse_body(&Message::new("t", r#"{"a": 1}"#)).is_ok());
        assert!(matches!(
            parse_body(&Message::new("t", "[1, 2]")),
            Err(EventError::Translation(msg)) if msg.contains("an array")
        ));
        assert!(matches!(
            parse_body(&Message::new("t", "not json")),
            Err(EventError::Translation(_))
        ));
    }

    #[test]
    fn test_parse_qualified_topic() {
        assert_eq!(
            parse_qualified_topic("user/created/1.0").unwrap(),
            ("user".to_string(), "created".to_string(), "1.0".to_string())
        );
        assert!(parse_qualified_topic("user/created").is_err());
        assert!(parse_qualified_topic("user/created/1.0/extra").is_err());
        assert!(parse_qualified_topic("user//1.0").is_err());
    }

    #[test]
    fn test_qualified_topic_rejects_delimiters() {
        let event = Event::versioned("user", "created/now", "1.0");
        assert!(matches!(qualified_topic(&event), Err(EventError::Translation(_))));

        let event = Event::versioned("", "created", "1.0");
        assert!(qualified_topic(&event).is_err());
    }

    #[test]
    fn test_qualified_channel() {
        let exact = ListenExpression::parse("user/created/1.0").unwrap();
        assert_eq!(qualified_channel(&exact), "user/created/1.0");

        let major = ListenExpression::parse("user/created/1.*").unwrap();
        assert_eq!(qualified_channel(&major), "user/created/*");

        assert_eq!(qualified_channel(&ListenExpression::any()), "*/*/*");
    }
}
