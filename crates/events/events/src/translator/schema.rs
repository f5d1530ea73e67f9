use serde_json::Value;

use super::{
    MessageTranslator, encode_body, ensure_not_reserved, parse_body, parse_qualified_topic, qualified_channel,
    qualified_topic,
};
use crate::error::{EventError, EventResult};
use crate::event::{Event, Message};
use crate::expression::ListenExpression;
use crate::schema::SchemaUriTemplate;

const SCHEMA_KEY: &str = "schema";

/// Topic-qualified translator that also names the event's schema.
///
/// The transport topic is `topic/name/version`; the body holds the attributes
/// plus a `"schema"` field with the identifier derived from the same
/// components (by default `array://events/{topic}/{name}/{version}.json`).
/// The identifier is exposed to validators through
/// [`MessageTranslator::schema_uri`].
#[derive(Debug, Clone, Default)]
pub struct SchemaEventMessageTranslator {
    naming: SchemaUriTemplate,
}

impl SchemaEventMessageTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_naming(naming: SchemaUriTemplate) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> &SchemaUriTemplate {
        &self.naming
    }
}

impl MessageTranslator for SchemaEventMessageTranslator {
    fn name(&self) -> &str {
        "schema"
    }

    fn to_message(&self, event: &Event) -> EventResult<Message> {
        let topic = qualified_topic(event)?;
        ensure_not_reserved(event, &[SCHEMA_KEY])?;

        let mut body = serde_json::Map::with_capacity(event.attributes.len() + 1);
        body.insert(SCHEMA_KEY.to_string(), Value::String(self.naming.render(event)));
        body.extend(event.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Message::new(topic, encode_body(body)?))
    }

    fn to_event(&self, message: &Message) -> EventResult<Event> {
        let (topic, name, version) = parse_qualified_topic(&message.topic)?;
        let mut attributes = parse_body(message)?;
        let expected = self.naming.render_parts(&topic, &name, &version);

        match attributes.shift_remove(SCHEMA_KEY) {
            None => {}
            Some(Value::String(schema)) if schema == expected => {}
            Some(Value::String(schema)) => {
                return Err(EventError::Translation(format!(
                    "message on '{}' names schema '{}', expected '{}'",
                    message.topic, schema, expected
                )));
            }
            Some(_) => {
                return Err(EventError::Translation(format!(
                    "message on '{}' has a non-string '{}' field",
                    message.topic, SCHEMA_KEY
                )));
            }
        }

        let mut event = Event::versioned(topic, name, version);
        event.attributes = attributes;
        event.payload = Some(message.body.clone());
        Ok(event)
    }

    fn subscription_channel(&self, expression: &ListenExpression) -> String {
        qualified_channel(expression)
    }

    fn schema_uri(&self, event: &Event) -> Option<String> {
        Some(self.naming.render(event))
    }
}
