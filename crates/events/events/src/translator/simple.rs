use serde_json::Value;

use super::{MessageTranslator, encode_body, ensure_not_reserved, parse_body};
use crate::error::{EventError, EventResult};
use crate::event::{DEFAULT_VERSION, Event, Message};
use crate::expression::ListenExpression;

const NAME_KEY: &str = "event";
const VERSION_KEY: &str = "version";

/// Translator that embeds name and version in the message body.
///
/// The transport topic is the event topic; the body is
/// `{"event": name, "version": version, ...attributes}`.
#[derive(Debug, Clone, Default)]
pub struct SimpleEventMessageTranslator;

impl SimpleEventMessageTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl MessageTranslator for SimpleEventMessageTranslator {
    fn name(&self) -> &str {
        "simple"
    }

    fn to_message(&self, event: &Event) -> EventResult<Message> {
        if event.topic.is_empty() || event.name.is_empty() {
            return Err(EventError::Translation(format!(
                "event {} needs a topic and a name",
                event
            )));
        }
        ensure_not_reserved(event, &[NAME_KEY, VERSION_KEY])?;

        let mut body = serde_json::Map::with_capacity(event.attributes.len() + 2);
        body.insert(NAME_KEY.to_string(), Value::String(event.name.clone()));
        body.insert(VERSION_KEY.to_string(), Value::String(event.version.clone()));
        body.extend(event.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Message::new(event.topic.clone(), encode_body(body)?))
    }

    fn to_event(&self, message: &Message) -> EventResult<Event> {
        if message.topic.is_empty() {
            return Err(EventError::Translation("message has no topic".to_string()));
        }

        let mut body = parse_body(message)?;

        let name = match body.shift_remove(NAME_KEY) {
            Some(Value::String(name)) if !name.is_empty() => name,
            Some(_) => {
                return Err(EventError::Translation(format!(
                    "message on '{}' has a non-string or empty '{}' field",
                    message.topic, NAME_KEY
                )));
            }
            None => {
                return Err(EventError::Translation(format!(
                    "message on '{}' is missing the '{}' field",
                    message.topic, NAME_KEY
                )));
            }
        };

        let version = match body.shift_remove(VERSION_KEY) {
            Some(Value::String(version)) if !version.is_empty() => version,
            None => DEFAULT_VERSION.to_string(),
            Some(_) => {
                return Err(EventError::Translation(format!(
                    "message on '{}' has a non-string or empty '{}' field",
                    message.topic, VERSION_KEY
                )));
            }
        };

        let mut event = Event::versioned(message.topic.clone(), name, version);
        event.attributes = body;
        event.payload = Some(message.body.clone());
        Ok(event)
    }

    fn subscription_channel(&self, expression: &ListenExpression) -> String {
        expression.topic().unwrap_or("*").to_string()
    }
}
