use super::{
    MessageTranslator, encode_body, parse_body, parse_qualified_topic, qualified_channel, qualified_topic,
};
use crate::error::EventResult;
use crate::event::{Event, Message};
use crate::expression::ListenExpression;

/// Translator that encodes topic, name and version in the transport topic.
///
/// A `user/created/1.0` message carries only the event attributes as its body.
/// Segments must not contain the `/` delimiter.
#[derive(Debug, Clone, Default)]
pub struct TopicEventMessageTranslator;

impl TopicEventMessageTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl MessageTranslator for TopicEventMessageTranslator {
    fn name(&self) -> &str {
        "topic"
    }

    fn to_message(&self, event: &Event) -> EventResult<Message> {
        let topic = qualified_topic(event)?;
        Ok(Message::new(topic, encode_body(event.attributes.clone())?))
    }

    fn to_event(&self, message: &Message) -> EventResult<Event> {
        let (topic, name, version) = parse_qualified_topic(&message.topic)?;
        let attributes = parse_body(message)?;

        let mut event = Event::versioned(topic, name, version);
        event.attributes = attributes;
        event.payload = Some(message.body.clone());
        Ok(event)
    }

    fn subscription_channel(&self, expression: &ListenExpression) -> String {
        qualified_channel(expression)
    }
}
