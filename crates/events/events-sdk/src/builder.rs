//! Event builder utilities for producers.

use pubsub_events::{DEFAULT_VERSION, Event, EventError, EventResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Builder for creating events with producer-specific defaults.
pub struct EventBuilder {
    topic: String,
    version: String,
    default_attributes: Map<String, Value>,
}

impl EventBuilder {
    /// Creates a builder for events on `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            version: DEFAULT_VERSION.to_string(),
            default_attributes: Map::new(),
        }
    }

    /// Sets the version given to built events.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Adds an attribute to all events.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_attributes.insert(key.into(), value.into());
        self
    }

    /// Builds an event; `attributes` override the defaults.
    ///
    /// `attributes` must serialize to a JSON object, or to null for none.
    pub fn build(&self, name: impl Into<String>, attributes: impl Serialize) -> EventResult<Event> {
        let mut event = self.build_simple(name);

        match serde_json::to_value(attributes)? {
            Value::Object(map) => event.attributes.extend(map),
            Value::Null => {}
            other => {
                return Err(EventError::SerializationError(format!(
                    "attributes of {} must be a JSON object, got {}",
                    event, other
                )));
            }
        }

        Ok(event)
    }

    /// Builds an event carrying only the default attributes.
    pub fn build_simple(&self, name: impl Into<String>) -> Event {
        let mut event = Event::versioned(self.topic.clone(), name, self.version.clone());
        event.attributes = self.default_attributes.clone();
        event
    }

    /// Creates a builder for the same topic at a different version.
    pub fn at_version(&self, version: impl Into<String>) -> Self {
        Self {
            topic: self.topic.clone(),
            version: version.into(),
            default_attributes: self.default_attributes.clone(),
        }
    }
}

/// Builder for constructing event attributes.
pub struct EventPayloadBuilder {
    data: Map<String, Value>,
}

impl EventPayloadBuilder {
    /// Creates a new payload builder.
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    /// Adds a field to the payload.
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.data.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    /// Adds a string field.
    pub fn string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(key, value.into())
    }

    /// Adds an integer field.
    pub fn int(self, key: impl Into<String>, value: i64) -> Self {
        self.field(key, value)
    }

    /// Adds a boolean field.
    pub fn bool(self, key: impl Into<String>, value: bool) -> Self {
        self.field(key, value)
    }

    /// Adds a nested object field.
    pub fn object(self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.field(key, value)
    }

    /// Adds an optional field (only if Some).
    pub fn optional<T: Serialize>(self, key: impl Into<String>, value: Option<T>) -> Self {
        if let Some(v) = value {
            self.field(key, v)
        } else {
            self
        }
    }

    /// Builds the payload as a JSON Value.
    pub fn build(self) -> Value {
        Value::Object(self.data)
    }

    /// Builds the payload and creates an event with the default version.
    pub fn into_event(self, topic: impl Into<String>, name: impl Into<String>) -> Event {
        let mut event = Event::new(topic, name);
        event.attributes = self.data;
        event
    }
}

impl Default for EventPayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
