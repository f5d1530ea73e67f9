//! Event and message types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EventResult;

/// Version assigned to events that do not state one.
pub const DEFAULT_VERSION: &str = "1.0";

/// A structured, versioned, named event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic the event belongs to (e.g., "user").
    pub topic: String,
    /// Event name within the topic (e.g., "created").
    pub name: String,
    /// Schema version of the event (e.g., "1.0").
    pub version: String,
    /// Event attributes, in insertion order.
    pub attributes: Map<String, Value>,
    /// Raw message body an inbound event was decoded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Event {
    /// Creates a new event with the default version and no attributes.
    pub fn new(topic: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name: name.into(),
            version: DEFAULT_VERSION.to_string(),
            attributes: Map::new(),
            payload: None,
        }
    }

    /// Creates an event with a specific version.
    pub fn versioned(
        topic: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::new(topic, name).with_version(version)
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Adds or overwrites an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replaces all attributes.
    ///
    /// Non-object values are ignored.
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        if let Value::Object(map) = attributes {
            self.attributes = map;
        }
        self
    }

    /// Adds or overwrites an attribute in place.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Returns an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns `true` if the attribute is set.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Returns the attributes as a JSON object value.
    pub fn attributes_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    /// Deserializes the attributes to a specific type.
    pub fn attributes_as<T: for<'de> Deserialize<'de>>(&self) -> EventResult<T> {
        Ok(serde_json::from_value(self.attributes_value())?)
    }

    /// Returns the qualified identity string (e.g., "user/created/1.0").
    pub fn qualified_name(&self) -> String {
        format!("{}/{}/{}", self.topic, self.name, self.version)
    }
}

/// Events compare by topic, name, version and attributes.
/// The raw payload an inbound event came from is not part of its identity.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic
            && self.name == other.name
            && self.version == other.version
            && self.attributes == other.attributes
    }
}

impl Eq for Event {}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.topic, self.name, self.version)
    }
}

/// A transport-level envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Transport topic (channel) the message travels on.
    pub topic: String,
    /// Message body, normally JSON text.
    pub body: String,
}

impl Message {
    /// Creates a new message.
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
        }
    }

    /// Creates a message whose body is the JSON encoding of `value`.
    pub fn json(topic: impl Into<String>, value: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_string(value)?))
    }

    /// Parses the body as JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}
