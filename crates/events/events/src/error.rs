//! Event error types.

use thiserror::Error;

use crate::schema::ValidationError;

/// Result type for event operations.
pub type EventResult<T> = Result<T, EventError>;

/// Error type for event handling.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// A message could not be turned into an event, or the other way round.
    #[error("Translation error: {0}")]
    Translation(String),

    /// No listener expression matched an inbound event.
    #[error("No listener expression matched event {0}")]
    ListenMatch(String),

    /// The event violated its schema.
    #[error("Validation failed for {event}: {} violation(s)", .errors.len())]
    ValidationFailed {
        /// Display form of the offending event (`topic/name/version`).
        event: String,
        /// Every violation found.
        errors: Vec<ValidationError>,
    },

    /// No schema loader is registered for the URI prefix.
    #[error("Unknown schema scheme: {0}")]
    UnknownScheme(String),

    /// The loader has no schema under the requested key.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// Schema references loop back onto themselves.
    #[error("Cyclic schema reference: {0}")]
    CyclicReference(String),

    /// An attribute injector failed.
    #[error("Attribute injector '{injector}' failed: {reason}")]
    Injector {
        /// Name of the failing injector.
        injector: String,
        /// What went wrong.
        reason: String,
    },

    /// A listen expression could not be parsed.
    #[error("Invalid listen expression: {0}")]
    InvalidExpression(String),

    /// A schema identifier is not of the form `prefix://path`.
    #[error("Invalid schema URI: {0}")]
    InvalidSchemaUri(String),

    /// A raw schema document is not valid JSON.
    #[error("Schema parse error for '{key}': {reason}")]
    SchemaParse {
        /// Loader key of the schema.
        key: String,
        /// Parser message.
        reason: String,
    },

    /// The pub/sub transport rejected an operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Event serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration could not be read or applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EventError {
    /// Builds an [`EventError::Injector`] for the named injector.
    pub fn injector(injector: impl Into<String>, reason: impl Into<String>) -> Self {
        EventError::Injector {
            injector: injector.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for the schema resolution failures
    /// (unknown scheme, missing schema, cyclic reference, bad URI, parse error).
    pub fn is_schema_resolution(&self) -> bool {
        matches!(
            self,
            EventError::UnknownScheme(_)
                | EventError::SchemaNotFound(_)
                | EventError::CyclicReference(_)
                | EventError::InvalidSchemaUri(_)
                | EventError::SchemaParse { .. }
        )
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::SerializationError(err.to_string())
    }
}
