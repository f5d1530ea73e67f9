//! Fail handlers invoked instead of raising hard errors.
//!
//! Each failure category has its own single-method handler trait receiving a
//! structured context. Closures of the matching signature implement the
//! traits, and [`LoggingFailHandler`] / [`NoopFailHandler`] implement all three.

use crate::error::EventError;
use crate::event::{Event, Message};
use crate::schema::ValidationError;

/// What a translator was working on when it failed.
#[derive(Debug, Clone)]
pub enum TranslateInput {
    /// An inbound transport message that could not become an event.
    Inbound(Message),
    /// An outbound event that could not become a message.
    Outbound(Event),
}

/// Context of a translation failure.
#[derive(Debug, Clone)]
pub struct TranslateFailure {
    pub input: TranslateInput,
    pub error: EventError,
}

/// Context of an inbound event no listener expression matched.
#[derive(Debug, Clone)]
pub struct ListenExprFailure {
    pub event: Event,
    /// Transport channel the event arrived on.
    pub channel: String,
    /// Expressions registered on that channel, in registration order.
    pub expressions: Vec<String>,
    /// Always [`EventError::ListenMatch`].
    pub error: EventError,
}

/// Where a validation failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// While dispatching an outgoing event.
    Dispatch,
    /// While delivering an inbound event to listeners.
    Listen,
}

/// Context of a validation failure.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub event: Event,
    pub stage: FailureStage,
    /// Listener expression whose callback was skipped, `None` on dispatch.
    pub expression: Option<String>,
    /// Schema identifier the event was checked against.
    pub schema: String,
    pub errors: Vec<ValidationError>,
}

/// Handler for translation failures.
pub trait TranslateFailHandler: Send + Sync {
    fn on_translate_failure(&self, failure: &TranslateFailure);
}

/// Handler for inbound events matching no listener expression.
pub trait ListenExprFailHandler: Send + Sync {
    fn on_unmatched(&self, failure: &ListenExprFailure);
}

/// Handler for validation failures.
pub trait ValidationFailHandler: Send + Sync {
    fn on_validation_failure(&self, failure: &ValidationFailure);
}

impl<F> TranslateFailHandler for F
where
    F: Fn(&TranslateFailure) + Send + Sync,
{
    fn on_translate_failure(&self, failure: &TranslateFailure) {
        self(failure)
    }
}

impl<F> ListenExprFailHandler for F
where
    F: Fn(&ListenExprFailure) + Send + Sync,
{
    fn on_unmatched(&self, failure: &ListenExprFailure) {
        self(failure)
    }
}

impl<F> ValidationFailHandler for F
where
    F: Fn(&ValidationFailure) + Send + Sync,
{
    fn on_validation_failure(&self, failure: &ValidationFailure) {
        self(failure)
    }
}

/// Handler that logs every failure with `tracing` and drops the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFailHandler;

impl TranslateFailHandler for LoggingFailHandler {
    fn on_translate_failure(&self, failure: &TranslateFailure) {
        match &failure.input {
            TranslateInput::Inbound(message) => tracing::warn!(
                topic = %message.topic,
                error = %failure.error,
                "Dropped inbound message that could not be translated"
            ),
            TranslateInput::Outbound(event) => tracing::warn!(
                event = %event,
                error = %failure.error,
                "Dropped outbound event that could not be translated"
            ),
        }
    }
}

impl ListenExprFailHandler for LoggingFailHandler {
    fn on_unmatched(&self, failure: &ListenExprFailure) {
        tracing::warn!(
            event = %failure.event,
            channel = %failure.channel,
            expressions = ?failure.expressions,
            error = %failure.error,
            "No listener expression matched inbound event"
        );
    }
}

impl ValidationFailHandler for LoggingFailHandler {
    fn on_validation_failure(&self, failure: &ValidationFailure) {
        let errors: Vec<String> = failure.errors.iter().map(ToString::to_string).collect();
        tracing::warn!(
            event = %failure.event,
            stage = ?failure.stage,
            expression = ?failure.expression,
            schema = %failure.schema,
            errors = ?errors,
            "Event failed schema validation"
        );
    }
}

/// Handler that silently drops the failing input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFailHandler;

impl TranslateFailHandler for NoopFailHandler {
    fn on_translate_failure(&self, _failure: &TranslateFailure) {}
}

impl ListenExprFailHandler for NoopFailHandler {
    fn on_unmatched(&self, _failure: &ListenExprFailure) {}
}

impl ValidationFailHandler for NoopFailHandler {
    fn on_validation_failure(&self, _failure: &ValidationFailure) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closures_are_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = move |failure: &TranslateFailure| {
            assert!(matches!(failure.input, TranslateInput::Inbound(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        };

        let failure = TranslateFailure {
            input: TranslateInput::Inbound(Message::new("user", "garbage")),
            error: EventError::Translation("not json".to_string()),
        };
        TranslateFailHandler::on_translate_failure(&handler, &failure);
        TranslateFailHandler::on_translate_failure(&handler, &failure);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stock_handlers_accept_every_failure() {
        let unmatched = ListenExprFailure {
            event: Event::new("user", "created"),
            channel: "user".to_string(),
            expressions: vec!["user/deleted".to_string()],
            error: EventError::ListenMatch("user/created/1.0".to_string()),
        };
        let invalid = ValidationFailure {
            event: Event::new("user", "created"),
            stage: FailureStage::Listen,
            expression: Some("user/created".to_string()),
            schema: "array://events/user/created/1.0.json".to_string(),
            errors: vec![ValidationError::new("id", "required", "Required field 'id' is missing")],
        };

        LoggingFailHandler.on_unmatched(&unmatched);
        LoggingFailHandler.on_validation_failure(&invalid);
        NoopFailHandler.on_unmatched(&unmatched);
        NoopFailHandler.on_validation_failure(&invalid);
    }
}
