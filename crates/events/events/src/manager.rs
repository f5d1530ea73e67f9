//! Event manager tying translator, validator, injectors and transport together.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use crate::error::{EventError, EventResult};
use crate::event::{Event, Message};
use crate::expression::ListenExpression;
use crate::fail_handler::{
    FailureStage, ListenExprFailHandler, ListenExprFailure, LoggingFailHandler, TranslateFailHandler,
    TranslateFailure, TranslateInput, ValidationFailHandler, ValidationFailure,
};
use crate::handler::EventHandler;
use crate::injector::{AttributeInjector, apply_injectors};
use crate::schema::{EventValidator, ValidationResult};
use crate::transport::{MessageSubscriber, PubSubAdapter};
use crate::translator::{MessageTranslator, SimpleEventMessageTranslator};

/// A registered listener callback.
struct Listener {
    expression: ListenExpression,
    handler: Arc<dyn EventHandler>,
}

struct ManagerInner {
    adapter: Arc<dyn PubSubAdapter>,
    translator: Arc<dyn MessageTranslator>,
    validator: Option<Arc<dyn EventValidator>>,
    injectors: Vec<Box<dyn AttributeInjector>>,
    translate_fail_handler: Arc<dyn TranslateFailHandler>,
    listen_expr_fail_handler: Arc<dyn ListenExprFailHandler>,
    validation_fail_handler: Arc<dyn ValidationFailHandler>,
    throw_on_dispatch: AtomicBool,
    /// Listeners grouped by transport channel, in registration order.
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

/// Publishes events to and receives events from a pub/sub transport.
///
/// Cloning is cheap; clones share listeners and configuration.
#[derive(Clone)]
pub struct EventManager {
    inner: Arc<ManagerInner>,
}

impl EventManager {
    /// Starts building a manager on top of `adapter`.
    pub fn builder(adapter: Arc<dyn PubSubAdapter>) -> EventManagerBuilder {
        EventManagerBuilder::new(adapter)
    }

    /// Creates a manager with the simple translator, no validator and
    /// logging fail handlers.
    pub fn new(adapter: Arc<dyn PubSubAdapter>) -> Self {
        Self::builder(adapter).build()
    }

    /// Makes [`dispatch`](Self::dispatch) return validation failures to the caller.
    pub fn throw_validation_exceptions_on_dispatch(&self, enabled: bool) {
        self.inner.throw_on_dispatch.store(enabled, Ordering::SeqCst);
    }

    /// Returns `true` if dispatch validation failures are returned to the caller.
    pub fn throws_validation_exceptions_on_dispatch(&self) -> bool {
        self.inner.throw_on_dispatch.load(Ordering::SeqCst)
    }

    /// Injects attributes, validates, translates and publishes an event.
    ///
    /// Injector errors and transport errors are returned. An event failing
    /// validation is handed to the validation fail handler and not published;
    /// the error is returned only when
    /// [`throw_validation_exceptions_on_dispatch`](Self::throw_validation_exceptions_on_dispatch)
    /// is on. An event the translator rejects is handed to the translate fail
    /// handler and not published.
    pub async fn dispatch(&self, event: Event) -> EventResult<()> {
        let inner = &self.inner;
        let event = apply_injectors(&inner.injectors, event)?;

        if let Some(validator) = &inner.validator {
            let result = inner.validate(validator.as_ref(), &event).await;
            if !result.is_valid() {
                let failure = ValidationFailure {
                    event,
                    stage: FailureStage::Dispatch,
                    expression: None,
                    schema: result.schema,
                    errors: result.errors,
                };
                inner.validation_fail_handler.on_validation_failure(&failure);

                if self.throws_validation_exceptions_on_dispatch() {
                    return Err(EventError::ValidationFailed {
                        event: failure.event.to_string(),
                        errors: failure.errors,
                    });
                }
                return Ok(());
            }
        }

        let message = match inner.translator.to_message(&event) {
            Ok(message) => message,
            Err(error) => {
                inner.translate_fail_handler.on_translate_failure(&TranslateFailure {
                    input: TranslateInput::Outbound(event),
                    error,
                });
                return Ok(());
            }
        };

        tracing::debug!(topic = %message.topic, event = %event, "Publishing event");

        inner.adapter.publish(message).await.map_err(|e| match e {
            EventError::Transport(_) => e,
            other => EventError::Transport(other.to_string()),
        })
    }

    /// Dispatches events in order, stopping at the first returned error.
    pub async fn dispatch_batch(&self, events: impl IntoIterator<Item = Event>) -> EventResult<()> {
        for event in events {
            self.dispatch(event).await?;
        }
        Ok(())
    }

    /// Registers a callback for inbound events matching `expression`.
    ///
    /// The transport channel is the one the translator derives from the
    /// expression.
    pub async fn listen(&self, expression: &str, handler: impl EventHandler + 'static) -> EventResult<()> {
        let expression = ListenExpression::parse(expression)?;
        let channel = self.inner.translator.subscription_channel(&expression);
        self.register(channel, expression, Arc::new(handler)).await
    }

    /// Registers a callback for events arriving on an explicit transport channel.
    pub async fn listen_on(
        &self,
        channel: &str,
        expression: &str,
        handler: impl EventHandler + 'static,
    ) -> EventResult<()> {
        let expression = ListenExpression::parse(expression)?;
        self.register(channel.to_string(), expression, Arc::new(handler)).await
    }

    async fn register(
        &self,
        channel: String,
        expression: ListenExpression,
        handler: Arc<dyn EventHandler>,
    ) -> EventResult<()> {
        tracing::debug!(
            channel = %channel,
            expression = %expression,
            handler = handler.id(),
            "Registered listener"
        );

        // The lock is released before subscribing: transports may deliver
        // retained messages from inside `subscribe`.
        let first_on_channel = {
            let mut listeners = self.inner.listeners.write().await;
            let registered = listeners.entry(channel.clone()).or_default();
            registered.push(Listener {
                expression,
                handler: handler.clone(),
            });
            registered.len() == 1
        };

        if !first_on_channel {
            return Ok(());
        }

        let route = Arc::new(ChannelRoute {
            channel: channel.clone(),
            manager: Arc::downgrade(&self.inner),
        });

        match self.inner.adapter.subscribe(&channel, route).await {
            Ok(()) => {
                tracing::debug!(channel = %channel, "Subscribed manager to channel");
                Ok(())
            }
            Err(e) => {
                self.unregister(&channel, &handler).await;
                Err(e)
            }
        }
    }

    /// Removes a listener whose channel subscription failed.
    async fn unregister(&self, channel: &str, handler: &Arc<dyn EventHandler>) {
        let mut listeners = self.inner.listeners.write().await;
        if let Some(registered) = listeners.get_mut(channel) {
            registered.retain(|listener| !Arc::ptr_eq(&listener.handler, handler));
            if registered.is_empty() {
                listeners.remove(channel);
            }
        }
        tracing::debug!(channel = %channel, handler = handler.id(), "Rolled back listener");
    }

    /// Number of listeners registered on a channel.
    pub async fn listener_count(&self, channel: &str) -> usize {
        self.inner
            .listeners
            .read()
            .await
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Channels the manager is subscribed to, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.inner.listeners.read().await.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn translator(&self) -> &Arc<dyn MessageTranslator> {
        &self.inner.translator
    }

    pub fn validator(&self) -> Option<&Arc<dyn EventValidator>> {
        self.inner.validator.as_ref()
    }

    pub fn adapter(&self) -> &Arc<dyn PubSubAdapter> {
        &self.inner.adapter
    }
}

impl ManagerInner {
    async fn validate(&self, validator: &dyn EventValidator, event: &Event) -> ValidationResult {
        match self.translator.schema_uri(event) {
            Some(uri) => validator.validate_against(event, &uri).await,
            None => validator.validate(event).await,
        }
    }

    async fn handle_inbound(&self, channel: &str, message: Message) {
        let event = match self.translator.to_event(&message) {
            Ok(event) => event,
            Err(error) => {
                self.translate_fail_handler.on_translate_failure(&TranslateFailure {
                    input: TranslateInput::Inbound(message),
                    error,
                });
                return;
            }
        };

        let (matching, expressions) = {
            let listeners = self.listeners.read().await;
            let registered = listeners.get(channel).map(Vec::as_slice).unwrap_or_default();
            let matching: Vec<(String, Arc<dyn EventHandler>)> = registered
                .iter()
                .filter(|listener| listener.expression.matches(&event))
                .map(|listener| (listener.expression.to_string(), listener.handler.clone()))
                .collect();
            let expressions: Vec<String> = registered
                .iter()
                .map(|listener| listener.expression.to_string())
                .collect();
            (matching, expressions)
        };

        if matching.is_empty() {
            self.listen_expr_fail_handler.on_unmatched(&ListenExprFailure {
                error: EventError::ListenMatch(event.to_string()),
                event,
                channel: channel.to_string(),
                expressions,
            });
            return;
        }

        let validation = match &self.validator {
            Some(validator) => Some(self.validate(validator.as_ref(), &event).await),
            None => None,
        };

        tracing::debug!(channel = %channel, event = %event, listeners = matching.len(), "Delivering event");

        for (expression, handler) in matching {
            if let Some(result) = validation.as_ref().filter(|result| !result.is_valid()) {
                self.validation_fail_handler.on_validation_failure(&ValidationFailure {
                    event: event.clone(),
                    stage: FailureStage::Listen,
                    expression: Some(expression),
                    schema: result.schema.clone(),
                    errors: result.errors.clone(),
                });
                continue;
            }

            if let Err(e) = handler.handle(&event).await {
                tracing::error!("Event handler '{}' error: {}", handler.id(), e);
            }
        }
    }
}

/// Transport subscription forwarding one channel's messages to the manager.
struct ChannelRoute {
    channel: String,
    manager: Weak<ManagerInner>,
}

#[async_trait]
impl MessageSubscriber for ChannelRoute {
    async fn on_message(&self, message: Message) {
        match self.manager.upgrade() {
            Some(manager) => manager.handle_inbound(&self.channel, message).await,
            None => tracing::debug!(channel = %self.channel, "Event manager dropped, ignoring message"),
        }
    }
}

/// Builder for [`EventManager`].
pub struct EventManagerBuilder {
    adapter: Arc<dyn PubSubAdapter>,
    translator: Arc<dyn MessageTranslator>,
    validator: Option<Arc<dyn EventValidator>>,
    injectors: Vec<Box<dyn AttributeInjector>>,
    translate_fail_handler: Arc<dyn TranslateFailHandler>,
    listen_expr_fail_handler: Arc<dyn ListenExprFailHandler>,
    validation_fail_handler: Arc<dyn ValidationFailHandler>,
    throw_on_dispatch: bool,
}

impl EventManagerBuilder {
    pub fn new(adapter: Arc<dyn PubSubAdapter>) -> Self {
        Self {
            adapter,
            translator: Arc::new(SimpleEventMessageTranslator::new()),
            validator: None,
            injectors: Vec::new(),
            translate_fail_handler: Arc::new(LoggingFailHandler),
            listen_expr_fail_handler: Arc::new(LoggingFailHandler),
            validation_fail_handler: Arc::new(LoggingFailHandler),
            throw_on_dispatch: false,
        }
    }

    pub fn translator(mut self, translator: impl MessageTranslator + 'static) -> Self {
        self.translator = Arc::new(translator);
        self
    }

    pub fn shared_translator(mut self, translator: Arc<dyn MessageTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn validator(mut self, validator: impl EventValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn shared_validator(mut self, validator: Arc<dyn EventValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Disables validation.
    pub fn without_validator(mut self) -> Self {
        self.validator = None;
        self
    }

    /// Appends an injector; injectors run in the order they were added.
    pub fn injector(mut self, injector: impl AttributeInjector + 'static) -> Self {
        self.injectors.push(Box::new(injector));
        self
    }

    /// Appends an already boxed injector.
    pub fn boxed_injector(mut self, injector: Box<dyn AttributeInjector>) -> Self {
        self.injectors.push(injector);
        self
    }

    pub fn translate_fail_handler(mut self, handler: impl TranslateFailHandler + 'static) -> Self {
        self.translate_fail_handler = Arc::new(handler);
        self
    }

    pub fn listen_expr_fail_handler(mut self, handler: impl ListenExprFailHandler + 'static) -> Self {
        self.listen_expr_fail_handler = Arc::new(handler);
        self
    }

    pub fn validation_fail_handler(mut self, handler: impl ValidationFailHandler + 'static) -> Self {
        self.validation_fail_handler = Arc::new(handler);
        self
    }

    /// Uses one handler for all three failure categories.
    pub fn fail_handler<H>(mut self, handler: H) -> Self
    where
        H: TranslateFailHandler + ListenExprFailHandler + ValidationFailHandler + 'static,
    {
        let handler = Arc::new(handler);
        self.translate_fail_handler = handler.clone();
        self.listen_expr_fail_handler = handler.clone();
        self.validation_fail_handler = handler;
        self
    }

    pub fn throw_validation_exceptions_on_dispatch(mut self, enabled: bool) -> Self {
        self.throw_on_dispatch = enabled;
        self
    }

    pub fn build(self) -> EventManager {
        tracing::debug!(
            translator = self.translator.name(),
            validator = self.validator.is_some(),
            injectors = self.injectors.len(),
            "Built event manager"
        );

        EventManager {
            inner: Arc::new(ManagerInner {
                adapter: self.adapter,
                translator: self.translator,
                validator: self.validator,
                injectors: self.injectors,
                translate_fail_handler: self.translate_fail_handler,
                listen_expr_fail_handler: self.listen_expr_fail_handler,
                validation_fail_handler: self.validation_fail_handler,
                throw_on_dispatch: AtomicBool::new(self.throw_on_dispatch),
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::transport::MemoryAdapter;

    struct TestHandler {
        id: String,
        calls: Arc<RwLock<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for TestHandler {
        fn id(&self) -> &str {
            &self.id
        }

        async fn handle(&self, event: &Event) -> EventResult<()> {
            self.calls
                .write()
                .await
                .push(format!("{}:{}", self.id, event.qualified_name()));
            Ok(())
        }
    }

    fn recorder(id: &str, calls: &Arc<RwLock<Vec<String>>>) -> TestHandler {
        TestHandler {
            id: id.to_string(),
            calls: calls.clone(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_publishes_once() {
        let adapter = Arc::new(MemoryAdapter::new());
        let manager = EventManager::new(adapter.clone());

        manager.dispatch(Event::new("user", "created")).await.unwrap();

        let published = adapter.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "user");
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let adapter = Arc::new(MemoryAdapter::new());
        let manager = EventManager::new(adapter.clone());
        let calls = Arc::new(RwLock::new(Vec::new()));

        manager.listen("user/created", recorder("first", &calls)).await.unwrap();
        manager.listen("user", recorder("second", &calls)).await.unwrap();
        manager.listen("user/deleted", recorder("skipped", &calls)).await.unwrap();

        manager.dispatch(Event::new("user", "created")).await.unwrap();

        assert_eq!(
            *calls.read().await,
            vec!["first:user/created/1.0", "second:user/created/1.0"]
        );
        assert_eq!(manager.listener_count("user").await, 3);
        assert_eq!(adapter.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_others() {
        let adapter = Arc::new(MemoryAdapter::new());
        let manager = EventManager::new(adapter);
        let calls = Arc::new(RwLock::new(Vec::new()));

        manager
            .listen(
                "user",
                handler_fn("broken", |_event: Event| async {
                    Err(EventError::Internal("boom".to_string()))
                }),
            )
            .await
            .unwrap();
        manager.listen("user", recorder("after", &calls)).await.unwrap();

        manager.dispatch(Event::new("user", "created")).await.unwrap();

        assert_eq!(*calls.read().await, vec!["after:user/created/1.0"]);
    }

    #[tokio::test]
    async fn test_invalid_expression_is_rejected() {
        let manager = EventManager::new(Arc::new(MemoryAdapter::new()));
        let calls = Arc::new(RwLock::new(Vec::new()));

        let result = manager.listen("a/b/c/d", recorder("x", &calls)).await;
        assert!(matches!(result, Err(EventError::InvalidExpression(_))));
        assert!(manager.channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_manager_ignores_messages() {
        let adapter = Arc::new(MemoryAdapter::new());
        let calls = Arc::new(RwLock::new(Vec::new()));
        {
            let manager = EventManager::new(adapter.clone());
            manager.listen("user", recorder("gone", &calls)).await.unwrap();
        }

        adapter
            .publish(Message::new("user", r#"{"event": "created"}"#))
            .await
            .unwrap();

        assert!(calls.read().await.is_empty());
    }

    /// Transport replaying a retained message to every new subscriber.
    struct RetainedAdapter {
        retained: Message,
    }

    #[async_trait]
    impl PubSubAdapter for RetainedAdapter {
        async fn publish(&self, _message: Message) -> EventResult<()> {
            Ok(())
        }

        async fn subscribe(&self, _channel: &str, subscriber: Arc<dyn MessageSubscriber>) -> EventResult<()> {
            subscriber.on_message(self.retained.clone()).await;
            Ok(())
        }
    }

    struct RejectingAdapter;

    #[async_trait]
    impl PubSubAdapter for RejectingAdapter {
        async fn publish(&self, _message: Message) -> EventResult<()> {
            Ok(())
        }

        async fn subscribe(&self, channel: &str, _subscriber: Arc<dyn MessageSubscriber>) -> EventResult<()> {
            Err(EventError::Transport(format!("cannot subscribe to {}", channel)))
        }
    }

    #[tokio::test]
    async fn test_retained_message_delivered_during_subscribe() {
        let adapter = Arc::new(RetainedAdapter {
            retained: Message::new("user", r#"{"event": "created"}"#),
        });
        let manager = EventManager::new(adapter);
        let calls = Arc::new(RwLock::new(Vec::new()));

        let registered = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            manager.listen("user", recorder("retained", &calls)),
        )
        .await;

        assert!(matches!(registered, Ok(Ok(()))));
        assert_eq!(*calls.read().await, vec!["retained:user/created/1.0"]);
        assert_eq!(manager.listener_count("user").await, 1);
    }

    #[tokio::test]
    async fn test_failed_subscribe_rolls_back_listener() {
        let manager = EventManager::new(Arc::new(RejectingAdapter));
        let calls = Arc::new(RwLock::new(Vec::new()));

        let result = manager.listen("user", recorder("x", &calls)).await;

        assert!(matches!(result, Err(EventError::Transport(_))));
        assert_eq!(manager.listener_count("user").await, 0);
        assert!(manager.channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_inbound_event_reported_per_matching_expression() {
        use crate::schema::{ArrayLoader, Dereferencer, JsonSchemaEventValidator};
        use serde_json::json;
        use std::sync::Mutex;

        let loader = ArrayLoader::new().with_schema(
            "events/user/created/1.0.json",
            json!({"type": "object", "properties": {"id": {"type": "integer"}}}),
        );
        let validator = JsonSchemaEventValidator::new(Arc::new(Dereferencer::new().with_loader(loader, "array")));

        let skipped = Arc::new(Mutex::new(Vec::new()));
        let sink = skipped.clone();
        let adapter = Arc::new(MemoryAdapter::new());
        let manager = EventManager::builder(adapter.clone())
            .validator(validator)
            .validation_fail_handler(move |failure: &ValidationFailure| {
                sink.lock().unwrap().push(failure.expression.clone());
            })
            .build();
        let calls = Arc::new(RwLock::new(Vec::new()));

        manager.listen("user/created", recorder("first", &calls)).await.unwrap();
        manager.listen("user", recorder("second", &calls)).await.unwrap();

        adapter
            .publish(Message::new("user", r#"{"event": "created", "id": "x"}"#))
            .await
            .unwrap();

        assert!(calls.read().await.is_empty());
        assert_eq!(
            *skipped.lock().unwrap(),
            vec![Some("user/created".to_string()), Some("user".to_string())]
        );
    }

    #[tokio::test]
    async fn test_toggle_after_construction() {
        let manager = EventManager::builder(Arc::new(MemoryAdapter::new()))
            .throw_validation_exceptions_on_dispatch(true)
            .build();
        assert!(manager.throws_validation_exceptions_on_dispatch());

        manager.throw_validation_exceptions_on_dispatch(false);
        assert!(!manager.clone().throws_validation_exceptions_on_dispatch());
    }
}
