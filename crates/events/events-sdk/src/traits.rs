//! Traits for components integrating with the event manager.

use std::future::Future;
use std::sync::Arc;

use pubsub_events::{Event, EventHandler, EventManager, EventResult, SharedHandler};

/// Trait for components that listen to events.
///
/// Implement this trait to declare which events a component reacts to and
/// register them all at once with [`register_subscriber`].
pub trait EventSubscriber {
    /// Returns listen expressions with the handler for each.
    ///
    /// Expressions have the form `topic[/name[/version]]`:
    /// - Exact match: "user/created/1.0"
    /// - Any version: "user/created"
    /// - Major version: "user/created/1.*"
    /// - All events: "*"
    fn subscriptions(&self) -> Vec<(String, Box<dyn EventHandler>)>;
}

/// Trait for components that dispatch events through a manager.
pub trait EventPublisher: Sync {
    /// Returns the manager events are dispatched through.
    fn event_manager(&self) -> &EventManager;

    /// Dispatches an event.
    fn publish(&self, event: Event) -> impl Future<Output = EventResult<()>> + Send {
        async move { self.event_manager().dispatch(event).await }
    }

    /// Dispatches several events in order.
    fn publish_all(&self, events: Vec<Event>) -> impl Future<Output = EventResult<()>> + Send {
        async move { self.event_manager().dispatch_batch(events).await }
    }
}

/// Registers every subscription of `subscriber` with `manager`.
///
/// Stops at the first expression the manager rejects.
pub async fn register_subscriber<S: EventSubscriber + ?Sized>(manager: &EventManager, subscriber: &S) -> EventResult<()> {
    for (expression, handler) in subscriber.subscriptions() {
        let handler: Arc<dyn EventHandler> = Arc::from(handler);
        manager.listen(&expression, SharedHandler::new(handler)).await?;
    }
    Ok(())
}
