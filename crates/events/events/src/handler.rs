//! Listener callbacks invoked for matching inbound events.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::EventResult;
use crate::event::Event;

/// Trait for listener callbacks.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns an identifier for this handler, used in logs.
    fn id(&self) -> &str {
        "anonymous"
    }

    /// Handles an event.
    async fn handle(&self, event: &Event) -> EventResult<()>;
}

/// A boxed event handler.
pub type BoxedHandler = Box<dyn EventHandler>;

/// Wrapper for closure-based handlers.
///
/// The closure receives its own copy of the event so the returned future
/// does not borrow from the caller.
pub struct FnHandler<F> {
    id: String,
    handler: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = EventResult<()>> + Send,
{
    /// Creates a new function handler.
    pub fn new(id: impl Into<String>, handler: F) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = EventResult<()>> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, event: &Event) -> EventResult<()> {
        (self.handler)(event.clone()).await
    }
}

/// Shortcut for [`FnHandler::new`].
pub fn handler_fn<F, Fut>(id: impl Into<String>, handler: F) -> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = EventResult<()>> + Send,
{
    FnHandler::new(id, handler)
}

/// Handler that wraps an Arc for shared ownership.
pub struct SharedHandler {
    inner: Arc<dyn EventHandler>,
}

impl SharedHandler {
    /// Creates a new shared handler.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { inner: handler }
    }
}

#[async_trait]
impl EventHandler for SharedHandler {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn handle(&self, event: &Event) -> EventResult<()> {
        self.inner.handle(event).await
    }
}

/// Handler that only forwards events accepted by a predicate.
pub struct FilteredHandler<H: EventHandler> {
    inner: H,
    filter: Box<dyn Fn(&Event) -> bool + Send + Sync>,
}

impl<H: EventHandler> FilteredHandler<H> {
    /// Creates a new filtered handler.
    pub fn new(inner: H, filter: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        Self {
            inner,
            filter: Box::new(filter),
        }
    }
}

#[async_trait]
impl<H: EventHandler> EventHandler for FilteredHandler<H> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn handle(&self, event: &Event) -> EventResult<()> {
        if (self.filter)(event) {
            self.inner.handle(event).await
        } else {
            Ok(())
        }
    }
}
