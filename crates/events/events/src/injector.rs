//! Attribute injectors enriching outgoing events.

use crate::error::EventResult;
use crate::event::Event;

/// Trait for computing attributes on an event before it is dispatched.
///
/// Injectors run once per dispatch, in the order they were configured, each
/// receiving the output of the previous one. They never run on inbound
/// events. A failing injector aborts the dispatch: its error is returned to
/// the caller as is, no fail handler is involved.
pub trait AttributeInjector: Send + Sync {
    /// Returns an identifier used in errors and logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Adds or overwrites attributes on the event.
    fn inject(&self, event: Event) -> EventResult<Event>;
}

impl<F> AttributeInjector for F
where
    F: Fn(Event) -> EventResult<Event> + Send + Sync,
{
    fn inject(&self, event: Event) -> EventResult<Event> {
        self(event)
    }
}

/// Runs injectors in order over an event.
pub(crate) fn apply_injectors(injectors: &[Box<dyn AttributeInjector>], mut event: Event) -> EventResult<Event> {
    for injector in injectors {
        event = injector.inject(event)?;
        tracing::trace!(injector = injector.name(), event = %event, "Applied attribute injector");
    }
    Ok(event)
}
