//! # PubSub Events SDK
//!
//! SDK for integrating components with the pub/sub event layer.
//!
//! This crate provides traits and utilities to:
//! - Enrich outgoing events with stock attribute injectors
//! - Build events with producer defaults
//! - Declare and register event subscriptions
//!
//! ## Example
//!
//! ```rust,ignore
//! use pubsub_events_sdk::{DateAttributeInjector, EventBuilder, EventManager, MemoryAdapter};
//! use std::sync::Arc;
//!
//! let manager = EventManager::builder(Arc::new(MemoryAdapter::new()))
//!     .injector(DateAttributeInjector::new())
//!     .build();
//!
//! let users = EventBuilder::new("user").with_attribute("service", "accounts");
//! manager.dispatch(users.build("created", serde_json::json!({ "id": 123 }))?).await?;
//! ```

mod builder;
mod injectors;
mod traits;

pub use builder::{EventBuilder, EventPayloadBuilder};
pub use injectors::{
    DateAttributeInjector, FnAttributeInjector, GenericAttributeInjector, HostnameAttributeInjector,
    UuidAttributeInjector, configure_manager, stock_injector,
};
pub use traits::{EventPublisher, EventSubscriber, register_subscriber};

// Re-export core event types for convenience
pub use pubsub_events::{
    AttributeInjector, Event, EventError, EventHandler, EventManager, EventManagerBuilder, EventResult,
    EventsConfig, MemoryAdapter, Message, handler_fn,
};
