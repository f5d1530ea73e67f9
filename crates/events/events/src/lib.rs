//! # PubSub Events
//!
//! Event layer on top of a publish/subscribe transport providing:
//! - Structured, versioned events translated to and from transport messages
//! - JSON schema validation with `$ref` resolution across prefixed loaders
//! - Attribute injectors enriching outgoing events
//! - Listener routing by `topic/name/version` expressions
//! - Configurable fail handlers for every non-fatal failure
//!
//! ## Example
//!
//! ```rust,ignore
//! use pubsub_events::{Event, EventManager, MemoryAdapter, handler_fn};
//! use std::sync::Arc;
//!
//! let manager = EventManager::new(Arc::new(MemoryAdapter::new()));
//!
//! // Listen to every version of user/created
//! manager.listen("user/created", handler_fn("audit", |event| async move {
//!     println!("User created: {:?}", event.attributes);
//!     Ok(())
//! })).await?;
//!
//! // Dispatch an event
//! manager.dispatch(Event::new("user", "created").with_attribute("id", 123)).await?;
//! ```

mod error;
mod event;
mod expression;
mod fail_handler;
mod handler;
mod injector;
mod manager;
pub mod config;
pub mod schema;
pub mod translator;
pub mod transport;

pub use config::{EventsConfig, TranslatorKind, ValidatorKind, load_config};
pub use error::{EventError, EventResult};
pub use event::{DEFAULT_VERSION, Event, Message};
pub use expression::{ListenExpression, VersionMatcher};
pub use fail_handler::{
    FailureStage, ListenExprFailHandler, ListenExprFailure, LoggingFailHandler, NoopFailHandler,
    TranslateFailHandler, TranslateFailure, TranslateInput, ValidationFailHandler, ValidationFailure,
};
pub use handler::{BoxedHandler, EventHandler, FilteredHandler, FnHandler, SharedHandler, handler_fn};
pub use injector::AttributeInjector;
pub use manager::{EventManager, EventManagerBuilder};
pub use schema::{
    ArrayLoader, Dereferencer, EventValidator, JsonSchemaEventValidator, SchemaLoader, ValidationError,
    ValidationResult,
};
pub use translator::{
    MessageTranslator, SchemaEventMessageTranslator, SimpleEventMessageTranslator, TopicEventMessageTranslator,
};
pub use transport::{MemoryAdapter, MessageSubscriber, PubSubAdapter};
