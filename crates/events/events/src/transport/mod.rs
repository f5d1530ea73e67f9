//! Interface to the underlying publish/subscribe transport.

mod memory;

pub use memory::{DEFAULT_HISTORY_SIZE, MemoryAdapter, channel_matches};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EventResult;
use crate::event::Message;

/// Receives messages delivered on a subscribed channel.
#[async_trait]
pub trait MessageSubscriber: Send + Sync {
    /// Called once per delivered message.
    async fn on_message(&self, message: Message);
}

/// Trait for pub/sub transports the event manager publishes through.
///
/// Channels are `/`-separated; a `*` segment in a subscription channel
/// matches any single segment of a published topic.
#[async_trait]
pub trait PubSubAdapter: Send + Sync {
    /// Publishes a message on `message.topic`.
    async fn publish(&self, message: Message) -> EventResult<()>;

    /// Subscribes to every message whose topic matches `channel`.
    async fn subscribe(&self, channel: &str, subscriber: Arc<dyn MessageSubscriber>) -> EventResult<()>;
}
