use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{MessageSubscriber, PubSubAdapter};
use crate::error::{EventError, EventResult};
use crate::event::Message;

/// History size used by [`MemoryAdapter::new`].
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

const WILDCARD: &str = "*";

/// Checks a published topic against a subscription channel.
pub fn channel_matches(channel: &str, topic: &str) -> bool {
    let mut patterns = channel.split('/');
    let mut segments = topic.split('/');
    loop {
        match (patterns.next(), segments.next()) {
            (None, None) => return true,
            (Some(pattern), Some(segment)) if pattern == WILDCARD || pattern == segment => {}
            _ => return false,
        }
    }
}

/// In-process transport delivering messages in-line to subscribers.
///
/// Useful for testing and single-process deployments. Published messages
/// are kept in a bounded history.
pub struct MemoryAdapter {
    subscriptions: RwLock<Vec<(String, Arc<dyn MessageSubscriber>)>>,
    history: RwLock<VecDeque<Message>>,
    max_history: usize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_history_size(DEFAULT_HISTORY_SIZE)
    }

    /// Creates an adapter keeping at most `max_history` published messages.
    pub fn with_history_size(max_history: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Messages published so far, oldest first.
    pub async fn published(&self) -> Vec<Message> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Forgets the published messages.
    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    /// Number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    async fn store_in_history(&self, message: Message) {
        if self.max_history == 0 {
            return;
        }
        let mut history = self.history.write().await;
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(message);
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubAdapter for MemoryAdapter {
    async fn publish(&self, message: Message) -> EventResult<()> {
        if message.topic.is_empty() {
            return Err(EventError::Transport("cannot publish on an empty topic".to_string()));
        }

        self.store_in_history(message.clone()).await;

        // Release the lock before delivering so subscribers may publish.
        let targets: Vec<Arc<dyn MessageSubscriber>> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .filter(|(channel, _)| channel_matches(channel, &message.topic))
                .map(|(_, subscriber)| subscriber.clone())
                .collect()
        };

        tracing::debug!(
            topic = %message.topic,
            subscribers = targets.len(),
            "Delivering message"
        );

        for subscriber in targets {
            subscriber.on_message(message.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, subscriber: Arc<dyn MessageSubscriber>) -> EventResult<()> {
        if channel.is_empty() {
            return Err(EventError::Transport("cannot subscribe to an empty channel".to_string()));
        }

        tracing::debug!(channel = %channel, "Subscribed to channel");
        self.subscriptions
            .write()
            .await
            .push((channel.to_string(), subscriber));
        Ok(())
    }
}
