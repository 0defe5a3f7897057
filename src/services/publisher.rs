use async_trait::async_trait;

use crate::models::LiveEvent;

/// Outbound publish channel for status and booking events
///
/// Fire-and-forget: the core requires no delivery guarantee and never blocks
/// on a subscriber. Transport (push, socket, queue) is a collaborator
/// concern.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: LiveEvent);
}

/// Publisher that drops events, logging them at trace level
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, topic: &str, event: LiveEvent) {
        tracing::trace!("Dropping event on {}: {:?}", topic, event);
    }
}
