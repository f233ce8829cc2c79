use anyhow::Context;
use async_nats::jetstream;
use async_trait::async_trait;
use tracing::debug;
use vigil_domain::{DomainError, DomainResult, QueueMessage, QueuePublisher};

/// JetStream-backed publisher. The destination queue name becomes the
/// publish subject; the payload is the message's canonical JSON body.
pub struct NatsQueuePublisher {
    jetstream: jetstream::Context,
}

impl NatsQueuePublisher {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self { jetstream }
    }
}

#[async_trait]
impl<M: QueueMessage> QueuePublisher<M> for NatsQueuePublisher {
    async fn publish(&self, message: &M) -> DomainResult<()> {
        let queue_name = message.queue_name();
        if queue_name.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "message queue name cannot be empty",
            ));
        }

        let payload = message.to_bytes()?;

        debug!(
            queue = %queue_name,
            size_bytes = payload.len(),
            "publishing message"
        );

        let ack = self
            .jetstream
            .publish(queue_name.to_string(), payload.into())
            .await
            .context("Failed to publish message")
            .map_err(DomainError::Infrastructure)?;

        // An unacknowledged publish means the broker never took the
        // message; surface it as an operation failure, not a crash.
        ack.await.map_err(|e| {
            DomainError::OperationFailed(format!(
                "message to '{queue_name}' not acknowledged by broker: {e}"
            ))
        })?;

        Ok(())
    }
}
