use crate::client::AmqpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use tracing::debug;
use vigil_domain::{DomainError, DomainResult, QueueMessage, QueuePublisher};

/// Confirm-mode AMQP publisher. Queues are declared durable before each
/// publish (idempotent) and messages are persistent; a broker nack
/// surfaces as an operation failure.
pub struct AmqpQueuePublisher {
    channel: Channel,
}

impl AmqpQueuePublisher {
    pub async fn new(client: &AmqpClient) -> Result<Self> {
        let channel = client.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl<M: QueueMessage> QueuePublisher<M> for AmqpQueuePublisher {
    async fn publish(&self, message: &M) -> DomainResult<()> {
        let queue_name = message.queue_name();
        if queue_name.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "message queue name cannot be empty",
            ));
        }

        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare queue")
            .map_err(DomainError::Infrastructure)?;

        let payload = message.to_bytes()?;

        debug!(
            queue = %queue_name,
            size_bytes = payload.len(),
            "publishing message"
        );

        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .context("Failed to publish message")
            .map_err(DomainError::Infrastructure)?
            .await
            .context("Failed to await publisher confirm")
            .map_err(DomainError::Infrastructure)?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(DomainError::OperationFailed(format!(
                "message to '{queue_name}' not confirmed by broker"
            )));
        }

        Ok(())
    }
}
