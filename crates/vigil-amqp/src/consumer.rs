use crate::client::AmqpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vigil_domain::{DomainError, DomainResult, QueueConsumer, QueueMessage, Subscription};

/// Push-based AMQP consumer.
///
/// The concurrency bound is the channel prefetch: the broker never hands
/// out more than `max_concurrent` unacknowledged deliveries, and a
/// delivery is only acknowledged once its handlers finished. Failed and
/// poisoned messages are republished to `<queue>.deadletter` with the
/// failure reason, then acknowledged. On cancellation, in-flight handlers
/// drain before the subscription returns.
pub struct AmqpQueueConsumer {
    channel: Channel,
    consumer_tag: String,
}

impl AmqpQueueConsumer {
    pub async fn new(client: &AmqpClient, consumer_tag: &str) -> Result<Self> {
        let channel = client.create_channel().await?;
        Ok(Self {
            channel,
            consumer_tag: consumer_tag.to_string(),
        })
    }
}

#[async_trait]
impl<M: QueueMessage> QueueConsumer<M> for AmqpQueueConsumer {
    async fn subscribe(
        &self,
        subscription: Subscription<M>,
        ctx: CancellationToken,
    ) -> DomainResult<()> {
        let queue_name = subscription.queue_name().to_string();
        let dead_letter_queue = format!("{queue_name}.deadletter");

        for queue in [&queue_name, &dead_letter_queue] {
            self.channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .context("Failed to declare queue")
                .map_err(DomainError::Infrastructure)?;
        }

        // Prefetch is the permit limit: the broker stops delivering once
        // this many messages are unacknowledged.
        self.channel
            .basic_qos(
                subscription.max_concurrent() as u16,
                BasicQosOptions::default(),
            )
            .await
            .context("Failed to set channel prefetch")
            .map_err(DomainError::Infrastructure)?;

        let mut deliveries = self
            .channel
            .basic_consume(
                &queue_name,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("Failed to start consuming")
            .map_err(DomainError::Infrastructure)?;

        info!(queue = %queue_name, "starting consumer loop");

        let subscription = Arc::new(subscription);
        let mut in_flight: JoinSet<DomainResult<()>> = JoinSet::new();
        let mut fatal: Option<DomainError> = None;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(queue = %queue_name, "received shutdown signal, stopping consumer");
                    break;
                }
                joined = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Some(error) = joined_error(joined) {
                        fatal = Some(error);
                        break;
                    }
                }
                delivery = deliveries.next() => {
                    match delivery {
                        None => {
                            fatal = Some(DomainError::Infrastructure(anyhow::anyhow!(
                                "consumer stream for '{queue_name}' closed unexpectedly"
                            )));
                            break;
                        }
                        Some(Err(e)) => {
                            fatal = Some(DomainError::Infrastructure(
                                anyhow::Error::new(e).context("broker connection failure"),
                            ));
                            break;
                        }
                        Some(Ok(delivery)) => {
                            let subscription = Arc::clone(&subscription);
                            let channel = self.channel.clone();
                            let queue_name = queue_name.clone();
                            let dead_letter_queue = dead_letter_queue.clone();
                            in_flight.spawn(async move {
                                handle_delivery(
                                    channel,
                                    subscription,
                                    &queue_name,
                                    &dead_letter_queue,
                                    delivery,
                                )
                                .await
                            });
                        }
                    }
                }
            }
        }

        // Graceful drain: let current messages finish, dispatch nothing new.
        while let Some(joined) = in_flight.join_next().await {
            if let Some(error) = joined_error(Some(joined)) {
                if fatal.is_none() {
                    fatal = Some(error);
                }
            }
        }

        match fatal {
            Some(error) => Err(error),
            None => {
                info!(queue = %subscription.queue_name(), "consumer stopped gracefully");
                Ok(())
            }
        }
    }
}

fn joined_error(
    joined: Option<Result<DomainResult<()>, tokio::task::JoinError>>,
) -> Option<DomainError> {
    match joined {
        Some(Ok(Ok(()))) | None => None,
        Some(Ok(Err(e))) => Some(e),
        Some(Err(e)) => Some(DomainError::Infrastructure(anyhow::anyhow!(
            "message handler task panicked: {e}"
        ))),
    }
}

async fn handle_delivery<M: QueueMessage>(
    channel: Channel,
    subscription: Arc<Subscription<M>>,
    queue_name: &str,
    dead_letter_queue: &str,
    delivery: Delivery,
) -> DomainResult<()> {
    let decoded = match M::from_bytes(queue_name, &delivery.data) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(queue = %queue_name, error = %e, "message failed to deserialize");
            dead_letter(&channel, dead_letter_queue, &delivery.data, &e.to_string()).await;
            acknowledge(&delivery).await;
            return Ok(());
        }
    };

    match subscription.dispatch(decoded).await {
        Ok(()) => {
            acknowledge(&delivery).await;
            Ok(())
        }
        // Leave the delivery unacknowledged; the broker redelivers after
        // the worker restarts.
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!(queue = %queue_name, error = %e, "handler failed, dead-lettering message");
            dead_letter(&channel, dead_letter_queue, &delivery.data, &e.to_string()).await;
            acknowledge(&delivery).await;
            Ok(())
        }
    }
}

async fn acknowledge(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!(error = %e, "failed to acknowledge message");
    }
}

async fn dead_letter(channel: &Channel, dead_letter_queue: &str, payload: &[u8], reason: &str) {
    let mut headers = FieldTable::default();
    headers.insert(
        ShortString::from("x-failure-reason"),
        AMQPValue::LongString(reason.into()),
    );

    let publish = channel
        .basic_publish(
            "",
            dead_letter_queue,
            BasicPublishOptions::default(),
            payload,
            BasicProperties::default()
                .with_delivery_mode(2)
                .with_headers(headers),
        )
        .await;

    match publish {
        Ok(confirm) => {
            if let Err(e) = confirm.await {
                error!(queue = %dead_letter_queue, error = %e, "dead-letter publish not confirmed");
            }
        }
        Err(e) => {
            error!(queue = %dead_letter_queue, error = %e, "failed to publish dead-letter message");
        }
    }
}
