use anyhow::Context;
use async_nats::jetstream::{self, consumer::PullConsumer, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_domain::{DomainError, DomainResult, QueueConsumer, QueueMessage, Subscription};

/// Pull-based JetStream consumer.
///
/// The concurrency bound comes from the fetch size: at most
/// `max_concurrent` messages are fetched per round and all dispatches of a
/// round are joined before the next fetch, so no more than
/// `max_concurrent` handler bodies ever run at once. Handler failures and
/// poisoned payloads are published to `<queue>.deadletter` and terminally
/// acknowledged; fatal errors end the subscription.
pub struct NatsQueueConsumer {
    jetstream: jetstream::Context,
    consumer_name: String,
    max_wait: Duration,
}

impl NatsQueueConsumer {
    pub fn new(jetstream: jetstream::Context, consumer_name: &str, max_wait_secs: u64) -> Self {
        Self {
            jetstream,
            consumer_name: consumer_name.to_string(),
            max_wait: Duration::from_secs(max_wait_secs),
        }
    }

    async fn create_consumer(&self, queue_name: &str) -> DomainResult<PullConsumer> {
        debug!(
            queue = %queue_name,
            consumer = %self.consumer_name,
            "creating durable consumer"
        );

        self.jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(self.consumer_name.clone()),
                    durable_name: Some(self.consumer_name.clone()),
                    filter_subject: queue_name.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
                queue_name,
            )
            .await
            .context("Failed to create consumer")
            .map_err(DomainError::Infrastructure)
    }

    async fn fetch_and_dispatch<M: QueueMessage>(
        &self,
        consumer: &PullConsumer,
        subscription: &Arc<Subscription<M>>,
    ) -> DomainResult<()> {
        let mut batch = consumer
            .fetch()
            .max_messages(subscription.max_concurrent())
            .expires(self.max_wait)
            .messages()
            .await
            .context("Failed to fetch messages")
            .map_err(DomainError::Infrastructure)?;

        let mut messages = Vec::new();
        while let Some(result) = batch.next().await {
            match result {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(error = %e, "error receiving message from batch");
                }
            }
        }

        if messages.is_empty() {
            return Ok(());
        }

        debug!(message_count = messages.len(), "received message batch");

        let mut in_flight = JoinSet::new();
        for message in messages {
            let subscription = Arc::clone(subscription);
            let jetstream = self.jetstream.clone();
            in_flight
                .spawn(async move { handle_delivery(jetstream, subscription, message).await });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(DomainError::Infrastructure(anyhow::anyhow!(
                        "message handler task panicked: {e}"
                    )))
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<M: QueueMessage> QueueConsumer<M> for NatsQueueConsumer {
    async fn subscribe(
        &self,
        subscription: Subscription<M>,
        ctx: CancellationToken,
    ) -> DomainResult<()> {
        let queue_name = subscription.queue_name().to_string();
        let consumer = self.create_consumer(&queue_name).await?;
        let subscription = Arc::new(subscription);

        info!(queue = %queue_name, "starting consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(queue = %queue_name, "received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_dispatch(&consumer, &subscription) => {
                    result?;
                }
            }
        }

        info!(queue = %queue_name, "consumer stopped gracefully");
        Ok(())
    }
}

async fn handle_delivery<M: QueueMessage>(
    jetstream: jetstream::Context,
    subscription: Arc<Subscription<M>>,
    message: jetstream::Message,
) -> DomainResult<()> {
    let queue_name = subscription.queue_name();

    let decoded = match M::from_bytes(queue_name, &message.payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            // Poisoned payload: dead-letter it, keep the subscription alive.
            error!(queue = %queue_name, error = %e, "message failed to deserialize");
            dead_letter(&jetstream, queue_name, &message, &e.to_string()).await;
            acknowledge(&message, AckKind::Term).await;
            return Ok(());
        }
    };

    match subscription.dispatch(decoded).await {
        Ok(()) => {
            acknowledge(&message, AckKind::Ack).await;
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!(queue = %queue_name, error = %e, "handler failed, dead-lettering message");
            dead_letter(&jetstream, queue_name, &message, &e.to_string()).await;
            acknowledge(&message, AckKind::Term).await;
            Ok(())
        }
    }
}

async fn acknowledge(message: &jetstream::Message, kind: AckKind) {
    // An ack that fails only means the broker redelivers; at-least-once
    // already covers that.
    if let Err(e) = message.ack_with(kind).await {
        error!(error = %e, "failed to acknowledge message");
    }
}

async fn dead_letter(
    jetstream: &jetstream::Context,
    queue_name: &str,
    message: &jetstream::Message,
    reason: &str,
) {
    let subject = format!("{queue_name}.deadletter");
    let mut headers = async_nats::HeaderMap::new();
    headers.insert("Vigil-Failure-Reason", reason);

    match jetstream
        .publish_with_headers(subject.clone(), headers, message.payload.clone())
        .await
    {
        Ok(ack) => {
            if let Err(e) = ack.await {
                error!(subject = %subject, error = %e, "dead-letter publish not acknowledged");
            }
        }
        Err(e) => {
            error!(subject = %subject, error = %e, "failed to publish dead-letter message");
        }
    }
}
