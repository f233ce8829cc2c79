use crate::error::DomainResult;
use crate::message::QueueMessage;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback invoked once per delivered message.
pub type MessageHandler<M> =
    Arc<dyn Fn(M) -> BoxFuture<'static, DomainResult<()>> + Send + Sync>;

/// Sends one message to the queue named in the message.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait QueuePublisher<M: QueueMessage>: Send + Sync {
    async fn publish(&self, message: &M) -> DomainResult<()>;
}

/// Delivers messages from a named queue to a subscription's handlers under
/// a bounded-concurrency loop until the token is cancelled.
///
/// At-least-once: a message is acknowledged only after every handler
/// completed without an unrecoverable error. Handler failures and poisoned
/// payloads are dead-lettered; transport failures are fatal and end the
/// subscription.
#[async_trait]
pub trait QueueConsumer<M: QueueMessage>: Send + Sync {
    async fn subscribe(
        &self,
        subscription: Subscription<M>,
        ctx: CancellationToken,
    ) -> DomainResult<()>;
}

/// One consumed queue with its own handler list. All registered handlers
/// are invoked per delivery, in registration order; the first failure
/// short-circuits the rest and decides the message outcome.
pub struct Subscription<M: QueueMessage> {
    queue_name: String,
    max_concurrent: usize,
    handlers: Vec<MessageHandler<M>>,
}

impl<M: QueueMessage> Subscription<M> {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            max_concurrent: 1,
            handlers: Vec::new(),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn handler(mut self, handler: MessageHandler<M>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn dispatch(&self, message: M) -> DomainResult<()> {
        for handler in &self.handlers {
            handler(message.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::message::ImageReferenceMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message() -> ImageReferenceMessage {
        ImageReferenceMessage {
            queue_name: "images".to_string(),
            remote_storage_container: "c1".to_string(),
            remote_storage_file_path: "cam1/img1.png".to_string(),
            camera_name: "cam1".to_string(),
            image_name: "img1.png".to_string(),
            image_created_date_time_utc: chrono::Utc::now(),
        }
    }

    fn counting_handler(
        calls: Arc<AtomicUsize>,
    ) -> MessageHandler<ImageReferenceMessage> {
        Arc::new(move |_msg| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn every_handler_sees_the_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = Subscription::new("images")
            .handler(counting_handler(calls.clone()))
            .handler(counting_handler(calls.clone()));

        subscription.dispatch(message()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_failure_short_circuits_remaining_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing: MessageHandler<ImageReferenceMessage> = Arc::new(|_msg| {
            Box::pin(async { Err(DomainError::OperationFailed("boom".to_string())) })
        });
        let subscription = Subscription::new("images")
            .handler(failing)
            .handler(counting_handler(calls.clone()));

        let result = subscription.dispatch(message()).await;

        assert!(matches!(result, Err(DomainError::OperationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn max_concurrent_is_never_zero() {
        let subscription =
            Subscription::<ImageReferenceMessage>::new("images").with_max_concurrent(0);

        assert_eq!(subscription.max_concurrent(), 1);
    }
}
