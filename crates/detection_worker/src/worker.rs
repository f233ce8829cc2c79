use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;
use vigil_domain::{
    DetectionMessage, DetectionOutcome, ImageReferenceMessage, MessageHandler,
    ObjectDetectionService, ObjectDetector, QueueConsumer, QueuePublisher, RemoteStorage,
    Subscription, UnitOfWorkFactory,
};
use vigil_runtime::Process;

pub struct DetectionWorkerConfig {
    pub image_queue: String,
    pub detection_queue: String,
    pub max_concurrent: usize,
}

/// Consumes image references and runs the detection pipeline per message.
pub struct DetectionWorker {
    consumer: Arc<dyn QueueConsumer<ImageReferenceMessage>>,
    service: Arc<ObjectDetectionService>,
    config: DetectionWorkerConfig,
}

impl DetectionWorker {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        storage: Arc<dyn RemoteStorage>,
        publisher: Arc<dyn QueuePublisher<DetectionMessage>>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        consumer: Arc<dyn QueueConsumer<ImageReferenceMessage>>,
        config: DetectionWorkerConfig,
    ) -> Self {
        info!(
            image_queue = %config.image_queue,
            detection_queue = %config.detection_queue,
            max_concurrent = config.max_concurrent,
            "initializing detection worker"
        );

        let service = Arc::new(ObjectDetectionService::new(
            detector,
            storage,
            publisher,
            uow_factory,
            config.detection_queue.clone(),
        ));

        Self {
            consumer,
            service,
            config,
        }
    }

    pub fn into_runner_process(self) -> Process {
        Box::new(move |ctx| {
            Box::pin(async move {
                let subscription = Subscription::new(&self.config.image_queue)
                    .with_max_concurrent(self.config.max_concurrent)
                    .handler(create_detection_handler(self.service));

                self.consumer
                    .subscribe(subscription, ctx)
                    .await
                    .map_err(anyhow::Error::new)
            })
        })
    }
}

/// Wraps the pipeline in a queue handler: every message gets a correlation
/// id span, outcomes are logged, and only real failures propagate to the
/// consumer (which dead-letters or aborts).
pub fn create_detection_handler(
    service: Arc<ObjectDetectionService>,
) -> MessageHandler<ImageReferenceMessage> {
    Arc::new(move |message| {
        let service = Arc::clone(&service);
        Box::pin(async move {
            let correlation_id = Uuid::new_v4();
            let span = tracing::info_span!(
                "image_reference",
                %correlation_id,
                camera = %message.camera_name,
                image = %message.image_name,
            );

            async move {
                match service.handle_image_reference(message).await {
                    Ok(DetectionOutcome::Committed {
                        detections,
                        publish_failures,
                    }) => {
                        info!(detections, publish_failures, "message processed");
                        Ok(())
                    }
                    Ok(DetectionOutcome::NoDetections) => {
                        info!("no detections, source image removed");
                        Ok(())
                    }
                    Ok(DetectionOutcome::Skipped(reason)) => {
                        warn!(?reason, "message dropped");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "message handling failed");
                        Err(e)
                    }
                }
            }
            .instrument(span)
            .await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_domain::{
        DomainError, MockObjectDetector, MockQueuePublisher, MockRemoteStorage,
        MockUnitOfWorkFactory,
    };

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

    fn service_with_storage(storage: MockRemoteStorage) -> Arc<ObjectDetectionService> {
        Arc::new(ObjectDetectionService::new(
            Arc::new(MockObjectDetector::new()),
            Arc::new(storage),
            Arc::new(MockQueuePublisher::<DetectionMessage>::new()),
            Arc::new(MockUnitOfWorkFactory::new()),
            "detections".to_string(),
        ))
    }

    #[tokio::test]
    async fn dropped_messages_acknowledge_cleanly() {
        // A missing object is a drop, not a handler failure.
        let mut storage = MockRemoteStorage::new();
        storage
            .expect_download()
            .returning(|_, _| Err(DomainError::NotFound("gone".to_string())));

        let handler = create_detection_handler(service_with_storage(storage));

        let result = handler(message()).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn infrastructure_failures_propagate_to_the_consumer() {
        let mut storage = MockRemoteStorage::new();
        storage.expect_download().returning(|_, _| {
            Err(DomainError::Infrastructure(anyhow::anyhow!(
                "storage unreachable"
            )))
        });

        let handler = create_detection_handler(service_with_storage(storage));

        let result = handler(message()).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}
