use crate::detection::{DetectionEvent, ImageDetection};
use crate::detector::ObjectDetector;
use crate::error::{DomainError, DomainResult};
use crate::message::{DetectionMessage, ImageReferenceMessage};
use crate::queue::QueuePublisher;
use crate::storage::RemoteStorage;
use crate::unit_of_work::UnitOfWorkFactory;
use crate::validate::Validation;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a message was dropped without producing detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BlankFilePath,
    MissingObject,
    EmptyImage,
    InvalidMetadata,
}

/// Terminal state of one handled ImageReferenceMessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Message acknowledged without running detection.
    Skipped(SkipReason),
    /// Detection ran, found nothing; the source object was deleted.
    NoDetections,
    /// Rows committed and messages republished.
    Committed {
        detections: usize,
        publish_failures: usize,
    },
}

/// Per-message detection pipeline.
///
/// Flow:
/// 1. Validate the reference
/// 2. Download the image from remote storage
/// 3. Run the detection capability
/// 4. No detections: delete the source object (retention policy)
/// 5. Stage one row per detection in an isolated unit of work
/// 6. Commit once
/// 7. Republish each detection downstream
pub struct ObjectDetectionService {
    detector: Arc<dyn ObjectDetector>,
    storage: Arc<dyn RemoteStorage>,
    publisher: Arc<dyn QueuePublisher<DetectionMessage>>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    detection_queue: String,
}

impl ObjectDetectionService {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        storage: Arc<dyn RemoteStorage>,
        publisher: Arc<dyn QueuePublisher<DetectionMessage>>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        detection_queue: String,
    ) -> Self {
        Self {
            detector,
            storage,
            publisher,
            uow_factory,
            detection_queue,
        }
    }

    pub async fn handle_image_reference(
        &self,
        message: ImageReferenceMessage,
    ) -> DomainResult<DetectionOutcome> {
        // 1. A reference without a path can never resolve; drop it.
        if message.remote_storage_file_path.trim().is_empty() {
            warn!(
                camera = %message.camera_name,
                "image reference carries a blank file path, dropping"
            );
            return Ok(DetectionOutcome::Skipped(SkipReason::BlankFilePath));
        }

        let container = &message.remote_storage_container;
        let path = &message.remote_storage_file_path;

        // 2. Download. A missing object is non-fatal: the message is stale.
        let image_bytes = match self.storage.download(container, path).await {
            Ok(bytes) => bytes,
            Err(DomainError::NotFound(detail)) => {
                warn!(
                    container = %container,
                    path = %path,
                    detail = %detail,
                    "referenced object no longer exists, dropping message"
                );
                return Ok(DetectionOutcome::Skipped(SkipReason::MissingObject));
            }
            Err(e) => return Err(e),
        };

        if image_bytes.is_empty() {
            error!(
                container = %container,
                path = %path,
                "no image content at remote location"
            );
            return Ok(DetectionOutcome::Skipped(SkipReason::EmptyImage));
        }

        // 3. Detect. Metadata validation short-circuits before the backend
        // is invoked.
        let events = match self.launch_detection(&message, image_bytes).await {
            Ok(events) => events,
            Err(DomainError::InvalidArgument(errors)) => {
                error!(errors = %errors, "image reference failed validation");
                return Ok(DetectionOutcome::Skipped(SkipReason::InvalidMetadata));
            }
            Err(e) => return Err(e),
        };

        // 4. Nothing detected: the image is not retained.
        if events.is_empty() {
            self.storage.delete(container, path).await?;
            info!(
                container = %container,
                path = %path,
                "no detection found, deleted file from remote storage"
            );
            return Ok(DetectionOutcome::NoDetections);
        }

        // 5. Stage every row before anything is made durable. The first
        // staging error aborts the message; nothing past the failure point
        // is published.
        let mut unit_of_work = self.uow_factory.begin();
        let mut outgoing = Vec::with_capacity(events.len());

        for event in &events {
            let detection = self.build_image_detection(event, container, path)?;
            debug!(
                detection_id = %detection.id,
                label = %detection.detection_label,
                "staging detection"
            );
            unit_of_work.stage(detection)?;
            outgoing.push(self.build_detection_message(event, container, path));
        }

        // 6. One atomic commit per message.
        let committed = unit_of_work.commit().await?;
        info!(rows = committed, "detections committed");

        // 7. Republish after commit so downstream never observes a
        // detection whose row is not durable. Publish failures do not
        // unwind committed rows.
        let mut publish_failures = 0usize;
        for detection_message in &outgoing {
            if let Err(e) = self.publisher.publish(detection_message).await {
                error!(
                    queue = %self.detection_queue,
                    label = %detection_message.detection_label,
                    error = %e,
                    "failed to publish detection"
                );
                publish_failures += 1;
            } else {
                debug!(
                    queue = %self.detection_queue,
                    label = %detection_message.detection_label,
                    "detection published"
                );
            }
        }

        Ok(DetectionOutcome::Committed {
            detections: events.len(),
            publish_failures,
        })
    }

    /// Validate the reference metadata, then hand the bytes to the
    /// detection capability. Zero events is a valid outcome.
    async fn launch_detection(
        &self,
        message: &ImageReferenceMessage,
        image_bytes: Bytes,
    ) -> DomainResult<Vec<DetectionEvent>> {
        Validation::new()
            .require(!image_bytes.is_empty(), "image bytes cannot be empty")
            .require_not_blank(&message.image_name, "image name cannot be empty")
            .require_not_blank(&message.camera_name, "camera name cannot be empty")
            .finish()?;

        self.detector
            .analyse(
                image_bytes,
                &message.camera_name,
                &message.image_name,
                message.image_created_date_time_utc,
            )
            .await
    }

    fn build_image_detection(
        &self,
        event: &DetectionEvent,
        container: &str,
        path: &str,
    ) -> DomainResult<ImageDetection> {
        Validation::new()
            .require(!event.image_bytes.is_empty(), "image bytes cannot be empty")
            .require_not_blank(&event.image_name, "image name cannot be empty")
            .require_not_blank(&event.camera_name, "camera name cannot be empty")
            .finish()?;

        Ok(ImageDetection {
            id: Uuid::new_v4(),
            camera_name: event.camera_name.clone(),
            image_name: event.image_name.clone(),
            image_size_bytes: event.image_bytes.len() as i64,
            detection_label: event.label.clone(),
            detected_at: event.image_created_at,
            remote_storage_container: container.to_string(),
            remote_storage_file_path: path.to_string(),
            score: event.score,
            bounding_box: event.bounding_box,
        })
    }

    fn build_detection_message(
        &self,
        event: &DetectionEvent,
        container: &str,
        path: &str,
    ) -> DetectionMessage {
        DetectionMessage {
            queue_name: self.detection_queue.clone(),
            remote_storage_container: container.to_string(),
            remote_storage_file_path: path.to_string(),
            camera_name: event.camera_name.clone(),
            image_name: event.image_name.clone(),
            image_size_bytes: event.image_bytes.len() as i64,
            detection_label: event.label.clone(),
            detection_date_time_utc: event.image_created_at,
            score: event.score,
            origin_x: event.bounding_box.map(|b| b.origin_x),
            origin_y: event.bounding_box.map(|b| b.origin_y),
            width: event.bounding_box.map(|b| b.width),
            height: event.bounding_box.map(|b| b.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockObjectDetector;
    use crate::queue::MockQueuePublisher;
    use crate::storage::MockRemoteStorage;
    use crate::unit_of_work::{
        DetectionUnitOfWork, MockDetectionUnitOfWork, MockUnitOfWorkFactory,
    };
    use chrono::{TimeZone, Utc};

    fn reference() -> ImageReferenceMessage {
        ImageReferenceMessage {
            queue_name: "images".to_string(),
            remote_storage_container: "c1".to_string(),
            remote_storage_file_path: "cam1/img1.png".to_string(),
            camera_name: "cam1".to_string(),
            image_name: "img1.png".to_string(),
            image_created_date_time_utc: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap(),
        }
    }

    fn event(label: &str, score: Option<f64>) -> DetectionEvent {
        DetectionEvent {
            occurred_at: Utc::now(),
            camera_name: "cam1".to_string(),
            image_bytes: Bytes::from_static(b"pngbytes"),
            image_name: "img1.png".to_string(),
            image_created_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap(),
            label: label.to_string(),
            score,
            bounding_box: None,
        }
    }

    struct Fixture {
        detector: MockObjectDetector,
        storage: MockRemoteStorage,
        publisher: MockQueuePublisher<DetectionMessage>,
        factory: MockUnitOfWorkFactory,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                detector: MockObjectDetector::new(),
                storage: MockRemoteStorage::new(),
                publisher: MockQueuePublisher::new(),
                factory: MockUnitOfWorkFactory::new(),
            }
        }

        fn with_unit_of_work(mut self, uow: MockDetectionUnitOfWork) -> Self {
            self.factory
                .expect_begin()
                .times(1)
                .return_once(move || Box::new(uow) as Box<dyn DetectionUnitOfWork>);
            self
        }

        fn build(self) -> ObjectDetectionService {
            ObjectDetectionService::new(
                Arc::new(self.detector),
                Arc::new(self.storage),
                Arc::new(self.publisher),
                Arc::new(self.factory),
                "detections".to_string(),
            )
        }
    }

    #[tokio::test]
    async fn one_detection_stages_one_row_publishes_one_message_commits_once() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .withf(|container: &str, path: &str| container == "c1" && path == "cam1/img1.png")
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"pngbytes")));

        fixture
            .detector
            .expect_analyse()
            .times(1)
            .returning(|_, _, _, _| Ok(vec![event("person", Some(0.9))]));

        let mut uow = MockDetectionUnitOfWork::new();
        uow.expect_stage()
            .withf(|d: &ImageDetection| {
                d.detection_label == "person"
                    && d.remote_storage_file_path == "cam1/img1.png"
                    && d.score == Some(0.9)
            })
            .times(1)
            .returning(|_| Ok(()));
        uow.expect_commit().times(1).returning(|| Ok(1));

        fixture
            .publisher
            .expect_publish()
            .withf(|m: &DetectionMessage| {
                m.queue_name == "detections"
                    && m.detection_label == "person"
                    && m.remote_storage_file_path == "cam1/img1.png"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = fixture.with_unit_of_work(uow).build();

        // Act
        let outcome = service.handle_image_reference(reference()).await.unwrap();

        // Assert
        assert_eq!(
            outcome,
            DetectionOutcome::Committed {
                detections: 1,
                publish_failures: 0
            }
        );
    }

    #[tokio::test]
    async fn zero_detections_deletes_the_source_object() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"pngbytes")));
        fixture
            .storage
            .expect_delete()
            .withf(|container: &str, path: &str| container == "c1" && path == "cam1/img1.png")
            .times(1)
            .returning(|_, _| Ok(()));

        fixture
            .detector
            .expect_analyse()
            .times(1)
            .returning(|_, _, _, _| Ok(Vec::new()));

        // No staging, no commit, no publish.
        fixture.factory.expect_begin().times(0);
        fixture.publisher.expect_publish().times(0);

        let service = fixture.build();

        // Act
        let outcome = service.handle_image_reference(reference()).await.unwrap();

        // Assert
        assert_eq!(outcome, DetectionOutcome::NoDetections);
    }

    #[tokio::test]
    async fn empty_download_never_reaches_the_detector() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .times(1)
            .returning(|_, _| Ok(Bytes::new()));
        fixture.detector.expect_analyse().times(0);

        let service = fixture.build();

        // Act
        let outcome = service.handle_image_reference(reference()).await.unwrap();

        // Assert
        assert_eq!(outcome, DetectionOutcome::Skipped(SkipReason::EmptyImage));
    }

    #[tokio::test]
    async fn blank_file_path_skips_without_touching_storage() {
        // Arrange
        let mut fixture = Fixture::new();
        fixture.storage.expect_download().times(0);
        let service = fixture.build();

        let mut message = reference();
        message.remote_storage_file_path = "   ".to_string();

        // Act
        let outcome = service.handle_image_reference(message).await.unwrap();

        // Assert
        assert_eq!(outcome, DetectionOutcome::Skipped(SkipReason::BlankFilePath));
    }

    #[tokio::test]
    async fn missing_object_is_dropped_not_failed() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .times(1)
            .returning(|_, _| Err(DomainError::NotFound("cam1/img1.png".to_string())));
        fixture.detector.expect_analyse().times(0);

        let service = fixture.build();

        // Act
        let outcome = service.handle_image_reference(reference()).await.unwrap();

        // Assert
        assert_eq!(outcome, DetectionOutcome::Skipped(SkipReason::MissingObject));
    }

    #[tokio::test]
    async fn blank_camera_name_short_circuits_before_detection() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"pngbytes")));
        fixture.detector.expect_analyse().times(0);

        let service = fixture.build();

        let mut message = reference();
        message.camera_name = String::new();

        // Act
        let outcome = service.handle_image_reference(message).await.unwrap();

        // Assert
        assert_eq!(
            outcome,
            DetectionOutcome::Skipped(SkipReason::InvalidMetadata)
        );
    }

    #[tokio::test]
    async fn staging_error_aborts_before_commit_and_publish() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"pngbytes")));

        fixture.detector.expect_analyse().times(1).returning(|_, _, _, _| {
            Ok(vec![event("person", Some(0.9)), event("cat", None)])
        });

        let mut uow = MockDetectionUnitOfWork::new();
        // First stage fails; the loop must not reach the second event.
        uow.expect_stage()
            .times(1)
            .returning(|_| Err(DomainError::OperationFailed("staging failed".to_string())));
        uow.expect_commit().times(0);

        fixture.publisher.expect_publish().times(0);

        let service = fixture.with_unit_of_work(uow).build();

        // Act
        let result = service.handle_image_reference(reference()).await;

        // Assert
        assert!(matches!(result, Err(DomainError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn publish_failure_after_commit_is_counted_not_fatal() {
        // Arrange
        let mut fixture = Fixture::new();

        fixture
            .storage
            .expect_download()
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"pngbytes")));

        fixture.detector.expect_analyse().times(1).returning(|_, _, _, _| {
            Ok(vec![event("person", Some(0.9)), event("cat", None)])
        });

        let mut uow = MockDetectionUnitOfWork::new();
        uow.expect_stage().times(2).returning(|_| Ok(()));
        uow.expect_commit().times(1).returning(|| Ok(2));

        let mut publish_calls = 0;
        fixture
            .publisher
            .expect_publish()
            .times(2)
            .returning(move |_| {
                publish_calls += 1;
                if publish_calls == 1 {
                    Err(DomainError::OperationFailed(
                        "message not confirmed by broker".to_string(),
                    ))
                } else {
                    Ok(())
                }
            });

        let service = fixture.with_unit_of_work(uow).build();

        // Act
        let outcome = service.handle_image_reference(reference()).await.unwrap();

        // Assert
        assert_eq!(
            outcome,
            DetectionOutcome::Committed {
                detections: 2,
                publish_failures: 1
            }
        );
    }
}
