pub mod detection;
pub mod detection_service;
pub mod detector;
pub mod error;
pub mod message;
pub mod queue;
pub mod recorder_service;
pub mod storage;
pub mod unit_of_work;
pub mod validate;

pub use detection::{BoundingBox, DetectionEvent, ImageDetection, RecordedImage};
pub use detection_service::{DetectionOutcome, ObjectDetectionService, SkipReason};
pub use detector::ObjectDetector;
pub use error::{ArgumentErrors, DomainError, DomainResult};
pub use message::{DetectionMessage, ImageReferenceMessage, QueueMessage};
pub use queue::{MessageHandler, QueueConsumer, QueuePublisher, Subscription};
pub use recorder_service::{ImageRecorderService, RecorderPassInput, RecorderPassReport};
pub use storage::RemoteStorage;
pub use unit_of_work::{DetectionReadRepository, DetectionUnitOfWork, UnitOfWorkFactory};
pub use validate::Validation;

#[cfg(any(test, feature = "testing"))]
pub use detector::MockObjectDetector;
#[cfg(any(test, feature = "testing"))]
pub use queue::MockQueuePublisher;
#[cfg(any(test, feature = "testing"))]
pub use storage::MockRemoteStorage;
#[cfg(any(test, feature = "testing"))]
pub use unit_of_work::{
    MockDetectionReadRepository, MockDetectionUnitOfWork, MockUnitOfWorkFactory,
};
