use crate::detection::DetectionEvent;
use crate::error::DomainResult;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The detection capability: given image bytes, return zero or more
/// labeled detections with optional geometry/score. Zero results is a
/// valid, non-error outcome.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn analyse(
        &self,
        image_bytes: Bytes,
        camera_name: &str,
        image_name: &str,
        captured_at: DateTime<Utc>,
    ) -> DomainResult<Vec<DetectionEvent>>;
}
