use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Pixel-space rectangle for backends that return geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: i32,
    pub height: i32,
}

/// One detected object/region in one image. Produced transiently by the
/// detection capability; consumed immediately by persistence and
/// republish, never serialized as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub occurred_at: DateTime<Utc>,
    pub camera_name: String,
    pub image_bytes: Bytes,
    pub image_name: String,
    pub image_created_at: DateTime<Utc>,
    pub label: String,
    pub score: Option<f64>,
    pub bounding_box: Option<BoundingBox>,
}

/// Persisted detection row. Append-only; the id is generated when the row
/// is built for staging and never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDetection {
    pub id: Uuid,
    pub camera_name: String,
    pub image_name: String,
    pub image_size_bytes: i64,
    pub detection_label: String,
    pub detected_at: DateTime<Utc>,
    pub remote_storage_container: String,
    pub remote_storage_file_path: String,
    pub score: Option<f64>,
    pub bounding_box: Option<BoundingBox>,
}

/// A local image picked up by the recorder's scan pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedImage {
    pub camera_name: String,
    pub image_name: String,
    pub image_bytes: Bytes,
    pub captured_at: DateTime<Utc>,
    pub local_path: std::path::PathBuf,
}
