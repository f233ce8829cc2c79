use chrono::{DateTime, Utc};
use uuid::Uuid;
use vigil_domain::{BoundingBox, ImageDetection};

/// Detection row as stored in `image_detections`. Geometry is flattened
/// into four nullable columns.
#[derive(Debug, Clone)]
pub struct ImageDetectionRow {
    pub id: Uuid,
    pub camera_name: String,
    pub image_name: String,
    pub image_size_bytes: i64,
    pub detection_label: String,
    pub detected_at: DateTime<Utc>,
    pub remote_storage_container: String,
    pub remote_storage_file_path: String,
    pub score: Option<f64>,
    pub origin_x: Option<i32>,
    pub origin_y: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

impl From<ImageDetection> for ImageDetectionRow {
    fn from(detection: ImageDetection) -> Self {
        Self {
            id: detection.id,
            camera_name: detection.camera_name,
            image_name: detection.image_name,
            image_size_bytes: detection.image_size_bytes,
            detection_label: detection.detection_label,
            detected_at: detection.detected_at,
            remote_storage_container: detection.remote_storage_container,
            remote_storage_file_path: detection.remote_storage_file_path,
            score: detection.score,
            origin_x: detection.bounding_box.map(|b| b.origin_x),
            origin_y: detection.bounding_box.map(|b| b.origin_y),
            width: detection.bounding_box.map(|b| b.width),
            height: detection.bounding_box.map(|b| b.height),
        }
    }
}

impl From<ImageDetectionRow> for ImageDetection {
    fn from(row: ImageDetectionRow) -> Self {
        let bounding_box = match (row.origin_x, row.origin_y, row.width, row.height) {
            (Some(origin_x), Some(origin_y), Some(width), Some(height)) => Some(BoundingBox {
                origin_x,
                origin_y,
                width,
                height,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            camera_name: row.camera_name,
            image_name: row.image_name,
            image_size_bytes: row.image_size_bytes,
            detection_label: row.detection_label,
            detected_at: row.detected_at,
            remote_storage_container: row.remote_storage_container,
            remote_storage_file_path: row.remote_storage_file_path,
            score: row.score,
            bounding_box,
        }
    }
}

impl From<&tokio_postgres::Row> for ImageDetectionRow {
    fn from(row: &tokio_postgres::Row) -> Self {
        Self {
            id: row.get("id"),
            camera_name: row.get("camera_name"),
            image_name: row.get("image_name"),
            image_size_bytes: row.get("image_size_bytes"),
            detection_label: row.get("detection_label"),
            detected_at: row.get("detected_at"),
            remote_storage_container: row.get("remote_storage_container"),
            remote_storage_file_path: row.get("remote_storage_file_path"),
            score: row.get("score"),
            origin_x: row.get("origin_x"),
            origin_y: row.get("origin_y"),
            width: row.get("width"),
            height: row.get("height"),
        }
    }
}
