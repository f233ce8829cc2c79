use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Contract every broker message satisfies.
///
/// The wire payload is the flat UTF-8 JSON serialization of the concrete
/// type's fields; the destination queue name travels as broker-native
/// metadata, never inside the body. Consumers restore it from the queue
/// they read from.
pub trait QueueMessage:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    fn queue_name(&self) -> &str;

    fn set_queue_name(&mut self, queue_name: &str);

    fn to_bytes(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| DomainError::MalformedMessage(e.to_string()))
    }

    fn from_bytes(queue_name: &str, bytes: &[u8]) -> DomainResult<Self> {
        let mut message: Self = serde_json::from_slice(bytes)
            .map_err(|e| DomainError::MalformedMessage(e.to_string()))?;
        message.set_queue_name(queue_name);
        Ok(message)
    }
}

fn default_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// "An image exists at this remote location, captured by this camera at
/// this time." Produced by the recorder, consumed by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReferenceMessage {
    #[serde(skip)]
    pub queue_name: String,
    pub remote_storage_container: String,
    pub remote_storage_file_path: String,
    #[serde(default)]
    pub camera_name: String,
    #[serde(default)]
    pub image_name: String,
    #[serde(default = "default_timestamp")]
    pub image_created_date_time_utc: DateTime<Utc>,
}

impl QueueMessage for ImageReferenceMessage {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn set_queue_name(&mut self, queue_name: &str) {
        self.queue_name = queue_name.to_string();
    }
}

/// One detection, republished downstream after its row is committed.
/// Mirrors the persisted entity minus the generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMessage {
    #[serde(skip)]
    pub queue_name: String,
    pub remote_storage_container: String,
    pub remote_storage_file_path: String,
    pub camera_name: String,
    pub image_name: String,
    pub image_size_bytes: i64,
    pub detection_label: String,
    pub detection_date_time_utc: DateTime<Utc>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub origin_x: Option<i32>,
    #[serde(default)]
    pub origin_y: Option<i32>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

impl QueueMessage for DetectionMessage {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn set_queue_name(&mut self, queue_name: &str) {
        self.queue_name = queue_name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference_message() -> ImageReferenceMessage {
        ImageReferenceMessage {
            queue_name: "images".to_string(),
            remote_storage_container: "c1".to_string(),
            remote_storage_file_path: "cam1/img1.png".to_string(),
            camera_name: "cam1".to_string(),
            image_name: "img1.png".to_string(),
            image_created_date_time_utc: Utc
                .with_ymd_and_hms(2024, 5, 17, 9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn image_reference_round_trip_preserves_all_fields() {
        let original = reference_message();

        let bytes = original.to_bytes().unwrap();
        let restored = ImageReferenceMessage::from_bytes("images", &bytes).unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn queue_name_stays_out_of_the_wire_body() {
        let bytes = reference_message().to_bytes().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert!(body.get("queueName").is_none());
        assert_eq!(body["remoteStorageFilePath"], "cam1/img1.png");
        assert_eq!(body["cameraName"], "cam1");
    }

    #[test]
    fn absent_optional_fields_default() {
        let body = br#"{"remoteStorageContainer":"c1","remoteStorageFilePath":"cam1/img1.png"}"#;

        let message = ImageReferenceMessage::from_bytes("images", body).unwrap();

        assert_eq!(message.queue_name, "images");
        assert_eq!(message.camera_name, "");
        assert_eq!(message.image_name, "");
        assert_eq!(message.image_created_date_time_utc, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn detection_message_round_trip_preserves_all_fields() {
        let original = DetectionMessage {
            queue_name: "detections".to_string(),
            remote_storage_container: "c1".to_string(),
            remote_storage_file_path: "cam1/img1.png".to_string(),
            camera_name: "cam1".to_string(),
            image_name: "img1.png".to_string(),
            image_size_bytes: 2048,
            detection_label: "person".to_string(),
            detection_date_time_utc: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap(),
            score: Some(0.9),
            origin_x: Some(10),
            origin_y: Some(20),
            width: Some(64),
            height: Some(128),
        };

        let bytes = original.to_bytes().unwrap();
        let restored = DetectionMessage::from_bytes("detections", &bytes).unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn garbage_payload_is_a_malformed_message() {
        let result = ImageReferenceMessage::from_bytes("images", b"not json");

        assert!(matches!(result, Err(DomainError::MalformedMessage(_))));
    }
}
