use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use vigil_domain::{
    BoundingBox, DetectionEvent, DomainError, DomainResult, ObjectDetector,
};

/// Detection backend speaking HTTP to an inference service.
///
/// The image goes out as a multipart request (raw bytes plus metadata
/// fields); the response is a JSON array of labeled detections.
pub struct HttpObjectDetector {
    client: reqwest::Client,
    base_url: String,
}

/// One detection as returned by the inference service.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionResponse {
    pub label: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub bbox: Option<BBoxResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BBoxResponse {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl HttpObjectDetector {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn to_events(
        detections: Vec<DetectionResponse>,
        image_bytes: &Bytes,
        camera_name: &str,
        image_name: &str,
        captured_at: DateTime<Utc>,
    ) -> Vec<DetectionEvent> {
        detections
            .into_iter()
            .map(|detection| DetectionEvent {
                occurred_at: Utc::now(),
                camera_name: camera_name.to_string(),
                image_bytes: image_bytes.clone(),
                image_name: image_name.to_string(),
                image_created_at: captured_at,
                label: detection.label,
                score: detection.score,
                bounding_box: detection.bbox.map(|bbox| BoundingBox {
                    origin_x: bbox.x,
                    origin_y: bbox.y,
                    width: bbox.width,
                    height: bbox.height,
                }),
            })
            .collect()
    }
}

#[async_trait]
impl ObjectDetector for HttpObjectDetector {
    async fn analyse(
        &self,
        image_bytes: Bytes,
        camera_name: &str,
        image_name: &str,
        captured_at: DateTime<Utc>,
    ) -> DomainResult<Vec<DetectionEvent>> {
        let url = format!("{}/analyze", self.base_url);

        let form = reqwest::multipart::Form::new()
            .part(
                "image",
                reqwest::multipart::Part::bytes(image_bytes.to_vec())
                    .file_name(image_name.to_string()),
            )
            .text("camera_name", camera_name.to_string())
            .text("image_name", image_name.to_string())
            .text("captured_at", captured_at.to_rfc3339());

        debug!(
            url = %url,
            camera = %camera_name,
            image = %image_name,
            size_bytes = image_bytes.len(),
            "sending image for analysis"
        );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach inference service")
            .map_err(DomainError::Infrastructure)?;

        if !response.status().is_success() {
            return Err(DomainError::OperationFailed(format!(
                "inference service returned status {}",
                response.status()
            )));
        }

        let detections: Vec<DetectionResponse> = response
            .json()
            .await
            .context("Failed to decode inference response")
            .map_err(DomainError::Infrastructure)?;

        debug!(count = detections.len(), "inference service responded");

        Ok(Self::to_events(
            detections,
            &image_bytes,
            camera_name,
            image_name,
            captured_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn response_maps_onto_detection_events() {
        let detections: Vec<DetectionResponse> = serde_json::from_str(
            r#"[
                {"label": "person", "score": 0.9, "bbox": {"x": 10, "y": 20, "width": 64, "height": 128}},
                {"label": "cat"}
            ]"#,
        )
        .unwrap();

        let captured_at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let image_bytes = Bytes::from_static(b"pngbytes");

        let events = HttpObjectDetector::to_events(
            detections,
            &image_bytes,
            "cam1",
            "img1.png",
            captured_at,
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].label, "person");
        assert_eq!(events[0].score, Some(0.9));
        assert_eq!(
            events[0].bounding_box,
            Some(BoundingBox {
                origin_x: 10,
                origin_y: 20,
                width: 64,
                height: 128
            })
        );
        assert_eq!(events[0].image_created_at, captured_at);
        assert_eq!(events[1].label, "cat");
        assert_eq!(events[1].score, None);
        assert_eq!(events[1].bounding_box, None);
    }

    #[test]
    fn empty_response_is_zero_events() {
        let events = HttpObjectDetector::to_events(
            Vec::new(),
            &Bytes::from_static(b"pngbytes"),
            "cam1",
            "img1.png",
            Utc::now(),
        );

        assert!(events.is_empty());
    }
}
