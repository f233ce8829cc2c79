use crate::client::PostgresClient;
use crate::models::ImageDetectionRow;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use vigil_domain::{DetectionReadRepository, DomainError, DomainResult, ImageDetection};

/// Read side of the detection store.
pub struct PostgresDetectionRepository {
    client: PostgresClient,
}

impl PostgresDetectionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DetectionReadRepository for PostgresDetectionRepository {
    async fn get_all_by_date(&self, date: NaiveDate) -> DomainResult<Vec<ImageDetection>> {
        debug!(date = %date, "querying detections by date");

        let connection = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Infrastructure)?;

        let rows = connection
            .query(
                "SELECT id, camera_name, image_name, image_size_bytes, detection_label, \
                        detected_at, remote_storage_container, remote_storage_file_path, \
                        score, origin_x, origin_y, width, height \
                 FROM image_detections \
                 WHERE detected_at::date = $1 \
                 ORDER BY detected_at",
                &[&date],
            )
            .await
            .map_err(|e| DomainError::Infrastructure(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| ImageDetection::from(ImageDetectionRow::from(row)))
            .collect())
    }
}
