use crate::client::PostgresClient;
use crate::models::ImageDetectionRow;
use async_trait::async_trait;
use tracing::debug;
use vigil_domain::{
    DetectionUnitOfWork, DomainError, DomainResult, ImageDetection, UnitOfWorkFactory,
};

const INSERT_DETECTION: &str = "INSERT INTO image_detections \
     (id, camera_name, image_name, image_size_bytes, detection_label, detected_at, \
      remote_storage_container, remote_storage_file_path, score, origin_x, origin_y, width, height) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

/// Buffers detection rows for one message scope and flushes them in a
/// single transaction. Staging never touches the database; committing with
/// nothing staged makes no backend call at all.
pub struct PostgresDetectionUnitOfWork {
    client: PostgresClient,
    staged: Vec<ImageDetectionRow>,
}

impl PostgresDetectionUnitOfWork {
    pub fn new(client: PostgresClient) -> Self {
        Self {
            client,
            staged: Vec::new(),
        }
    }
}

#[async_trait]
impl DetectionUnitOfWork for PostgresDetectionUnitOfWork {
    fn stage(&mut self, detection: ImageDetection) -> DomainResult<()> {
        self.staged.push(ImageDetectionRow::from(detection));
        Ok(())
    }

    async fn commit(&mut self) -> DomainResult<u64> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let rows = std::mem::take(&mut self.staged);

        let mut connection = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Infrastructure)?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|e| DomainError::Infrastructure(e.into()))?;

        for row in &rows {
            transaction
                .execute(
                    INSERT_DETECTION,
                    &[
                        &row.id,
                        &row.camera_name,
                        &row.image_name,
                        &row.image_size_bytes,
                        &row.detection_label,
                        &row.detected_at,
                        &row.remote_storage_container,
                        &row.remote_storage_file_path,
                        &row.score,
                        &row.origin_x,
                        &row.origin_y,
                        &row.width,
                        &row.height,
                    ],
                )
                .await
                .map_err(|e| DomainError::Infrastructure(e.into()))?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| DomainError::Infrastructure(e.into()))?;

        debug!(rows = rows.len(), "committed detection batch");
        Ok(rows.len() as u64)
    }
}

/// Hands each message-handling scope its own unit of work over the shared
/// pool.
pub struct PostgresUnitOfWorkFactory {
    client: PostgresClient,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    fn begin(&self) -> Box<dyn DetectionUnitOfWork> {
        Box::new(PostgresDetectionUnitOfWork::new(self.client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_with_nothing_staged_is_a_no_op() {
        // The pool points nowhere; an empty commit must not touch it.
        let client = PostgresClient::new("localhost", 1, "none", "none", "none", 1).unwrap();
        let mut unit_of_work = PostgresDetectionUnitOfWork::new(client);

        let committed = unit_of_work.commit().await.unwrap();

        assert_eq!(committed, 0);
    }
}
