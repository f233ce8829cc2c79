use crate::detection::RecordedImage;
use crate::error::{DomainError, DomainResult};
use crate::message::ImageReferenceMessage;
use crate::queue::QueuePublisher;
use crate::storage::RemoteStorage;
use crate::validate::Validation;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Parameters for one scan pass.
#[derive(Debug, Clone)]
pub struct RecorderPassInput {
    pub directory: std::path::PathBuf,
    pub camera_name: String,
    pub queue_name: String,
    pub remote_storage_container: String,
    pub remote_storage_directory: String,
}

/// Per-pass tally. Failed files stay on disk for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecorderPassReport {
    pub scanned: usize,
    pub recorded: usize,
    pub failed: usize,
}

/// Producer side of the pipeline: picks up local images, uploads them to
/// remote storage under a timestamp-derived path, and publishes a
/// reference message per uploaded object.
pub struct ImageRecorderService {
    storage: Arc<dyn RemoteStorage>,
    publisher: Arc<dyn QueuePublisher<ImageReferenceMessage>>,
}

impl ImageRecorderService {
    pub fn new(
        storage: Arc<dyn RemoteStorage>,
        publisher: Arc<dyn QueuePublisher<ImageReferenceMessage>>,
    ) -> Self {
        Self { storage, publisher }
    }

    /// Collect `*.png`/`*.jpg` files from the directory. Files are left in
    /// place; removal happens only after a file's upload and publish both
    /// succeeded.
    pub async fn scan_directory(
        &self,
        directory: &Path,
        camera_name: &str,
    ) -> DomainResult<Vec<RecordedImage>> {
        Validation::new()
            .require_not_blank(
                &directory.to_string_lossy(),
                "scan directory cannot be empty",
            )
            .require_not_blank(camera_name, "camera name cannot be empty")
            .finish()?;

        if !directory.is_dir() {
            return Err(DomainError::NotFound(format!(
                "scan directory {} does not exist",
                directory.display()
            )));
        }

        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(directory)
            .await
            .map_err(|e| DomainError::Infrastructure(e.into()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::Infrastructure(e.into()))?
        {
            let path = entry.path();
            if !is_image_file(&path) {
                continue;
            }

            let content = tokio::fs::read(&path)
                .await
                .map_err(|e| DomainError::Infrastructure(e.into()))?;
            let captured_at = capture_time(&entry).await;
            let image_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            images.push(RecordedImage {
                camera_name: camera_name.to_string(),
                image_name,
                image_bytes: Bytes::from(content),
                captured_at,
                local_path: path,
            });
        }

        debug!(
            directory = %directory.display(),
            count = images.len(),
            "scan pass collected images"
        );

        Ok(images)
    }

    /// One full pass: scan, then upload + publish each image. Each file's
    /// outcome is independent; one failure never blocks the rest.
    pub async fn record_pass(
        &self,
        input: &RecorderPassInput,
    ) -> DomainResult<RecorderPassReport> {
        let images = self
            .scan_directory(&input.directory, &input.camera_name)
            .await?;

        let mut report = RecorderPassReport {
            scanned: images.len(),
            ..Default::default()
        };

        for image in images {
            match self.record_image(&image, input).await {
                Ok(remote_path) => {
                    if let Err(e) = tokio::fs::remove_file(&image.local_path).await {
                        error!(
                            path = %image.local_path.display(),
                            error = %e,
                            "recorded image could not be removed locally"
                        );
                    }
                    info!(
                        image = %image.image_name,
                        remote_path = %remote_path,
                        queue = %input.queue_name,
                        "image recorded and reference published"
                    );
                    report.recorded += 1;
                }
                Err(e) => {
                    error!(
                        image = %image.image_name,
                        error = %e,
                        "failed to record image, leaving file for next pass"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn record_image(
        &self,
        image: &RecordedImage,
        input: &RecorderPassInput,
    ) -> DomainResult<String> {
        Validation::new()
            .require_not_blank(&image.image_name, "image name cannot be empty")
            .require_not_blank(&image.camera_name, "camera name cannot be empty")
            .finish()?;

        let remote_path = format!(
            "{}/{}",
            input.remote_storage_directory,
            remote_file_name(image.captured_at)
        );

        self.storage
            .upload(
                &input.remote_storage_container,
                &remote_path,
                image.image_bytes.clone(),
            )
            .await?;

        let message = ImageReferenceMessage {
            queue_name: input.queue_name.clone(),
            remote_storage_container: input.remote_storage_container.clone(),
            remote_storage_file_path: remote_path.clone(),
            camera_name: image.camera_name.clone(),
            image_name: image.image_name.clone(),
            image_created_date_time_utc: image.captured_at,
        };
        self.publisher.publish(&message).await?;

        Ok(remote_path)
    }
}

/// Deterministic remote name derived from the capture timestamp.
fn remote_file_name(captured_at: DateTime<Utc>) -> String {
    format!("{}_image.png", captured_at.format("%Y%m%d%H%M%S"))
}

fn is_image_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("png") | Some("jpg")
    )
}

async fn capture_time(entry: &tokio::fs::DirEntry) -> DateTime<Utc> {
    match entry.metadata().await {
        Ok(metadata) => metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now()),
        Err(_) => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MockQueuePublisher;
    use crate::storage::MockRemoteStorage;
    use chrono::TimeZone;

    fn pass_input(directory: &Path) -> RecorderPassInput {
        RecorderPassInput {
            directory: directory.to_path_buf(),
            camera_name: "cam1".to_string(),
            queue_name: "images".to_string(),
            remote_storage_container: "c1".to_string(),
            remote_storage_directory: "cam1".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let service = ImageRecorderService::new(
            Arc::new(MockRemoteStorage::new()),
            Arc::new(MockQueuePublisher::new()),
        );

        let result = service
            .scan_directory(Path::new("/definitely/not/here"), "cam1")
            .await;

        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn blank_camera_name_fails_validation() {
        let service = ImageRecorderService::new(
            Arc::new(MockRemoteStorage::new()),
            Arc::new(MockQueuePublisher::new()),
        );

        let result = service.scan_directory(Path::new("/tmp"), "  ").await;

        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn scan_only_picks_up_image_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"one").unwrap();
        std::fs::write(dir.path().join("b.JPG"), b"two").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let service = ImageRecorderService::new(
            Arc::new(MockRemoteStorage::new()),
            Arc::new(MockQueuePublisher::new()),
        );

        let mut images = service.scan_directory(dir.path(), "cam1").await.unwrap();
        images.sort_by(|a, b| a.image_name.cmp(&b.image_name));

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].image_name, "a.png");
        assert_eq!(images[1].image_name, "b.JPG");
    }

    #[tokio::test]
    async fn one_failed_upload_does_not_block_the_rest() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.png"), b"one").unwrap();
        std::fs::write(dir.path().join("two.png"), b"two").unwrap();

        let mut storage = MockRemoteStorage::new();
        storage
            .expect_upload()
            .times(2)
            .returning(|_, _, content: Bytes| {
                if content.as_ref() == b"one" {
                    Err(DomainError::Infrastructure(anyhow::anyhow!(
                        "storage unavailable"
                    )))
                } else {
                    Ok(())
                }
            });

        let mut publisher = MockQueuePublisher::new();
        publisher
            .expect_publish()
            .withf(|m: &ImageReferenceMessage| {
                m.queue_name == "images"
                    && m.image_name == "two.png"
                    && m.remote_storage_container == "c1"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = ImageRecorderService::new(Arc::new(storage), Arc::new(publisher));

        // Act
        let report = service.record_pass(&pass_input(dir.path())).await.unwrap();

        // Assert
        assert_eq!(
            report,
            RecorderPassReport {
                scanned: 2,
                recorded: 1,
                failed: 1
            }
        );
        // The failed file is retried next pass; the recorded one is gone.
        assert!(dir.path().join("one.png").exists());
        assert!(!dir.path().join("two.png").exists());
    }

    #[test]
    fn remote_name_is_derived_from_the_capture_timestamp() {
        let captured_at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 7).unwrap();

        assert_eq!(remote_file_name(captured_at), "20240517093007_image.png");
    }
}
