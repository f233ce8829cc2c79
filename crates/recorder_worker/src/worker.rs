use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vigil_domain::{
    DomainError, ImageRecorderService, ImageReferenceMessage, QueuePublisher,
    RecorderPassInput, RemoteStorage,
};
use vigil_runtime::Process;

pub struct RecorderWorkerConfig {
    pub scan_directory: std::path::PathBuf,
    pub camera_name: String,
    pub image_queue: String,
    pub remote_storage_container: String,
    pub remote_storage_directory: String,
    pub poll_interval_secs: u64,
}

/// Runs the recorder scan pass on a poll interval until cancelled.
pub struct RecorderWorker {
    storage: Arc<dyn RemoteStorage>,
    service: ImageRecorderService,
    config: RecorderWorkerConfig,
}

impl RecorderWorker {
    pub fn new(
        storage: Arc<dyn RemoteStorage>,
        publisher: Arc<dyn QueuePublisher<ImageReferenceMessage>>,
        config: RecorderWorkerConfig,
    ) -> Self {
        info!(
            directory = %config.scan_directory.display(),
            camera = %config.camera_name,
            queue = %config.image_queue,
            "initializing recorder worker"
        );

        let service = ImageRecorderService::new(storage.clone(), publisher);

        Self {
            storage,
            service,
            config,
        }
    }

    pub fn into_runner_process(self) -> Process {
        Box::new(move |ctx| {
            Box::pin(async move {
                let input = RecorderPassInput {
                    directory: self.config.scan_directory.clone(),
                    camera_name: self.config.camera_name.clone(),
                    queue_name: self.config.image_queue.clone(),
                    remote_storage_container: self.config.remote_storage_container.clone(),
                    remote_storage_directory: self.config.remote_storage_directory.clone(),
                };
                let poll_interval = Duration::from_secs(self.config.poll_interval_secs);

                self.storage
                    .create_container(&input.remote_storage_container)
                    .await
                    .map_err(anyhow::Error::new)?;

                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => {
                            info!("received shutdown signal, stopping recorder");
                            break;
                        }
                        _ = tokio::time::sleep(poll_interval) => {
                            match self.service.record_pass(&input).await {
                                Ok(report) => {
                                    if report.scanned > 0 {
                                        info!(
                                            scanned = report.scanned,
                                            recorded = report.recorded,
                                            failed = report.failed,
                                            "scan pass finished"
                                        );
                                    }
                                }
                                // A pass-level failure (directory missing,
                                // bad input) is retried next interval;
                                // transport loss ends the worker.
                                Err(e @ DomainError::Infrastructure(_)) => {
                                    return Err(anyhow::Error::new(e));
                                }
                                Err(e) => {
                                    error!(error = %e, "scan pass failed");
                                }
                            }
                        }
                    }
                }

                Ok(())
            })
        })
    }
}
