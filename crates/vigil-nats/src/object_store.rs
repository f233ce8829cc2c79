use anyhow::Context;
use async_nats::jetstream;
use async_nats::jetstream::object_store::{InfoErrorKind, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tracing::debug;
use vigil_domain::{DomainError, DomainResult, RemoteStorage};

/// Remote storage over JetStream object-store buckets; one bucket per
/// container.
pub struct NatsObjectStorage {
    jetstream: jetstream::Context,
}

impl NatsObjectStorage {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self { jetstream }
    }

    async fn bucket(&self, container: &str) -> DomainResult<ObjectStore> {
        self.jetstream
            .get_object_store(container)
            .await
            .map_err(|e| {
                DomainError::NotFound(format!("container '{container}' not available: {e}"))
            })
    }
}

#[async_trait]
impl RemoteStorage for NatsObjectStorage {
    async fn create_container(&self, container: &str) -> DomainResult<()> {
        match self.jetstream.get_object_store(container).await {
            Ok(_) => {
                debug!(container = %container, "container already exists");
                Ok(())
            }
            Err(_) => {
                debug!(container = %container, "creating container");
                self.jetstream
                    .create_object_store(jetstream::object_store::Config {
                        bucket: container.to_string(),
                        ..Default::default()
                    })
                    .await
                    .context("failed to create object store bucket")
                    .map_err(DomainError::Infrastructure)?;
                Ok(())
            }
        }
    }

    async fn upload(&self, container: &str, path: &str, content: Bytes) -> DomainResult<()> {
        let bucket = self.bucket(container).await?;
        let mut reader = &content[..];
        bucket
            .put(path, &mut reader)
            .await
            .context("failed to upload object")
            .map_err(DomainError::Infrastructure)?;
        Ok(())
    }

    async fn download(&self, container: &str, path: &str) -> DomainResult<Bytes> {
        let bucket = self.bucket(container).await?;

        // A missing object is an explicit not-found, never empty-success.
        if let Err(e) = bucket.info(path).await {
            if e.kind() == InfoErrorKind::NotFound {
                return Err(DomainError::NotFound(format!(
                    "object '{path}' not found in container '{container}'"
                )));
            }
            return Err(DomainError::Infrastructure(
                anyhow::Error::new(e).context("failed to query object info"),
            ));
        }

        let mut object = bucket
            .get(path)
            .await
            .context("failed to get object")
            .map_err(DomainError::Infrastructure)?;

        let mut buf = Vec::new();
        object
            .read_to_end(&mut buf)
            .await
            .context("failed to read object content")
            .map_err(DomainError::Infrastructure)?;

        Ok(Bytes::from(buf))
    }

    async fn delete(&self, container: &str, path: &str) -> DomainResult<()> {
        let bucket = self.bucket(container).await?;
        bucket
            .delete(path)
            .await
            .context("failed to delete object")
            .map_err(DomainError::Infrastructure)?;
        Ok(())
    }

    async fn list(&self, container: &str) -> DomainResult<Vec<String>> {
        let bucket = self.bucket(container).await?;
        let mut entries = bucket
            .list()
            .await
            .context("failed to list container")
            .map_err(DomainError::Infrastructure)?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next().await {
            let info = entry
                .context("failed to read list entry")
                .map_err(DomainError::Infrastructure)?;
            paths.push(info.name);
        }

        Ok(paths)
    }
}
