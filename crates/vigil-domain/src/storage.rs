use crate::error::DomainResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Remote object storage: named blobs inside named containers.
///
/// `download` of a nonexistent object is an explicit `NotFound` error,
/// never empty-success. Implementations must be safe for concurrent use.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn create_container(&self, container: &str) -> DomainResult<()>;

    async fn upload(&self, container: &str, path: &str, content: Bytes) -> DomainResult<()>;

    async fn download(&self, container: &str, path: &str) -> DomainResult<Bytes>;

    async fn delete(&self, container: &str, path: &str) -> DomainResult<()>;

    async fn list(&self, container: &str) -> DomainResult<Vec<String>>;
}
