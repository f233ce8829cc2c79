use crate::detection::ImageDetection;
use crate::error::DomainResult;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Staged-write/atomic-commit boundary for one message-handling scope.
///
/// `stage` only buffers; `commit` flushes everything in one transaction.
/// One instance per handled message, obtained from the factory and
/// discarded after commit.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DetectionUnitOfWork: Send {
    fn stage(&mut self, detection: ImageDetection) -> DomainResult<()>;

    async fn commit(&mut self) -> DomainResult<u64>;
}

/// Produces a fresh, isolated unit of work per message so concurrent
/// handler invocations never share a staging buffer.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait UnitOfWorkFactory: Send + Sync {
    fn begin(&self) -> Box<dyn DetectionUnitOfWork>;
}

/// Read side of the detection store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DetectionReadRepository: Send + Sync {
    async fn get_all_by_date(&self, date: NaiveDate) -> DomainResult<Vec<ImageDetection>>;
}
