pub mod client;
pub mod detection_repository;
pub mod migration;
pub mod models;
pub mod unit_of_work;

pub use client::PostgresClient;
pub use detection_repository::PostgresDetectionRepository;
pub use migration::MigrationRunner;
pub use models::ImageDetectionRow;
pub use unit_of_work::{PostgresDetectionUnitOfWork, PostgresUnitOfWorkFactory};
