pub mod worker;

pub use worker::{create_detection_handler, DetectionWorker, DetectionWorkerConfig};
