pub mod worker;

pub use worker::{RecorderWorker, RecorderWorkerConfig};
