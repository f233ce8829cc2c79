pub mod runner;
pub mod telemetry;

pub use runner::{Closer, Process, Runner};
pub use telemetry::{init_telemetry, TelemetryConfig};
