pub mod http;

pub use http::HttpObjectDetector;
