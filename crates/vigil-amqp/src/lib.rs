pub mod client;
pub mod consumer;
pub mod publisher;

pub use client::AmqpClient;
pub use consumer::AmqpQueueConsumer;
pub use publisher::AmqpQueuePublisher;
