pub mod client;
pub mod consumer;
pub mod object_store;
pub mod publisher;

pub use client::NatsClient;
pub use consumer::NatsQueueConsumer;
pub use object_store::NatsObjectStorage;
pub use publisher::NatsQueuePublisher;
