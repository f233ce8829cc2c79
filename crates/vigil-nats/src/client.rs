use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use tracing::info;

/// Connection wrapper shared by the queue and object-store adapters.
pub struct NatsClient {
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!("Connecting to NATS at {} (timeout={:?})", url, timeout);

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client);

        info!("Successfully connected to NATS");
        Ok(Self { jetstream })
    }

    /// Create the stream backing a queue if it does not exist yet. The
    /// stream also captures `<queue>.deadletter` so failed messages stay
    /// inspectable.
    pub async fn ensure_queue(&self, queue_name: &str) -> Result<()> {
        info!("Ensuring stream for queue '{}' exists", queue_name);

        let stream_config = StreamConfig {
            name: queue_name.to_string(),
            subjects: vec![queue_name.to_string(), format!("{}.>", queue_name)],
            ..Default::default()
        };

        match self.jetstream.get_stream(queue_name).await {
            Ok(_) => {
                info!("Stream '{}' already exists", queue_name);
            }
            Err(_) => {
                self.jetstream
                    .create_stream(stream_config)
                    .await
                    .context("Failed to create stream")?;
                info!("Created stream '{}'", queue_name);
            }
        }

        Ok(())
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub async fn close(self) {
        info!("Closing NATS connection");
        // Connection closes when dropped.
    }
}
