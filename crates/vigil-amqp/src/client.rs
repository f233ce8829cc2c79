use anyhow::{Context, Result};
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::info;

/// AMQP connection wrapper. Channels are cheap; publisher and consumer
/// each get their own so a consumer error never tears down publishing.
pub struct AmqpClient {
    connection: Connection,
}

impl AmqpClient {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to AMQP broker at {}", url);

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("Failed to connect to AMQP broker")?;

        info!("Successfully connected to AMQP broker");
        Ok(Self { connection })
    }

    pub async fn create_channel(&self) -> Result<Channel> {
        self.connection
            .create_channel()
            .await
            .context("Failed to create AMQP channel")
    }

    pub async fn close(self) {
        info!("Closing AMQP connection");
        if let Err(e) = self.connection.close(200, "shutdown").await {
            tracing::warn!(error = %e, "error closing AMQP connection");
        }
    }
}
