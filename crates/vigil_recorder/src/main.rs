mod config;

use config::ServiceConfig;
use recorder_worker::{RecorderWorker, RecorderWorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vigil_amqp::{AmqpClient, AmqpQueuePublisher};
use vigil_domain::{ImageReferenceMessage, QueuePublisher};
use vigil_nats::{NatsClient, NatsObjectStorage, NatsQueuePublisher};
use vigil_runtime::{init_telemetry, Runner, TelemetryConfig};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: "vigil-recorder".to_string(),
        log_level: config.log_level.clone(),
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        broker = %config.broker_backend,
        directory = %config.scan_directory,
        camera = %config.camera_name,
        "Starting vigil-recorder service"
    );

    let nats_client = match NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    let storage = Arc::new(NatsObjectStorage::new(nats_client.jetstream().clone()));

    let publisher: Arc<dyn QueuePublisher<ImageReferenceMessage>>;
    let mut amqp_client: Option<Arc<AmqpClient>> = None;

    match config.broker_backend.as_str() {
        "nats" => {
            if let Err(e) = nats_client.ensure_queue(&config.image_queue).await {
                error!("Failed to ensure queue '{}': {:#}", config.image_queue, e);
                std::process::exit(1);
            }
            publisher = Arc::new(NatsQueuePublisher::new(nats_client.jetstream().clone()));
        }
        "amqp" => {
            let client = match AmqpClient::connect(&config.amqp_url).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    error!("Failed to initialize AMQP: {:#}", e);
                    std::process::exit(1);
                }
            };
            publisher = match AmqpQueuePublisher::new(&client).await {
                Ok(publisher) => Arc::new(publisher),
                Err(e) => {
                    error!("Failed to create AMQP publisher: {:#}", e);
                    std::process::exit(1);
                }
            };
            amqp_client = Some(client);
        }
        other => {
            error!("Unknown broker backend '{}', expected 'nats' or 'amqp'", other);
            std::process::exit(1);
        }
    }

    let worker = RecorderWorker::new(
        storage,
        publisher,
        RecorderWorkerConfig {
            scan_directory: config.scan_directory.clone().into(),
            camera_name: config.camera_name.clone(),
            image_queue: config.image_queue.clone(),
            remote_storage_container: config.remote_storage_container.clone(),
            remote_storage_directory: config.remote_storage_directory.clone(),
            poll_interval_secs: config.poll_interval_secs,
        },
    );

    let runner = Runner::new()
        .with_named_process("image_recorder", worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            if let Ok(client) = Arc::try_unwrap(nats_client) {
                client.close().await;
            }
            if let Some(client) = amqp_client {
                if let Ok(client) = Arc::try_unwrap(client) {
                    client.close().await;
                }
            }
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}
