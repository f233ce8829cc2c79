mod config;

use config::ServiceConfig;
use detection_worker::{DetectionWorker, DetectionWorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vigil_amqp::{AmqpClient, AmqpQueueConsumer, AmqpQueuePublisher};
use vigil_detect::HttpObjectDetector;
use vigil_domain::{
    DetectionMessage, ImageReferenceMessage, QueueConsumer, QueuePublisher,
};
use vigil_nats::{NatsClient, NatsObjectStorage, NatsQueueConsumer, NatsQueuePublisher};
use vigil_postgres::{MigrationRunner, PostgresClient, PostgresUnitOfWorkFactory};
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
        service_name: "vigil-detection".to_string(),
        log_level: config.log_level.clone(),
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        broker = %config.broker_backend,
        image_queue = %config.image_queue,
        detection_queue = %config.detection_queue,
        "Starting vigil-detection service"
    );

    // PostgreSQL
    if config.run_migrations {
        let runner = MigrationRunner::new(
            config.goose_binary_path.clone(),
            config.postgres_migrations_dir.clone(),
            config.postgres_dsn(),
        );
        if let Err(e) = runner.run_migrations().await {
            error!("Failed to run migrations: {:#}", e);
            std::process::exit(1);
        }
    }

    let postgres_client = match create_postgres_client(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };

    // NATS carries object storage regardless of the broker backend.
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

    // Broker backend selection happens only here; the pipeline is wired
    // against the traits.
    let publisher: Arc<dyn QueuePublisher<DetectionMessage>>;
    let consumer: Arc<dyn QueueConsumer<ImageReferenceMessage>>;
    let mut amqp_client: Option<Arc<AmqpClient>> = None;

    match config.broker_backend.as_str() {
        "nats" => {
            for queue in [&config.image_queue, &config.detection_queue] {
                if let Err(e) = nats_client.ensure_queue(queue).await {
                    error!("Failed to ensure queue '{}': {:#}", queue, e);
                    std::process::exit(1);
                }
            }
            publisher = Arc::new(NatsQueuePublisher::new(nats_client.jetstream().clone()));
            consumer = Arc::new(NatsQueueConsumer::new(
                nats_client.jetstream().clone(),
                &config.consumer_name,
                config.nats_batch_wait_secs,
            ));
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
            consumer = match AmqpQueueConsumer::new(&client, &config.consumer_name).await {
                Ok(consumer) => Arc::new(consumer),
                Err(e) => {
                    error!("Failed to create AMQP consumer: {:#}", e);
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

    let detector = match HttpObjectDetector::new(
        &config.detector_url,
        Duration::from_secs(config.detector_timeout_secs),
    ) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            error!("Failed to create detection client: {:#}", e);
            std::process::exit(1);
        }
    };

    let uow_factory = Arc::new(PostgresUnitOfWorkFactory::new(postgres_client));

    let worker = DetectionWorker::new(
        detector,
        storage,
        publisher,
        uow_factory,
        consumer,
        DetectionWorkerConfig {
            image_queue: config.image_queue.clone(),
            detection_queue: config.detection_queue.clone(),
            max_concurrent: config.max_concurrent,
        },
    );

    let runner = Runner::new()
        .with_named_process("object_detection", worker.into_runner_process())
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

async fn create_postgres_client(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    let client = PostgresClient::new(
        &config.postgres_host,
        config.postgres_port,
        &config.postgres_database,
        &config.postgres_username,
        &config.postgres_password,
        config.postgres_max_pool_size,
    )?;
    client.ping().await?;
    Ok(client)
}
