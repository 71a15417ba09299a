//! Outbox relay process.
//!
//! Wires the outbox processor to its storage and broker from [`Config`] and
//! runs it in a [`RelayRunner`] loop until the iteration budget is spent or
//! a shutdown signal arrives.

pub mod config;

use std::future::Future;
use std::sync::Arc;

use outbox::{
    InMemoryLockProvider, InMemoryOutboxRepository, LockProvider, LoggingMessageBus, MessageBus,
    OutboxError, OutboxProcessor, OutboxRepository, PostgresLockProvider,
    PostgresOutboxRepository, PublishError, RelayRunner, RelaySummary,
};
use persistence::{PersistenceError, PgSession};
use thiserror::Error;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use config::{Config, LogFormat};

/// Failures that stop the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Storage setup failed: {0}")]
    Storage(#[from] PersistenceError),

    #[error("Broker setup failed: {0}")]
    Broker(#[from] PublishError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, finishing current batch");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, finishing current batch");
        }
    }
}

type Storage = (Arc<dyn OutboxRepository>, Arc<dyn LockProvider>);

async fn storage(config: &Config) -> Result<Storage, RelayError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, relaying from an empty in-memory outbox");
        return Ok((
            Arc::new(InMemoryOutboxRepository::new()),
            Arc::new(InMemoryLockProvider::new()),
        ));
    };

    let pool = persistence::connect(url, config.max_connections).await?;
    persistence::run_migrations(&pool).await?;
    tracing::info!(max_connections = config.max_connections, "connected to PostgreSQL");

    Ok((
        Arc::new(PostgresOutboxRepository::new(PgSession::new(pool.clone()))),
        Arc::new(PostgresLockProvider::new(pool)),
    ))
}

fn message_bus(config: &Config) -> Result<Arc<dyn MessageBus>, RelayError> {
    #[cfg(feature = "kafka")]
    if let Some(brokers) = config.kafka_brokers.as_deref() {
        let bus = outbox::KafkaMessageBus::new(brokers, std::time::Duration::from_secs(5))?;
        return Ok(Arc::new(bus));
    }

    if config.kafka_brokers.is_some() && cfg!(not(feature = "kafka")) {
        tracing::warn!("KAFKA_BROKERS ignored, relay built without the kafka feature");
    }
    tracing::info!("publishing to the log");
    Ok(Arc::new(LoggingMessageBus))
}

/// Builds the relay from `config` and runs it until the iteration budget is
/// spent or `shutdown` resolves.
pub async fn run<F>(config: &Config, shutdown: F) -> Result<RelaySummary, RelayError>
where
    F: Future<Output = ()>,
{
    let (repository, locks) = storage(config).await?;
    let bus = message_bus(config)?;

    let processor = OutboxProcessor::new(repository, bus, locks).with_domain(config.domain.clone());
    let runner = RelayRunner::new(processor, config.batch_size, config.iterations, config.delay);

    Ok(runner.run(shutdown).await?)
}
