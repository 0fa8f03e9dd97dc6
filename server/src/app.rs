//! Application bootstrap and lifecycle.
//!
//! Startup is strictly ordered so that no lookup is served from a cold cache
//! and no event is consumed before the cache is warm:
//!
//! 1. Connect to Postgres (and optionally apply the bundled schema)
//! 2. Warm the read cache from every committed order
//! 3. Confirm the Redpanda brokers are reachable
//! 4. Confirm the `dead_letters` table exists when rejected events are
//!    dead-lettered
//! 5. Spawn the ingest consumer
//! 6. Serve HTTP until Ctrl+C or SIGTERM
//!
//! Any failure in steps 1-4 or binding the listener aborts startup.
//!
//! # Graceful Shutdown
//!
//! 1. HTTP server stops accepting new connections
//! 2. Shutdown signal broadcast to the ingest consumer
//! 3. Wait up to `SHUTDOWN_TIMEOUT` for the in-flight event to finish
//! 4. Clean exit

use crate::config::{Config, RejectMode};
use anyhow::Context;
use order_cache_postgres::{PostgresDeadLetterQueue, PostgresOrderStore};
use order_cache_redpanda::RedpandaEventSource;
use order_cache_runtime::metrics::install_recorder;
use order_cache_runtime::{
    IngestConsumer, IngestPipeline, LookupService, ReadCache, RejectPolicy, warm_cache,
};
use order_cache_web::{AppState, StaticAssets, router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

const BROKER_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Fully wired application, ready to run.
pub struct Application {
    /// TCP listener for the HTTP server
    listener: tokio::net::TcpListener,

    /// Axum router with all HTTP routes
    app: axum::Router,

    /// Ingest consumer, spawned on `run`
    consumer: IngestConsumer,

    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,

    /// Application configuration
    config: Arc<Config>,
}

impl Application {
    /// Connect every dependency and warm the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable, the schema migration
    /// or bulk load fails, the brokers are unreachable, the dead-letter table
    /// is missing under the dead-letter policy, or the listener cannot bind.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        info!("Connecting to order database...");
        let store = PostgresOrderStore::connect(
            &config.postgres.url,
            config.postgres.max_connections,
            Duration::from_secs(config.postgres.connect_timeout),
        )
        .await
        .context("database unreachable")?;

        if config.postgres.run_migrations {
            store.migrate().await.context("schema migration failed")?;
            info!("Schema migrations applied");
        }

        let metrics = match install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Metrics disabled");
                None
            }
        };

        let cache = ReadCache::new();
        warm_cache(&store, &cache)
            .await
            .context("failed to load orders into the read cache")?;

        let source = RedpandaEventSource::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .redelivery_delay(config.redelivery_delay())
            .build()?;
        source
            .check_connection(BROKER_CHECK_TIMEOUT)
            .await
            .context("event source unreachable")?;

        let reject_policy = match config.ingest.reject_policy {
            RejectMode::DeadLetter => {
                let dead_letters = PostgresDeadLetterQueue::new(store.pool().clone());
                dead_letters.ensure_table().await.context(
                    "REJECT_POLICY=dead-letter needs the dead_letters table \
                     (set DATABASE_RUN_MIGRATIONS=true or REJECT_POLICY=leave-unacknowledged)",
                )?;
                RejectPolicy::DeadLetter(Arc::new(dead_letters))
            }
            RejectMode::LeaveUnacknowledged => RejectPolicy::LeaveUnacknowledged,
        };
        info!(reject_policy = %config.ingest.reject_policy, "Ingest pipeline configured");

        let pipeline = Arc::new(IngestPipeline::new(
            Arc::new(store),
            cache.clone(),
            reject_policy,
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let consumer = IngestConsumer::new(
            config.redpanda.orders_topic.clone(),
            Arc::new(source),
            pipeline,
            shutdown_rx,
        )
        .with_name("order-ingest");

        let mut state = AppState::new(LookupService::new(cache));
        if let Some(handle) = metrics {
            state = state.with_metrics(handle);
        }
        let assets = StaticAssets::new(&config.server.static_dir, &config.server.index_file);
        let app = router(state, &assets);

        let listener = tokio::net::TcpListener::bind(config.bind_address())
            .await
            .with_context(|| format!("failed to bind {}", config.bind_address()))?;

        Ok(Self {
            listener,
            app,
            consumer,
            shutdown_tx,
            config,
        })
    }

    /// Run until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(address = %self.config.bind_address(), "Starting HTTP server");

        let consumer_handle = self.consumer.spawn();

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        info!("HTTP server stopped, initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.config.shutdown_timeout(), consumer_handle).await {
            Ok(Ok(())) => info!("Ingest consumer stopped gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Ingest consumer task failed"),
            Err(_) => warn!("Ingest consumer shutdown timed out"),
        }

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
