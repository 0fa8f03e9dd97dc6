//! Order cache HTTP server and ingest consumer.

use order_cache_server::{Application, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_cache=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order cache");

    let config = Config::from_env();
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        orders_topic = %config.redpanda.orders_topic,
        consumer_group = %config.redpanda.consumer_group,
        address = %config.bind_address(),
        "Configuration loaded"
    );

    Application::build(config).await?.run().await
}
