//! Publish the reference `test2` order to the orders topic.
//!
//! Uses the same `REDPANDA_BROKERS` and `ORDERS_TOPIC` variables as the
//! server.

use anyhow::Context;
use order_cache_redpanda::RedpandaPublisher;
use order_cache_server::Config;
use order_cache_server::sample::reference_order;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let order = reference_order();
    let payload = serde_json::to_vec(&order).context("failed to encode order")?;

    let publisher = RedpandaPublisher::new(&config.redpanda.brokers)?;
    let (partition, offset) = publisher
        .publish(&config.redpanda.orders_topic, Some(&order.order_uid), &payload)
        .await?;

    info!(
        topic = %config.redpanda.orders_topic,
        order_uid = %order.order_uid,
        partition,
        offset,
        "Order published"
    );
    Ok(())
}
