//! `PostgreSQL` implementation of [`OrderStore`].

use crate::error::{is_duplicate_order, store_error};
use order_cache_core::{
    BoxFuture, Delivery, Item, Order, OrderStore, Payment, PersistOutcome, StoreError,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use std::time::Duration;

/// `PostgreSQL`-backed durable store.
///
/// An order spans four tables joined by `order_uid`: one `orders` header row,
/// one `delivery` row, one `payment` row and one `items` row per line item.
/// All of them are inserted in a single transaction.
///
/// # Idempotency
///
/// `persist` first checks whether the header exists and returns
/// [`PersistOutcome::AlreadyPresent`] without writing if it does. If another
/// writer commits the same id between the check and the insert, the primary
/// key violation rolls the transaction back and is reported the same way.
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if no connection can be established
    /// within `acquire_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to order database");
        Ok(Self::from_pool(pool))
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, order_uid: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1)")
                .bind(order_uid)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| store_error("Existence check failed", &e))?;
        Ok(exists)
    }

    async fn persist_order(&self, order: &Order) -> Result<PersistOutcome, StoreError> {
        let order_uid = order.order_uid.as_str();

        if self.exists(order_uid).await? {
            tracing::debug!(order_uid, "Order already stored, skipping write");
            return Ok(PersistOutcome::AlreadyPresent);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", &e))?;

        if let Err(e) = write_rows(&mut tx, order).await {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(order_uid, error = %rollback, "Rollback failed");
            }
            if is_duplicate_order(&e) {
                tracing::debug!(order_uid, "Order committed concurrently, skipping write");
                return Ok(PersistOutcome::AlreadyPresent);
            }
            return Err(store_error("Failed to write order rows", &e));
        }

        tx.commit().await.map_err(|e| {
            StoreError::Transaction(format!("Failed to commit order {order_uid}: {e}"))
        })?;

        tracing::debug!(order_uid, items = order.items.len(), "Order committed");
        Ok(PersistOutcome::Inserted)
    }

    /// Load committed orders, all of them or only `only_uid`.
    ///
    /// The four tables are read in four queries and joined here. A header
    /// whose delivery or payment row is missing is still returned, with that
    /// sub-record left empty.
    async fn load_orders(&self, only_uid: Option<&str>) -> Result<Vec<Order>, StoreError> {
        let headers = sqlx::query(
            r"
            SELECT order_uid, track_number, entry, locale, internal_signature, customer_id,
                   delivery_service, shardkey, sm_id, date_created, oof_shard
            FROM orders
            WHERE $1::text IS NULL OR order_uid = $1
            ",
        )
        .bind(only_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load orders", &e))?;

        let delivery_rows = sqlx::query(
            r"
            SELECT order_uid, name, phone, zip, city, address, region, email
            FROM delivery
            WHERE $1::text IS NULL OR order_uid = $1
            ",
        )
        .bind(only_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load delivery rows", &e))?;

        let payment_rows = sqlx::query(
            r"
            SELECT order_uid, transaction, request_id, currency, provider, amount, payment_dt,
                   bank, delivery_cost, goods_total, custom_fee
            FROM payment
            WHERE $1::text IS NULL OR order_uid = $1
            ",
        )
        .bind(only_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load payment rows", &e))?;

        let item_rows = sqlx::query(
            r"
            SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE $1::text IS NULL OR order_uid = $1
            ORDER BY order_uid, id
            ",
        )
        .bind(only_uid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load item rows", &e))?;

        let mut deliveries: HashMap<String, Delivery> = keyed(&delivery_rows, row_to_delivery);
        let mut payments: HashMap<String, Payment> = keyed(&payment_rows, row_to_payment);
        let mut items: HashMap<String, Vec<Item>> = HashMap::new();
        for row in &item_rows {
            let decoded = row
                .try_get::<String, _>("order_uid")
                .and_then(|uid| Ok((uid, row_to_item(row)?)));
            match decoded {
                Ok((uid, item)) => items.entry(uid).or_default().push(item),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable item row"),
            }
        }

        let mut orders = Vec::with_capacity(headers.len());
        for row in &headers {
            let mut order = match row_to_header(row) {
                Ok(order) => order,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable order row");
                    continue;
                }
            };

            match deliveries.remove(&order.order_uid) {
                Some(delivery) => order.delivery = delivery,
                None => tracing::warn!(order_uid = %order.order_uid, "Order has no delivery row"),
            }
            match payments.remove(&order.order_uid) {
                Some(payment) => order.payment = payment,
                None => tracing::warn!(order_uid = %order.order_uid, "Order has no payment row"),
            }
            order.items = items.remove(&order.order_uid).unwrap_or_default();
            orders.push(order);
        }

        Ok(orders)
    }
}

impl OrderStore for PostgresOrderStore {
    fn record_exists<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(self.exists(order_uid))
    }

    fn persist<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<PersistOutcome, StoreError>> {
        Box::pin(self.persist_order(order))
    }

    fn load<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Option<Order>, StoreError>> {
        Box::pin(async move {
            let orders = self.load_orders(Some(order_uid)).await?;
            Ok(orders.into_iter().next())
        })
    }

    fn load_all(&self) -> BoxFuture<'_, Result<Vec<Order>, StoreError>> {
        Box::pin(async move {
            let orders = self.load_orders(None).await?;
            tracing::info!(count = orders.len(), "Loaded orders from database");
            Ok(orders)
        })
    }
}

/// Insert every row of `order` on `conn`.
async fn write_rows(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature, customer_id,
            delivery_service, shardkey, sm_id, date_created, oof_shard
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shard_key)
    .bind(order.sm_id)
    .bind(&order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut *conn)
    .await?;

    let d = &order.delivery;
    sqlx::query(
        r"
        INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(&order.order_uid)
    .bind(&d.name)
    .bind(&d.phone)
    .bind(&d.zip)
    .bind(&d.city)
    .bind(&d.address)
    .bind(&d.region)
    .bind(&d.email)
    .execute(&mut *conn)
    .await?;

    let p = &order.payment;
    sqlx::query(
        r"
        INSERT INTO payment (
            order_uid, transaction, request_id, currency, provider, amount, payment_dt,
            bank, delivery_cost, goods_total, custom_fee
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(&order.order_uid)
    .bind(&p.transaction)
    .bind(&p.request_id)
    .bind(&p.currency)
    .bind(&p.provider)
    .bind(p.amount)
    .bind(p.payment_dt)
    .bind(&p.bank)
    .bind(p.delivery_cost)
    .bind(p.goods_total)
    .bind(p.custom_fee)
    .execute(&mut *conn)
    .await?;

    for item in &order.items {
        sqlx::query(
            r"
            INSERT INTO items (
                order_uid, chrt_id, track_number, price, rid, name, sale, size,
                total_price, nm_id, brand, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(&order.order_uid)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Decode rows into a map keyed by `order_uid`, skipping unreadable rows.
fn keyed<T>(rows: &[PgRow], decode: fn(&PgRow) -> Result<T, sqlx::Error>) -> HashMap<String, T> {
    rows.iter()
        .filter_map(|row| {
            let decoded = row
                .try_get::<String, _>("order_uid")
                .and_then(|uid| Ok((uid, decode(row)?)));
            match decoded {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable row");
                    None
                }
            }
        })
        .collect()
}

fn row_to_header(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shard_key: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
        ..Order::default()
    })
}

fn row_to_delivery(row: &PgRow) -> Result<Delivery, sqlx::Error> {
    Ok(Delivery {
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}
