//! In-memory order store for fast, deterministic tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use order_cache_core::{BoxFuture, Order, OrderStore, PersistOutcome, StoreError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The part of an order write at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// The order header row
    Header,
    /// The delivery row
    Delivery,
    /// The payment row
    Payment,
    /// The item rows
    Items,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::Delivery => "delivery",
            Self::Payment => "payment",
            Self::Items => "items",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct State {
    orders: HashMap<String, Order>,
    insertion_order: Vec<String>,
    fail_next: Option<WriteStage>,
    unavailable: bool,
    persist_calls: usize,
    inserts: usize,
}

/// In-memory [`OrderStore`].
///
/// Writes stage the whole order and publish it in one step, so an injected
/// failure leaves nothing behind, mirroring a rolled-back transaction.
///
/// # Example
///
/// ```
/// use order_cache_core::{OrderStore, PersistOutcome};
/// use order_cache_testing::{InMemoryOrderStore, fixtures};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryOrderStore::new();
/// let order = fixtures::sample_order("test2");
///
/// assert_eq!(store.persist(&order).await?, PersistOutcome::Inserted);
/// assert_eq!(store.persist(&order).await?, PersistOutcome::AlreadyPresent);
/// assert_eq!(store.insert_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryOrderStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `orders`, as if committed earlier.
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for order in orders {
                state.insertion_order.push(order.order_uid.clone());
                state.orders.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    /// Make the next `persist` of a new order fail while writing `stage`.
    pub fn fail_next_persist(&self, stage: WriteStage) {
        self.state.lock().unwrap().fail_next = Some(stage);
    }

    /// Simulate losing (or regaining) the database connection.
    ///
    /// While unavailable every operation returns [`StoreError::Connection`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Committed order by id
    #[must_use]
    pub fn get(&self, order_uid: &str) -> Option<Order> {
        self.state.lock().unwrap().orders.get(order_uid).cloned()
    }

    /// Whether an order is committed
    #[must_use]
    pub fn contains(&self, order_uid: &str) -> bool {
        self.state.lock().unwrap().orders.contains_key(order_uid)
    }

    /// Number of committed orders
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `persist` calls, including failed and duplicate ones
    #[must_use]
    pub fn persist_calls(&self) -> usize {
        self.state.lock().unwrap().persist_calls
    }

    /// Number of orders actually written
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.state.lock().unwrap().inserts
    }
}

impl OrderStore for InMemoryOrderStore {
    fn record_exists<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(StoreError::Connection("store unavailable".to_string()));
            }
            Ok(state.orders.contains_key(order_uid))
        })
    }

    fn persist<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<PersistOutcome, StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.persist_calls += 1;

            if state.unavailable {
                return Err(StoreError::Connection("store unavailable".to_string()));
            }
            if state.orders.contains_key(&order.order_uid) {
                return Ok(PersistOutcome::AlreadyPresent);
            }
            if let Some(stage) = state.fail_next.take() {
                return Err(StoreError::Transaction(format!(
                    "write of {stage} rows for order {} failed, rolled back",
                    order.order_uid
                )));
            }

            state.insertion_order.push(order.order_uid.clone());
            state.orders.insert(order.order_uid.clone(), order.clone());
            state.inserts += 1;
            Ok(PersistOutcome::Inserted)
        })
    }

    fn load<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Option<Order>, StoreError>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(StoreError::Connection("store unavailable".to_string()));
            }
            Ok(state.orders.get(order_uid).cloned())
        })
    }

    fn load_all(&self) -> BoxFuture<'_, Result<Vec<Order>, StoreError>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(StoreError::Connection("store unavailable".to_string()));
            }
            Ok(state
                .insertion_order
                .iter()
                .filter_map(|uid| state.orders.get(uid).cloned())
                .collect())
        })
    }
}
