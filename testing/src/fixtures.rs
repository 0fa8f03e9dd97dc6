//! Sample orders and payloads.
//!
//! The shapes follow the reference `test2` order used by the publisher tool.

use order_cache_core::{Delivery, Item, Order, Payment};

/// A complete order with a single item, keyed by `order_uid`.
#[must_use]
pub fn sample_order(order_uid: &str) -> Order {
    sample_order_with_items(order_uid, 1)
}

/// A complete order with `item_count` items.
///
/// Items differ in `chrt_id` and `rid` so their order is observable.
#[must_use]
pub fn sample_order_with_items(order_uid: &str, item_count: usize) -> Order {
    let items = (0..item_count)
        .map(|i| {
            let n = i64::try_from(i).unwrap_or(i64::MAX);
            Item {
                chrt_id: 9_934_930 + n,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: format!("ab4219087a764ae0btest{i}"),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            }
        })
        .collect();

    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: format!("b563feb7b2b84b6{order_uid}"),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items,
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shard_key: "9".to_string(),
        sm_id: 99,
        date_created: "2021-11-26T06:22:19Z".to_string(),
        oof_shard: "1".to_string(),
    }
}

/// JSON payload of [`sample_order`].
#[must_use]
pub fn sample_payload(order_uid: &str) -> Vec<u8> {
    encode(&sample_order(order_uid))
}

/// JSON payload of an arbitrary order.
#[must_use]
pub fn encode(order: &Order) -> Vec<u8> {
    serde_json::to_vec(order).unwrap_or_default()
}
