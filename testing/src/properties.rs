//! Property-based testing utilities.
//!
//! Strategies produce orders that pass validation unless stated otherwise.

use order_cache_core::{Delivery, Item, Order, Payment};
use proptest::collection::vec;
use proptest::prelude::*;

/// Any line item.
pub fn item_strategy() -> impl Strategy<Value = Item> {
    (
        any::<i64>(),
        "[A-Z]{4,12}",
        0i64..100_000,
        "[a-z0-9]{8,20}",
        "\\PC{0,16}",
        0i32..100,
        0i64..100_000,
        any::<i32>(),
    )
        .prop_map(
            |(chrt_id, track_number, price, rid, name, sale, total_price, status)| Item {
                chrt_id,
                track_number,
                price,
                rid,
                name,
                sale,
                size: "0".to_string(),
                total_price,
                nm_id: chrt_id.wrapping_mul(7),
                brand: "Brand".to_string(),
                status,
            },
        )
}

/// A valid order with the given id and 1 to `max_items` items.
pub fn order_strategy_for(order_uid: String, max_items: usize) -> impl Strategy<Value = Order> {
    (
        vec(item_strategy(), 1..=max_items.max(1)),
        "[a-z]{2}",
        "\\PC{0,24}",
        0i64..1_000_000,
        any::<i32>(),
    )
        .prop_map(move |(items, locale, city, amount, sm_id)| Order {
            order_uid: order_uid.clone(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                city,
                ..Delivery::default()
            },
            payment: Payment {
                amount,
                currency: "USD".to_string(),
                ..Payment::default()
            },
            items,
            locale,
            sm_id,
            ..Order::default()
        })
}

/// A valid order with a random id.
pub fn order_strategy() -> impl Strategy<Value = Order> {
    "[a-z0-9]{1,16}".prop_flat_map(|uid| order_strategy_for(uid, 5))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_orders_validate(order in order_strategy()) {
            prop_assert!(order.validate().is_ok());
        }
    }
}
