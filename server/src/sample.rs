//! The reference order sent by the `publish` tool.

use order_cache_core::{Delivery, Item, Order, Payment};

/// Order `test2` with two line items.
#[must_use]
pub fn reference_order() -> Order {
    Order {
        order_uid: "test2".to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Ivan Ivanov".to_string(),
            phone: "+9520000000".to_string(),
            zip: "2639809".to_string(),
            city: "Moscow".to_string(),
            address: "Pushkina 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: "b563feb7b2b84b6test2".to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1317,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 2817,
            custom_fee: 0,
        },
        items: vec![
            Item {
                chrt_id: 9_934_934,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 458,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            },
            Item {
                chrt_id: 9_934_935,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 1000,
                rid: "ab4219087a764ae0btest2".to_string(),
                name: "Shampoo".to_string(),
                sale: 0,
                size: "0".to_string(),
                total_price: 1000,
                nm_id: 2_389_213,
                brand: "Limbo".to_string(),
                status: 202,
            },
        ],
        locale: "ru".to_string(),
        internal_signature: String::new(),
        customer_id: "test1".to_string(),
        delivery_service: "meest".to_string(),
        shard_key: "9".to_string(),
        sm_id: 99,
        date_created: "2025-12-20T17:20:19Z".to_string(),
        oof_shard: "1".to_string(),
    }
}
