//! The order record and its sub-records.
//!
//! A record arrives as one JSON document per event. Field names on the wire
//! are fixed by the producer, so every struct here maps them one to one; the
//! only rename is `shardkey`.
//!
//! Decoding is lenient about absent fields: a missing field takes its
//! default value. Whether the result is usable is decided separately by
//! [`Order::validate`], which keeps "malformed" and "incomplete" as two
//! distinct outcomes.

use crate::error::{IngestError, ValidationError};
use serde::{Deserialize, Serialize};

/// An order and everything it owns.
///
/// `order_uid` is the sole join key for the delivery, payment and item rows
/// in the durable store and the key of the read cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    /// Unique order identifier
    pub order_uid: String,
    /// Shipment track number
    pub track_number: String,
    /// Entry channel
    pub entry: String,
    /// Recipient details
    pub delivery: Delivery,
    /// Payment details
    pub payment: Payment,
    /// Line items, in the order they arrived in the event
    pub items: Vec<Item>,
    /// Customer locale
    pub locale: String,
    /// Internal signature
    pub internal_signature: String,
    /// Customer identifier
    pub customer_id: String,
    /// Delivery service name
    pub delivery_service: String,
    /// Shard key
    #[serde(rename = "shardkey")]
    pub shard_key: String,
    /// Shard manager id
    pub sm_id: i32,
    /// Creation timestamp, kept as the producer encoded it
    pub date_created: String,
    /// Out-of-shard flag
    pub oof_shard: String,
}

/// Recipient of an order. One per order, no identity of its own.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    /// Recipient name
    pub name: String,
    /// Recipient phone
    pub phone: String,
    /// Postal code
    pub zip: String,
    /// City
    pub city: String,
    /// Street address
    pub address: String,
    /// Region
    pub region: String,
    /// Recipient email
    pub email: String,
}

/// Payment attached to an order. Amounts are in minor units.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    /// Transaction id
    pub transaction: String,
    /// Request id
    pub request_id: String,
    /// Currency code
    pub currency: String,
    /// Payment provider
    pub provider: String,
    /// Amount charged
    pub amount: i64,
    /// Payment time, epoch seconds
    pub payment_dt: i64,
    /// Bank name
    pub bank: String,
    /// Delivery cost
    pub delivery_cost: i64,
    /// Goods total
    pub goods_total: i64,
    /// Custom fee
    pub custom_fee: i64,
}

/// A single line item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Catalog id
    pub chrt_id: i64,
    /// Track number
    pub track_number: String,
    /// Unit price
    pub price: i64,
    /// Row id
    pub rid: String,
    /// Item name
    pub name: String,
    /// Sale percentage
    pub sale: i32,
    /// Size label
    pub size: String,
    /// Total price after sale
    pub total_price: i64,
    /// Numeric model id
    pub nm_id: i64,
    /// Brand
    pub brand: String,
    /// Status code
    pub status: i32,
}

impl Order {
    /// Decode an order from an event payload.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Decode`] if the payload is not a JSON document
    /// of the expected shape (syntax error or a field of the wrong type).
    pub fn decode(payload: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(payload).map_err(IngestError::Decode)
    }

    /// Check the order is complete enough to persist.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::MissingOrderUid`] if `order_uid` is empty
    /// - [`ValidationError::NoItems`] if there are no line items
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.is_empty() {
            return Err(ValidationError::MissingOrderUid);
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoItems {
                order_uid: self.order_uid.clone(),
            });
        }
        Ok(())
    }
}
