//! Order lookup endpoint.

use crate::WebResult;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use order_cache_core::Order;
use serde::Deserialize;
use std::sync::Arc;

/// Query string of `GET /order`.
#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    /// Order id; absent and empty are both rejected
    pub id: Option<String>,
}

/// Look up a cached order.
///
/// # Endpoint
///
/// ```text
/// GET /order?id=<order_uid>
/// ```
///
/// # Status Codes
///
/// - 200 OK: the order as JSON
/// - 400 Bad Request: `id` missing or empty
/// - 404 Not Found: no cached order with this id
///
/// # Errors
///
/// Returns [`AppError`](crate::AppError) for the 400 and 404 cases.
pub async fn get_order(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> WebResult<Json<Arc<Order>>> {
    let order = state.lookup.lookup(query.id.as_deref()).await?;
    Ok(Json(order))
}
