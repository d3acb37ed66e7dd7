use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::cart;
use crate::handlers::common::{no_content_response, success_response};
use crate::models::{CartContents, CartItem};
use crate::{errors::ServiceError, AppState};

/// Creates the router for the signed-in cart mirror endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/{customer_id}", get(get_cart))
        .route("/{customer_id}", put(sync_cart))
        .route("/{customer_id}", delete(clear_cart))
        .route("/{customer_id}/merge", post(merge_cart))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartPayload {
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub customer_id: Uuid,
    pub items: Vec<CartItem>,
    pub item_count: i32,
    pub subtotal: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl CartResponse {
    fn from_record(record: cart::Model) -> Result<Self, ServiceError> {
        let contents = record.contents()?;
        Ok(Self {
            customer_id: record.customer_id,
            item_count: contents.item_count(),
            subtotal: contents.subtotal(),
            items: contents.items,
            updated_at: record.updated_at,
        })
    }
}

/// Fetch the mirrored cart for a customer
async fn get_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state
        .services
        .carts
        .get_for_customer(customer_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart for {customer_id} not found")))?;

    Ok(success_response(CartResponse::from_record(record)?))
}

/// Last-write-wins mirror write from the client cart
async fn sync_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<CartPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state
        .services
        .carts
        .sync(customer_id, CartContents::new(payload.items))
        .await?;

    Ok(success_response(CartResponse::from_record(record)?))
}

/// Sign-in merge: local items win ties against the mirror
async fn merge_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<CartPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let (record, _merged) = state
        .services
        .carts
        .merge_on_sign_in(customer_id, CartContents::new(payload.items))
        .await?;

    Ok(success_response(CartResponse::from_record(record)?))
}

/// Empty the mirrored cart
async fn clear_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.clear_for_customer(customer_id).await?;
    Ok(no_content_response())
}
