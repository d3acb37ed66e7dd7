use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::handlers::common::{success_response, PaginatedResponse, PaginationParams};
use crate::models::{CartItem, ShippingAddress};
use crate::{errors::ServiceError, AppState};

/// Creates the router for back-office order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
        .route("/by-number/{order_number}", get(get_order_by_number))
        .route("/{id}/status", put(update_order_status))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<CartItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<order::Model> for OrderResponse {
    type Error = ServiceError;

    // The stored JSON snapshots are parsed once here, at the boundary.
    fn try_from(model: order::Model) -> Result<Self, Self::Error> {
        let items = model.line_items()?;
        let shipping_address = model.shipping_address()?;

        Ok(Self {
            id: model.id,
            order_number: model.order_number,
            customer_id: model.customer_id,
            email: model.email,
            status: model.status,
            payment_status: model.payment_status,
            items: items.items,
            shipping_address,
            subtotal: model.subtotal,
            shipping: model.shipping,
            tax: model.tax,
            total: model.total,
            currency: model.currency,
            payment_intent_id: model.payment_intent_id,
            shipping_method: model.shipping_method,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusFilter {
    pub status: Option<String>,
}

/// List orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders page"),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<OrderStatusFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = filter
        .status
        .as_deref()
        .map(parse_order_status)
        .transpose()?;

    let (orders, total) = state
        .services
        .orders
        .list(pagination.page, pagination.per_page, status)
        .await?;

    let data = orders
        .into_iter()
        .map(OrderResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(success_response(PaginatedResponse::new(
        data,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Get one order by storage id or business order number
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let model = resolve_order(&state, &id).await?;
    Ok(success_response(OrderResponse::try_from(model)?))
}

/// Get one order by business order number
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{order_number}",
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let model = state
        .services
        .orders
        .find_by_order_number(&order_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;

    Ok(success_response(OrderResponse::try_from(model)?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

/// Back-office status update (ship, deliver, cancel)
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderResponse),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = parse_order_status(&payload.status)?;
    let model = resolve_order(&state, &id).await?;

    let updated = state.services.orders.update_status(model.id, status).await?;
    Ok(success_response(OrderResponse::try_from(updated)?))
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.to_ascii_lowercase()
        .parse::<OrderStatus>()
        .map_err(|_| ServiceError::InvalidStatus(format!("Unknown order status: {raw}")))
}

// Resolve an order identifier that may be a storage UUID or a business
// order number.
async fn resolve_order(state: &AppState, id: &str) -> Result<order::Model, ServiceError> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        if let Some(model) = state.services.orders.get(uuid).await? {
            return Ok(model);
        }
    }
    if let Some(model) = state.services.orders.find_by_order_number(id).await? {
        return Ok(model);
    }
    Err(ServiceError::NotFound(format!("Order {id} not found")))
}
