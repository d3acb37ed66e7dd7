use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::common::{success_response, validate_input};
use crate::models::{CartItem, ShippingAddress, ShippingRate};
use crate::services::checkout::CreateIntentInput;
use crate::services::shipping::RateRequestItem;
use crate::services::tax::{TaxLineBreakdown, TaxLineItem};
use crate::{errors::ServiceError, AppState};

/// Creates the router for the checkout quoting and payment-intent endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/shipping-rates", post(quote_shipping_rates))
        .route("/tax", post(quote_tax))
        .route("/payment-intent", post(create_payment_intent))
}

/// Structurally validated shipping address input; no external address
/// verification happens in the happy path.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddressRequest {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(length(min = 1))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
    pub phone: Option<String>,
}

impl From<AddressRequest> for ShippingAddress {
    fn from(req: AddressRequest) -> Self {
        ShippingAddress {
            first_name: req.first_name,
            last_name: req.last_name,
            line1: req.line1,
            line2: req.line2,
            city: req.city,
            state: req.state,
            postal_code: req.postal_code,
            country: req.country,
            phone: req.phone,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ShippingQuoteRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<RateRequestItem>,
    #[validate]
    pub address: AddressRequest,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShippingQuoteResponse {
    pub success: bool,
    /// Selectable rates, cheapest first, free-shipping rule applied
    pub rates: Vec<ShippingRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Quote shipping rates for a cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/shipping-rates",
    request_body = ShippingQuoteRequest,
    responses(
        (status = 200, description = "Rates quoted (provider or local estimate)", body = ShippingQuoteResponse),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn quote_shipping_rates(
    State(state): State<AppState>,
    Json(payload): Json<ShippingQuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let address: ShippingAddress = payload.address.into();
    let quote = state
        .services
        .checkout
        .quote_shipping(&payload.items, &address)
        .await;

    Ok(success_response(ShippingQuoteResponse {
        success: quote.success,
        rates: quote.rates,
        error: quote.error,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TaxQuoteRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<TaxLineItem>,
    #[validate]
    pub address: AddressRequest,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaxQuoteResponse {
    pub success: bool,
    pub total_tax: Decimal,
    pub line_items: Vec<TaxLineBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Quote tax for a cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/tax",
    request_body = TaxQuoteRequest,
    responses(
        (status = 200, description = "Tax quoted (provider or local estimate)", body = TaxQuoteResponse),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn quote_tax(
    State(state): State<AppState>,
    Json(payload): Json<TaxQuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let address: ShippingAddress = payload.address.into();
    let quote = state
        .services
        .checkout
        .quote_tax(&payload.items, &address)
        .await;

    Ok(success_response(TaxQuoteResponse {
        success: quote.success,
        total_tax: quote.total_tax,
        line_items: quote.line_items,
        error: quote.error,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentIntentRequest {
    /// Finalized total: subtotal + selected shipping + tax
    pub amount: Option<Decimal>,
    /// Client-generated business order id
    pub order_number: Option<String>,
    #[validate(email)]
    pub email: String,
    #[validate]
    pub shipping_address: AddressRequest,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CartItem>,
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    pub shipping_method: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePaymentIntentResponse {
    /// Opaque secret for confirming payment with the processor SDK
    pub client_secret: String,
    pub payment_intent_id: String,
    pub order_number: String,
}

/// Create the pending order and payment intent for a finalized checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout/payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CreatePaymentIntentResponse),
        (status = 400, description = "Missing amount or order number", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment intent creation failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let amount = payload
        .amount
        .ok_or_else(|| ServiceError::BadRequest("amount is required".to_string()))?;
    let order_number = payload
        .order_number
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ServiceError::BadRequest("order_number is required".to_string()))?;

    validate_input(&payload)?;

    let intent = state
        .services
        .checkout
        .create_payment_intent(CreateIntentInput {
            amount,
            order_number,
            email: payload.email,
            shipping_address: payload.shipping_address.into(),
            items: crate::models::CartContents::new(payload.items),
            customer_id: payload.customer_id,
            shipping_cost: payload.shipping_cost,
            tax: payload.tax,
            shipping_method: payload.shipping_method,
        })
        .await?;

    Ok(success_response(CreatePaymentIntentResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.payment_intent_id,
        order_number: intent.order_number,
    }))
}
