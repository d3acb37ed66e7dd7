use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use serde_json::json;
use tracing::{error, warn};

use crate::services::payments::verify_signature;
use crate::services::reconciliation::GatewayEvent;
use crate::{errors::ServiceError, AppState};

// POST /api/v1/payments/webhook
//
// Unauthenticated endpoint; the HMAC signature over the raw body is the only
// trust anchor. Once the signature checks out the processor always gets a
// success acknowledgment — a failure response here would make it retry-storm
// a handler that may already have updated state correctly.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verification is mandatory: without a configured secret no payload can
    // be trusted, so the endpoint refuses instead of processing blind.
    let Some(secret) = state.config.payment.webhook_secret.clone() else {
        return Err(ServiceError::ServiceUnavailable(
            "payment webhook secret not configured".to_string(),
        ));
    };

    let tolerance = state.config.payment.webhook_tolerance_secs;
    if !verify_signature(&headers, &body, &secret, tolerance) {
        warn!("Payment webhook signature verification failed");
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    let event: GatewayEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {e}")))?;

    // Reconciliation failures are logged, never surfaced: the ack below
    // controls redelivery behavior deliberately.
    if let Err(err) = state.services.reconciliation.process(event).await {
        error!("Webhook reconciliation failed: {err}");
    }

    Ok(Json(json!({ "received": true })))
}
