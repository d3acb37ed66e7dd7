use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::handlers::common::success_response;
use crate::{errors::ServiceError, AppState};

/// Creates the router for shipment tracking lookups
pub fn tracking_routes() -> Router<AppState> {
    Router::new().route("/{tracking_number}", get(track_shipment))
}

/// Look up carrier tracking state for a shipment
#[utoipa::path(
    get,
    path = "/api/v1/tracking/{tracking_number}",
    responses(
        (status = 200, description = "Tracking state", body = crate::services::shipping::TrackingInfo),
        (status = 404, description = "Tracking number not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Carrier API error", body = crate::errors::ErrorResponse)
    ),
    tag = "Tracking"
)]
pub async fn track_shipment(
    State(state): State<AppState>,
    Path(tracking_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let info = state.services.shipping.track(&tracking_number).await?;
    Ok(success_response(info))
}
