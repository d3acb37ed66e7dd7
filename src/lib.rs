//! Storefront API Library
//!
//! Direct-to-consumer storefront backend: checkout orchestration over hosted
//! payment/shipping/tax providers, payment reconciliation webhooks, cart
//! mirroring, and back-office order management.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

pub use handlers::AppServices;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// Composes the full v1 API surface.
pub fn api_v1_routes() -> Router<AppState> {
    // Payment webhook is unauthenticated but signature-verified
    let payment_webhook = Router::new().route(
        "/payments/webhook",
        axum::routing::post(handlers::payment_webhooks::payment_webhook),
    );

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Checkout API (quoting + payment intent)
        .nest("/checkout", handlers::checkout::checkout_routes())
        // Cart mirror API for signed-in users
        .nest("/carts", handlers::carts::carts_routes())
        // Back-office orders API
        .nest("/orders", handlers::orders::orders_routes())
        // Shipment tracking lookups
        .nest("/tracking", handlers::tracking::tracking_routes())
        // Payments
        .merge(payment_webhook)
}

async fn api_status() -> Result<Json<Value>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    Ok(Json(json!({
        "status": "ok",
        "service": "storefront-api",
        "version": version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    })))
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
