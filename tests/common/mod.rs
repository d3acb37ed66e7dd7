use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use storefront_api::{
    config::AppConfig,
    db,
    events::{self, EventSender},
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Helper harness spinning up the app over an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps every query on the same
        // in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment.webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Issue a JSON request against the router.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                builder
                    .body(Body::from(json.to_string()))
                    .expect("request body")
            }
            None => builder.body(Body::empty()).expect("request body"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Deliver a webhook event with a valid signature over the raw body.
    pub async fn deliver_webhook(&self, event: Value) -> Response {
        let body = event.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_payload(WEBHOOK_SECRET, &timestamp.to_string(), &body);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                "Stripe-Signature",
                format!("t={timestamp},v1={signature}"),
            )
            .body(Body::from(body))
            .expect("webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("webhook response")
    }

    /// Deliver a webhook event with a deliberately wrong signature.
    pub async fn deliver_webhook_bad_signature(&self, event: Value) -> Response {
        let body = event.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_payload("whsec_wrong_secret", &timestamp.to_string(), &body);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                "Stripe-Signature",
                format!("t={timestamp},v1={signature}"),
            )
            .body(Body::from(body))
            .expect("webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("webhook response")
    }
}

/// HMAC-SHA256 over `"{timestamp}.{body}"`, hex-encoded — the processor's
/// signing scheme.
pub fn sign_payload(secret: &str, timestamp: &str, body: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{timestamp}.{body}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Read a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
