//! Integration tests for the three-step checkout flow: quoting (with local
//! estimate fallbacks), payment-intent creation with the optimistic order
//! pre-create, and the webhook settlement that follows.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn as_decimal(value: &Value) -> Decimal {
    // Monetary fields round-trip through the storage backend; comparisons
    // happen at cent precision.
    let parsed = match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => Decimal::from_f64_retain(n.as_f64().unwrap()).unwrap(),
        other => panic!("not a decimal value: {other:?}"),
    };
    parsed.round_dp(2)
}

fn indiana_address() -> Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "line1": "1 Analytical Way",
        "city": "Bloomington",
        "state": "IN",
        "postal_code": "47401",
        "country": "US"
    })
}

fn fifty_dollar_items() -> Value {
    json!([
        {"product_id": "p1", "name": "Wool Beanie", "price": "25.00", "quantity": 2}
    ])
}

// ==================== Quoting (step 2) ====================

#[tokio::test]
async fn shipping_quote_falls_back_to_estimate_without_provider() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/shipping-rates",
            Some(json!({
                "items": [{"product_id": "p1", "quantity": 2, "unit_price": "25.00"}],
                "address": indiana_address()
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    // Provider missing: flagged, but rates are still usable
    assert_eq!(body["success"], json!(false));
    let rates = body["rates"].as_array().unwrap();
    assert!(!rates.is_empty());
    // Subtotal $50 is below the threshold, so the estimate is charged
    assert!(as_decimal(&rates[0]["amount"]) > Decimal::ZERO);
    // Cheapest first
    for pair in rates.windows(2) {
        assert!(as_decimal(&pair[0]["amount"]) <= as_decimal(&pair[1]["amount"]));
    }
}

#[tokio::test]
async fn free_shipping_zeroes_cheapest_rate_but_keeps_list_price() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/shipping-rates",
            Some(json!({
                "items": [{"product_id": "p1", "quantity": 2, "unit_price": "40.00"}],
                "address": indiana_address()
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let rates = body["rates"].as_array().unwrap();

    let free: Vec<&Value> = rates
        .iter()
        .filter(|rate| as_decimal(&rate["amount"]) == Decimal::ZERO)
        .collect();
    assert_eq!(free.len(), 1, "exactly one rate becomes free");
    assert!(
        as_decimal(&free[0]["list_amount"]) > Decimal::ZERO,
        "original price survives for struck-through display"
    );
}

#[tokio::test]
async fn tax_quote_uses_flat_state_estimate() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/tax",
            Some(json!({
                "items": [{"id": "p1", "price": "25.00", "quantity": 2}],
                "address": indiana_address()
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    // $50 cart in a 7% state
    assert_eq!(as_decimal(&body["total_tax"]), dec!(3.50));
    assert_eq!(body["success"], json!(false));
    let lines = body["line_items"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(as_decimal(&lines[0]["tax"]), dec!(3.50));
}

#[tokio::test]
async fn quote_rejects_structurally_invalid_address() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/tax",
            Some(json!({
                "items": [{"id": "p1", "price": "25.00", "quantity": 1}],
                "address": {
                    "first_name": "", "last_name": "Lovelace",
                    "line1": "1 Analytical Way", "city": "Bloomington",
                    "state": "IN", "postal_code": "47401", "country": "US"
                }
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Payment intent (step 3) ====================

#[tokio::test]
async fn missing_amount_and_order_number_are_rejected() {
    let app = TestApp::new().await;

    let base = json!({
        "email": "shopper@example.com",
        "shipping_address": indiana_address(),
        "items": fifty_dollar_items(),
        "shipping_cost": "7.05",
        "tax": "3.50"
    });

    let mut without_amount = base.clone();
    without_amount["order_number"] = json!("ORD-AAAA111122");
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(without_amount),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut without_order = base;
    without_order["amount"] = json!("60.55");
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(without_order),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mismatched_total_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({
                "amount": "99.99",
                "order_number": "ORD-AAAA111122",
                "email": "shopper@example.com",
                "shipping_address": indiana_address(),
                "items": fifty_dollar_items(),
                "shipping_cost": "7.05",
                "tax": "3.50"
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_persists_even_when_intent_creation_fails() {
    let app = TestApp::new().await;

    // No payment provider configured: step 3b is fatal to the caller...
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({
                "amount": "60.55",
                "order_number": "ORD-FLOW000001",
                "email": "shopper@example.com",
                "shipping_address": indiana_address(),
                "items": fifty_dollar_items(),
                "shipping_cost": "7.05",
                "tax": "3.50",
                "shipping_method": "standard"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    // ...but the optimistic pre-create (3a) already landed.
    let response = app
        .request(Method::GET, "/api/v1/orders/by-number/ORD-FLOW000001", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = response_json(response).await;

    assert_eq!(order["status"], json!("pending_payment"));
    assert_eq!(order["payment_status"], json!("pending"));
    assert_eq!(as_decimal(&order["subtotal"]), dec!(50.00));
    assert_eq!(as_decimal(&order["shipping"]), dec!(7.05));
    assert_eq!(as_decimal(&order["tax"]), dec!(3.50));
    assert_eq!(as_decimal(&order["total"]), dec!(60.55));
    assert_eq!(
        as_decimal(&order["total"]),
        as_decimal(&order["subtotal"]) + as_decimal(&order["shipping"]) + as_decimal(&order["tax"])
    );
}

// ==================== End-to-end happy path ====================

#[tokio::test]
async fn happy_path_settles_order_and_clears_cart() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    // Signed-in shopper has a mirrored cart
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/carts/{customer_id}"),
            Some(json!({"items": fifty_dollar_items()})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Step 3: create order + intent (intent fails, order persists)
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({
                "amount": "60.55",
                "order_number": "ORD-HAPPY00001",
                "email": "shopper@example.com",
                "shipping_address": indiana_address(),
                "items": fifty_dollar_items(),
                "customer_id": customer_id,
                "shipping_cost": "7.05",
                "tax": "3.50",
                "shipping_method": "standard"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    // Processor settles asynchronously
    let response = app
        .deliver_webhook(json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_happy_1",
                "metadata": {
                    "order_number": "ORD-HAPPY00001",
                    "customer_id": customer_id.to_string()
                }
            }}
        }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"received": true}));

    // Order reconciled to {paid, processing} with the intent stamped
    let response = app
        .request(Method::GET, "/api/v1/orders/by-number/ORD-HAPPY00001", None)
        .await;
    let order = response_json(response).await;
    assert_eq!(order["status"], json!("processing"));
    assert_eq!(order["payment_status"], json!("paid"));
    assert_eq!(order["payment_intent_id"], json!("pi_happy_1"));

    // Owner's cart mirror was cleared
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{customer_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cart = response_json(response).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert_eq!(cart["item_count"], json!(0));
}
