use std::time::Duration;

use axum::http::HeaderMap;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::instrument;

use crate::config::PaymentConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// A created payment intent. The client secret goes back to the browser for
/// confirmation with the processor SDK; it is never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Processor-side line item of a hosted checkout session, used by the
/// session-completed fallback order path.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionLineItem {
    #[serde(default)]
    pub price_id: Option<String>,
    pub description: String,
    pub quantity: i32,
    /// Line total in minor units
    pub amount_total: i64,
}

#[derive(Debug, Deserialize)]
struct SessionLineItemList {
    data: Vec<SessionLineItem>,
}

/// Client for the hosted payment-intent API.
#[derive(Clone)]
pub struct PaymentGatewayClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

impl PaymentGatewayClient {
    pub fn new(payment: &PaymentConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client"),
            base_url: payment.base_url.trim_end_matches('/').to_string(),
            secret_key: payment.secret_key.clone(),
        }
    }

    fn secret_key(&self) -> Result<&str, ServiceError> {
        self.secret_key.as_deref().ok_or_else(|| {
            ServiceError::PaymentFailed("payment provider not configured".to_string())
        })
    }

    /// Creates a payment intent for the finalized checkout total. Metadata
    /// stays minimal (order number, optionally the owner) to respect the
    /// processor's metadata size limits.
    #[instrument(skip(self, metadata))]
    pub async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        receipt_email: Option<&str>,
        metadata: &[(String, String)],
    ) -> Result<PaymentIntent, ServiceError> {
        let secret_key = self.secret_key()?;

        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), to_minor_units(amount)?.to_string()),
            ("currency".to_string(), currency.to_ascii_lowercase()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(email) = receipt_email {
            form.push(("receipt_email".to_string(), email.to_string()));
        }
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentFailed(format!(
                "payment intent creation returned {status}: {body}"
            )));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| ServiceError::PaymentFailed(e.to_string()))
    }

    /// Fetches the processor-side line items of a hosted checkout session.
    #[instrument(skip(self))]
    pub async fn get_session_line_items(
        &self,
        session_id: &str,
    ) -> Result<Vec<SessionLineItem>, ServiceError> {
        let secret_key = self.secret_key()?;

        let response = self
            .client
            .get(format!(
                "{}/checkout/sessions/{session_id}/line_items",
                self.base_url
            ))
            .basic_auth(secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "session line items returned {}",
                response.status()
            )));
        }

        let body: SessionLineItemList = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(body.data)
    }
}

/// Converts a decimal currency amount to integer minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("amount {amount} out of range")))
}

/// Converts integer minor units to a decimal currency amount.
pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

/// Verifies the processor webhook signature over the raw payload.
///
/// Supports the processor's `Stripe-Signature: t=...,v1=...` scheme and a
/// generic `x-timestamp`/`x-signature` pair; both sign `"{timestamp}.{body}"`
/// with HMAC-SHA256 and hex encoding. Timestamps outside the tolerance
/// window are rejected.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if !timestamp_within_tolerance(ts, tolerance_secs) {
                return false;
            }
            return constant_time_eq(&expected_signature(ts, payload, secret), sig);
        }
    }

    // Stripe-style: Stripe-Signature with t=, v1=
    if let Some(sig) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.trim().split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            if !timestamp_within_tolerance(ts, tolerance_secs) {
                return false;
            }
            return constant_time_eq(&expected_signature(ts, payload, secret), v1);
        }
    }

    false
}

fn expected_signature(timestamp: &str, payload: &Bytes, secret: &str) -> String {
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn timestamp_within_tolerance(ts: &str, tolerance_secs: u64) -> bool {
    match ts.parse::<i64>() {
        Ok(ts) => {
            let now = chrono::Utc::now().timestamp();
            (now - ts).unsigned_abs() <= tolerance_secs
        }
        // Non-numeric timestamps are signed as-is and carry no expiry
        Err(_) => true,
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rust_decimal_macros::dec;

    fn signed_headers(secret: &str, payload: &Bytes, ts: i64) -> HeaderMap {
        let sig = expected_signature(&ts.to_string(), payload, secret);
        let mut headers = HeaderMap::new();
        headers.insert(
            "Stripe-Signature",
            HeaderValue::from_str(&format!("t={ts},v1={sig}")).unwrap(),
        );
        headers
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = Bytes::from_static(b"{\"type\":\"payment_intent.succeeded\"}");
        let now = chrono::Utc::now().timestamp();
        let headers = signed_headers("whsec_test", &payload, now);

        assert!(verify_signature(&headers, &payload, "whsec_test", 300));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = Bytes::from_static(b"{}");
        let now = chrono::Utc::now().timestamp();
        let headers = signed_headers("whsec_other", &payload, now);

        assert!(!verify_signature(&headers, &payload, "whsec_test", 300));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = Bytes::from_static(b"{\"amount\":100}");
        let now = chrono::Utc::now().timestamp();
        let headers = signed_headers("whsec_test", &payload, now);

        let tampered = Bytes::from_static(b"{\"amount\":999}");
        assert!(!verify_signature(&headers, &tampered, "whsec_test", 300));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = Bytes::from_static(b"{}");
        let old = chrono::Utc::now().timestamp() - 3600;
        let headers = signed_headers("whsec_test", &payload, old);

        assert!(!verify_signature(&headers, &payload, "whsec_test", 300));
    }

    #[test]
    fn missing_headers_are_rejected() {
        let payload = Bytes::from_static(b"{}");
        assert!(!verify_signature(
            &HeaderMap::new(),
            &payload,
            "whsec_test",
            300
        ));
    }

    #[test]
    fn generic_header_scheme_is_supported() {
        let payload = Bytes::from_static(b"{\"ok\":true}");
        let now = chrono::Utc::now().timestamp();
        let sig = expected_signature(&now.to_string(), &payload, "whsec_test");

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&now.to_string()).unwrap());
        headers.insert("x-signature", HeaderValue::from_str(&sig).unwrap());

        assert!(verify_signature(&headers, &payload, "whsec_test", 300));
    }

    #[test]
    fn minor_unit_conversions() {
        assert_eq!(to_minor_units(dec!(53.50)).unwrap(), 5350);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(from_minor_units(5350), dec!(53.50));
        assert_eq!(from_minor_units(0), dec!(0.00));
    }
}
