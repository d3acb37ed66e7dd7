use std::fmt::Write as _;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, instrument};

use crate::config::EmailConfig;
use crate::entities::order;
use crate::errors::ServiceError;

/// Whether a message actually went out. `Skipped` means the provider is not
/// configured; callers treat both as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent,
    Skipped,
}

/// Client for the transactional email provider. Always best-effort at call
/// sites; a failure here never blocks order reconciliation.
#[derive(Clone)]
pub struct EmailClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_token: Option<String>,
    from_address: String,
}

impl EmailClient {
    pub fn new(email: &EmailConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: email.base_url.clone(),
            api_token: email.api_token.clone(),
            from_address: email.from_address.clone(),
        }
    }

    /// Sends the order confirmation to the order's contact address.
    ///
    /// The message is built from the order's own stored snapshot — the
    /// processor event that triggers it carries only minimal metadata.
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub async fn send_order_confirmation(
        &self,
        order: &order::Model,
    ) -> Result<EmailOutcome, ServiceError> {
        let (base_url, api_token) = match (&self.base_url, &self.api_token) {
            (Some(url), Some(token)) => (url, token),
            _ => {
                debug!("Email provider not configured; skipping confirmation");
                return Ok(EmailOutcome::Skipped);
            }
        };

        let subject = format!("Order confirmation {}", order.order_number);
        let text = render_confirmation(order)?;

        let response = self
            .client
            .post(format!("{}/messages", base_url.trim_end_matches('/')))
            .bearer_auth(api_token)
            .json(&json!({
                "from": self.from_address,
                "to": order.email,
                "subject": subject,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "email send returned {}",
                response.status()
            )));
        }

        info!(to = %order.email, "Order confirmation sent");
        Ok(EmailOutcome::Sent)
    }
}

fn render_confirmation(order: &order::Model) -> Result<String, ServiceError> {
    let items = order.line_items()?;
    let address = order.shipping_address()?;

    let mut body = String::new();
    let _ = writeln!(body, "Thanks for your order {}!", order.order_number);
    let _ = writeln!(body);
    for line in &items.items {
        let mut variant = String::new();
        if let Some(color) = &line.color {
            variant.push_str(color);
        }
        if let Some(size) = &line.size {
            if !variant.is_empty() {
                variant.push('/');
            }
            variant.push_str(size);
        }
        if variant.is_empty() {
            let _ = writeln!(body, "  {} x{} — {}", line.name, line.quantity, line.line_total());
        } else {
            let _ = writeln!(
                body,
                "  {} ({variant}) x{} — {}",
                line.name,
                line.quantity,
                line.line_total()
            );
        }
    }
    let _ = writeln!(body);
    let _ = writeln!(body, "Subtotal: {}", order.subtotal);
    let _ = writeln!(body, "Shipping: {}", order.shipping);
    let _ = writeln!(body, "Tax: {}", order.tax);
    let _ = writeln!(body, "Total: {} {}", order.total, order.currency);

    if let Some(address) = address {
        let _ = writeln!(body);
        let _ = writeln!(body, "Shipping to:");
        let _ = writeln!(body, "  {} {}", address.first_name, address.last_name);
        let _ = writeln!(body, "  {}", address.line1);
        if let Some(line2) = &address.line2 {
            let _ = writeln!(body, "  {line2}");
        }
        let _ = writeln!(
            body,
            "  {}, {} {} {}",
            address.city, address.state, address.postal_code, address.country
        );
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{OrderStatus, PaymentStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_order() -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            order_number: "ORD-TEST123456".to_string(),
            customer_id: None,
            email: "shopper@example.com".to_string(),
            items: serde_json::json!([
                {"product_id": "p1", "name": "Waxed Jacket", "price": "120.00", "quantity": 1, "color": "Olive", "size": "M"},
                {"product_id": "p2", "name": "Wool Beanie", "price": "24.00", "quantity": 2}
            ]),
            shipping_address: Some(serde_json::json!({
                "first_name": "Ada", "last_name": "Lovelace",
                "line1": "1 Analytical Way", "city": "Bloomington",
                "state": "IN", "postal_code": "47401", "country": "US"
            })),
            billing_address: None,
            subtotal: dec!(168.00),
            shipping: dec!(0.00),
            tax: dec!(11.76),
            total: dec!(179.76),
            currency: "USD".to_string(),
            status: OrderStatus::Processing,
            payment_status: PaymentStatus::Paid,
            payment_intent_id: Some("pi_123".to_string()),
            shipping_method: Some("standard".to_string()),
            notes: None,
            confirmation_sent_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn confirmation_renders_from_stored_snapshot() {
        let body = render_confirmation(&sample_order()).unwrap();

        assert!(body.contains("ORD-TEST123456"));
        assert!(body.contains("Waxed Jacket (Olive/M) x1"));
        assert!(body.contains("Wool Beanie x2"));
        assert!(body.contains("Total: 179.76 USD"));
        assert!(body.contains("Bloomington, IN 47401 US"));
    }

    #[tokio::test]
    async fn unconfigured_provider_skips_without_error() {
        let client = EmailClient::new(&EmailConfig::default());
        let outcome = client
            .send_order_confirmation(&sample_order())
            .await
            .unwrap();
        assert_eq!(outcome, EmailOutcome::Skipped);
    }
}
