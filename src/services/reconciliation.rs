use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::models::{generate_order_number, CartContents, CartItem};
use crate::services::carts::CartService;
use crate::services::email::{EmailClient, EmailOutcome};
use crate::services::orders::{CreateSessionOrderInput, OrderService};
use crate::services::payments::{from_minor_units, PaymentGatewayClient};

/// How often and how long to re-check for the order when a success event
/// arrives before the optimistic pre-create has landed.
const LOOKUP_ATTEMPTS: u32 = 3;
const LOOKUP_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Signature-verified processor event, parsed once at the webhook boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    metadata: IntentMetadata,
    #[serde(default)]
    last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentMetadata {
    #[serde(default)]
    order_number: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_refunded: i64,
    #[serde(default)]
    refunded: bool,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    amount_total: i64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: IntentMetadata,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

/// Converts asynchronous processor notifications into order-state
/// transitions. This is the single writer for payment-driven status; there
/// is no caller to retry against if it fails, so misses are logged loudly
/// and the webhook endpoint acks regardless.
#[derive(Clone)]
pub struct ReconciliationService {
    orders: Arc<OrderService>,
    carts: Arc<CartService>,
    gateway: Arc<PaymentGatewayClient>,
    email: Arc<EmailClient>,
    currency: String,
}

impl ReconciliationService {
    pub fn new(
        orders: Arc<OrderService>,
        carts: Arc<CartService>,
        gateway: Arc<PaymentGatewayClient>,
        email: Arc<EmailClient>,
        currency: String,
    ) -> Self {
        Self {
            orders,
            carts,
            gateway,
            email,
            currency,
        }
    }

    /// Dispatches a verified event. Unknown event types are acknowledged and
    /// ignored.
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process(&self, event: GatewayEvent) -> Result<(), ServiceError> {
        match event.event_type.as_str() {
            "payment_intent.succeeded" => {
                let intent: PaymentIntentObject = serde_json::from_value(event.data.object)?;
                self.handle_payment_succeeded(intent).await
            }
            "payment_intent.payment_failed" => {
                let intent: PaymentIntentObject = serde_json::from_value(event.data.object)?;
                self.handle_payment_failed(intent).await
            }
            "checkout.session.completed" => {
                let session: CheckoutSessionObject = serde_json::from_value(event.data.object)?;
                self.handle_session_completed(session).await
            }
            "charge.refunded" => {
                let charge: ChargeObject = serde_json::from_value(event.data.object)?;
                self.handle_refund(charge).await
            }
            other => {
                debug!("Ignoring webhook event type {other}");
                Ok(())
            }
        }
    }

    async fn handle_payment_succeeded(
        &self,
        intent: PaymentIntentObject,
    ) -> Result<(), ServiceError> {
        let Some(order_number) = intent.metadata.order_number.clone() else {
            error!(
                payment_intent = %intent.id,
                "CRITICAL: succeeded event carries no order number; payment cannot be reconciled"
            );
            return Ok(());
        };

        let Some(model) = self.find_order_with_retry(&order_number).await? else {
            error!(
                payment_intent = %intent.id,
                %order_number,
                "CRITICAL: no order found for successful payment; manual reconciliation required"
            );
            return Ok(());
        };

        // State mutation must land (or fail) before any notification runs.
        let updated = self.orders.mark_paid(model, &intent.id).await?;
        info!(%order_number, "Order reconciled as paid");

        // Downstream side effects are best-effort and independent of each
        // other; none of them may fail the handler.
        if let Some(customer_id) = updated.customer_id {
            if let Err(err) = self.carts.clear_for_customer(customer_id).await {
                warn!(%customer_id, "Failed to clear cart after payment: {err}");
            }
        }

        self.send_confirmation(updated).await;

        Ok(())
    }

    async fn handle_payment_failed(
        &self,
        intent: PaymentIntentObject,
    ) -> Result<(), ServiceError> {
        let Some(order_number) = intent.metadata.order_number.clone() else {
            warn!(payment_intent = %intent.id, "Failed-payment event carries no order number");
            return Ok(());
        };

        let Some(model) = self.orders.find_by_order_number(&order_number).await? else {
            warn!(%order_number, "Failed-payment event for unknown order; dropping");
            return Ok(());
        };

        let reason = intent
            .last_payment_error
            .and_then(|e| e.message)
            .unwrap_or_else(|| "payment was not completed".to_string());

        self.orders.mark_payment_failed(model, &reason).await?;
        info!(%order_number, "Order cancelled after failed payment");
        Ok(())
    }

    /// Fallback order creation for the hosted-session flow, where no order
    /// was pre-created. Guarded against double-creation by an order-number
    /// lookup before inserting.
    async fn handle_session_completed(
        &self,
        session: CheckoutSessionObject,
    ) -> Result<(), ServiceError> {
        let order_number = session
            .metadata
            .order_number
            .clone()
            .unwrap_or_else(generate_order_number);

        if let Some(existing) = self.orders.find_by_order_number(&order_number).await? {
            info!(
                %order_number,
                order_id = %existing.id,
                "Session completed for an existing order; skipping duplicate creation"
            );
            return Ok(());
        }

        let line_items = self.gateway.get_session_line_items(&session.id).await?;
        let items = CartContents::new(
            line_items
                .into_iter()
                .map(|line| {
                    let quantity = line.quantity.max(1);
                    CartItem {
                        product_id: line
                            .price_id
                            .unwrap_or_else(|| line.description.clone()),
                        name: line.description,
                        price: (from_minor_units(line.amount_total)
                            / rust_decimal::Decimal::from(quantity))
                        .round_dp(2),
                        quantity,
                        color: None,
                        size: None,
                        sku: None,
                        image: None,
                        weight: None,
                    }
                })
                .collect(),
        );

        let email = session
            .customer_details
            .and_then(|d| d.email)
            .or(session.customer_email)
            .unwrap_or_default();

        let created = self
            .orders
            .create_from_session(CreateSessionOrderInput {
                order_number: order_number.clone(),
                customer_id: parse_customer_id(session.metadata.customer_id.as_deref()),
                email,
                items,
                total: from_minor_units(session.amount_total),
                currency: session
                    .currency
                    .map(|c| c.to_ascii_uppercase())
                    .unwrap_or_else(|| self.currency.clone()),
                payment_intent_id: session.payment_intent,
            })
            .await?;

        self.send_confirmation(created).await;

        Ok(())
    }

    async fn handle_refund(&self, charge: ChargeObject) -> Result<(), ServiceError> {
        let Some(payment_intent) = charge.payment_intent else {
            warn!("Refund event carries no payment intent; dropping");
            return Ok(());
        };

        let Some(model) = self.orders.find_by_payment_intent(&payment_intent).await? else {
            warn!(%payment_intent, "Refund event for unknown order; dropping");
            return Ok(());
        };

        let amount = from_minor_units(charge.amount_refunded);
        self.orders
            .record_refund(model, amount, charge.refunded)
            .await?;

        Ok(())
    }

    /// The success webhook can race the optimistic pre-create, so a miss is
    /// retried briefly before being declared a reconciliation failure.
    async fn find_order_with_retry(
        &self,
        order_number: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        for attempt in 1..=LOOKUP_ATTEMPTS {
            if let Some(model) = self.orders.find_by_order_number(order_number).await? {
                return Ok(Some(model));
            }
            if attempt < LOOKUP_ATTEMPTS {
                debug!(
                    %order_number,
                    attempt,
                    "Order not found yet; retrying lookup"
                );
                tokio::time::sleep(LOOKUP_RETRY_DELAY).await;
            }
        }
        Ok(None)
    }

    /// Confirmation email, made idempotent under redelivery by the
    /// `confirmation_sent_at` marker.
    async fn send_confirmation(&self, order: order::Model) {
        if order.confirmation_sent_at.is_some() {
            debug!(
                order_number = %order.order_number,
                "Confirmation already sent; skipping email"
            );
            return;
        }

        match self.email.send_order_confirmation(&order).await {
            Ok(EmailOutcome::Sent) => {
                if let Err(err) = self.orders.mark_confirmation_sent(order).await {
                    warn!("Failed to record confirmation marker: {err}");
                }
            }
            Ok(EmailOutcome::Skipped) => {}
            Err(err) => {
                warn!("Failed to send confirmation email: {err}");
            }
        }
    }
}

/// Parses a customer id out of processor metadata, tolerating absence and
/// malformed values.
pub fn parse_customer_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|value| Uuid::parse_str(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gateway_event_parses_with_nested_object() {
        let event: GatewayEvent = serde_json::from_value(json!({
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "data": {
                "object": {
                    "id": "pi_123",
                    "metadata": {"order_number": "ORD-AAAA111122"}
                }
            }
        }))
        .unwrap();

        assert_eq!(event.event_type, "payment_intent.succeeded");
        let intent: PaymentIntentObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(
            intent.metadata.order_number.as_deref(),
            Some("ORD-AAAA111122")
        );
    }

    #[test]
    fn intent_metadata_tolerates_extra_and_missing_fields() {
        let intent: PaymentIntentObject = serde_json::from_value(json!({
            "id": "pi_456",
            "metadata": {"customer_id": "not-a-uuid", "campaign": "spring"}
        }))
        .unwrap();

        assert!(intent.metadata.order_number.is_none());
        assert_eq!(
            parse_customer_id(intent.metadata.customer_id.as_deref()),
            None
        );
    }

    #[test]
    fn charge_object_defaults() {
        let charge: ChargeObject = serde_json::from_value(json!({
            "payment_intent": "pi_789"
        }))
        .unwrap();
        assert_eq!(charge.amount_refunded, 0);
        assert!(!charge.refunded);
    }
}
