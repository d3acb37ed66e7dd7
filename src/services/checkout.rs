use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{CartContents, ShippingAddress, ShippingRate};
use crate::services::orders::{CreateOrderInput, OrderService};
use crate::services::payments::PaymentGatewayClient;
use crate::services::shipping::{RateQuote, RateRequestItem, ShippingRateClient};
use crate::services::tax::{TaxClient, TaxLineItem, TaxQuote};

/// Finalized checkout input for step 3: order creation + payment intent.
/// The business order id and the quoted figures arrive from the client,
/// which paced steps 1 and 2.
#[derive(Debug, Clone)]
pub struct CreateIntentInput {
    pub amount: Decimal,
    pub order_number: String,
    pub email: String,
    pub shipping_address: ShippingAddress,
    pub items: CartContents,
    pub customer_id: Option<Uuid>,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub shipping_method: Option<String>,
}

/// What the client needs to confirm payment with the processor SDK.
#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub order_number: String,
}

/// Drives a shopper from "has items in cart" to "has a payment intent to
/// confirm", producing exactly one pending order as a side effect.
#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<OrderService>,
    gateway: Arc<PaymentGatewayClient>,
    shipping: Arc<ShippingRateClient>,
    tax: Arc<TaxClient>,
    currency: String,
    free_shipping_threshold: Decimal,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<OrderService>,
        gateway: Arc<PaymentGatewayClient>,
        shipping: Arc<ShippingRateClient>,
        tax: Arc<TaxClient>,
        currency: String,
        free_shipping_threshold: f64,
    ) -> Self {
        Self {
            orders,
            gateway,
            shipping,
            tax,
            currency,
            free_shipping_threshold: Decimal::from_f64_retain(free_shipping_threshold)
                .unwrap_or(Decimal::from(75)),
        }
    }

    /// Step 2a: shipping rates for the cart, cheapest first, with the
    /// free-shipping override applied. Cannot hard-fail — the adapter
    /// degrades to its local estimate internally.
    #[instrument(skip(self, items))]
    pub async fn quote_shipping(
        &self,
        items: &[RateRequestItem],
        address: &ShippingAddress,
    ) -> RateQuote {
        let mut quote = self.shipping.get_rates(items, address).await;

        let subtotal: Decimal = items
            .iter()
            .filter_map(|item| {
                item.unit_price
                    .map(|price| price * Decimal::from(item.quantity.max(0)))
            })
            .sum();

        apply_free_shipping(&mut quote.rates, subtotal, self.free_shipping_threshold);
        quote
    }

    /// Step 2b: tax for the cart against the destination. Cannot hard-fail.
    #[instrument(skip(self, items))]
    pub async fn quote_tax(&self, items: &[TaxLineItem], address: &ShippingAddress) -> TaxQuote {
        self.tax.calculate(items, address).await
    }

    /// Step 3: persist the pending order snapshot and create the payment
    /// intent.
    ///
    /// The order persist (3a) is optimistic — a storage failure is logged
    /// and swallowed so a storage hiccup cannot block checkout, at the cost
    /// of a possible unreconciled payment. Intent creation (3b) runs
    /// unconditionally and its failure is fatal to the caller.
    #[instrument(skip(self, input), fields(order_number = %input.order_number))]
    pub async fn create_payment_intent(
        &self,
        input: CreateIntentInput,
    ) -> Result<CheckoutIntent, ServiceError> {
        let subtotal = input.items.subtotal();
        if subtotal + input.shipping_cost + input.tax != input.amount {
            return Err(ServiceError::ValidationError(format!(
                "amount {} does not equal subtotal {} + shipping {} + tax {}",
                input.amount, subtotal, input.shipping_cost, input.tax
            )));
        }

        // (3a) Optimistic pre-create so the webhook has a record to
        // reconcile against.
        let pending = CreateOrderInput {
            order_number: input.order_number.clone(),
            customer_id: input.customer_id,
            email: input.email.clone(),
            items: input.items.clone(),
            shipping_address: input.shipping_address.clone(),
            subtotal,
            shipping: input.shipping_cost,
            tax: input.tax,
            total: input.amount,
            currency: self.currency.clone(),
            shipping_method: input.shipping_method.clone(),
        };
        if let Err(err) = self.orders.create_pending(pending).await {
            error!(
                order_number = %input.order_number,
                "Failed to pre-create order, continuing checkout: {err}"
            );
        }

        // (3b) Minimal metadata: the order number joins the payment back to
        // the order; never the full cart.
        let mut metadata = vec![("order_number".to_string(), input.order_number.clone())];
        if let Some(customer_id) = input.customer_id {
            metadata.push(("customer_id".to_string(), customer_id.to_string()));
        }

        let intent = self
            .gateway
            .create_intent(
                input.amount,
                &self.currency,
                Some(&input.email),
                &metadata,
            )
            .await?;

        info!(
            order_number = %input.order_number,
            payment_intent = %intent.id,
            "Created payment intent"
        );

        Ok(CheckoutIntent {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            order_number: input.order_number,
        })
    }
}

/// Zeroes the cheapest rate's charged amount when the subtotal clears the
/// free-shipping threshold. `list_amount` keeps the original price for
/// struck-through display, and the rule is re-applied per quote so switching
/// the selected rate behaves.
pub fn apply_free_shipping(rates: &mut [ShippingRate], subtotal: Decimal, threshold: Decimal) {
    if subtotal < threshold {
        return;
    }
    if let Some(cheapest) = rates
        .iter_mut()
        .min_by(|a, b| a.amount.cmp(&b.amount))
    {
        cheapest.amount = Decimal::ZERO;
    }
}
