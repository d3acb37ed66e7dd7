use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::Order;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CartContents, ShippingAddress};

/// Input snapshot for the optimistic pending-order create (checkout step 3a).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub items: CartContents,
    pub shipping_address: ShippingAddress,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_method: Option<String>,
}

/// Input for the session-completed fallback path, where the order is created
/// already paid from processor-side line items.
#[derive(Debug, Clone)]
pub struct CreateSessionOrderInput {
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub items: CartContents,
    pub total: Decimal,
    pub currency: String,
    pub payment_intent_id: Option<String>,
}

/// Thin create/update/find wrappers over the `orders` collection.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Persists a pending order with the exact checkout snapshot.
    ///
    /// The totals invariant `total == subtotal + shipping + tax` is enforced
    /// here, at creation time only; later webhook mutations touch status
    /// fields and never re-validate it.
    #[instrument(skip(self, input), fields(order_number = %input.order_number))]
    pub async fn create_pending(
        &self,
        input: CreateOrderInput,
    ) -> Result<order::Model, ServiceError> {
        if input.subtotal + input.shipping + input.tax != input.total {
            return Err(ServiceError::ValidationError(format!(
                "order total {} does not equal subtotal {} + shipping {} + tax {}",
                input.total, input.subtotal, input.shipping, input.tax
            )));
        }

        let address_json = serde_json::to_value(&input.shipping_address)?;
        let order_id = Uuid::new_v4();

        let model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(input.order_number.clone()),
            customer_id: Set(input.customer_id),
            email: Set(input.email),
            items: Set(serde_json::to_value(&input.items)?),
            shipping_address: Set(Some(address_json.clone())),
            // Billing address is currently always a copy of shipping
            billing_address: Set(Some(address_json)),
            subtotal: Set(input.subtotal),
            shipping: Set(input.shipping),
            tax: Set(input.tax),
            total: Set(input.total),
            currency: Set(input.currency),
            status: Set(OrderStatus::PendingPayment),
            payment_status: Set(PaymentStatus::Pending),
            payment_intent_id: Set(None),
            shipping_method: Set(input.shipping_method),
            notes: Set(None),
            confirmation_sent_at: Set(None),
            ..Default::default()
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                order_number: input.order_number,
            })
            .await;

        info!(%order_id, "Created pending order");
        Ok(created)
    }

    /// Creates an already-paid order from a completed hosted checkout
    /// session. Shipping is unknown on this path; the remainder over the
    /// item subtotal is attributed to tax so the stored figures still add up.
    #[instrument(skip(self, input), fields(order_number = %input.order_number))]
    pub async fn create_from_session(
        &self,
        input: CreateSessionOrderInput,
    ) -> Result<order::Model, ServiceError> {
        let item_subtotal = input.items.subtotal();
        let (subtotal, tax) = if input.total >= item_subtotal {
            (item_subtotal, input.total - item_subtotal)
        } else {
            (input.total, Decimal::ZERO)
        };

        let order_id = Uuid::new_v4();
        let model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(input.order_number.clone()),
            customer_id: Set(input.customer_id),
            email: Set(input.email),
            items: Set(serde_json::to_value(&input.items)?),
            shipping_address: Set(None),
            billing_address: Set(None),
            subtotal: Set(subtotal),
            shipping: Set(Decimal::ZERO),
            tax: Set(tax),
            total: Set(input.total),
            currency: Set(input.currency),
            status: Set(OrderStatus::Processing),
            payment_status: Set(PaymentStatus::Paid),
            payment_intent_id: Set(input.payment_intent_id),
            shipping_method: Set(None),
            notes: Set(None),
            confirmation_sent_at: Set(None),
            ..Default::default()
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                order_number: input.order_number,
            })
            .await;

        info!(%order_id, "Created order from completed checkout session");
        Ok(created)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find_by_id(order_id).one(&*self.db).await?)
    }

    /// Finds an order by its business id — the join key the payment
    /// processor echoes back in webhook metadata.
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?)
    }

    /// Finds an order by the external payment-intent id (refund path).
    pub async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await?)
    }

    /// Lists orders for the back office, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = Order::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Settles the order as paid: `{paid, processing}` plus the external
    /// payment-intent id. Setting the same state twice is harmless, which is
    /// what makes webhook redelivery safe for this transition.
    #[instrument(skip(self, model), fields(order_number = %model.order_number))]
    pub async fn mark_paid(
        &self,
        model: order::Model,
        payment_intent_id: &str,
    ) -> Result<order::Model, ServiceError> {
        let order_id = model.id;
        let old_status = model.status;

        let mut active: order::ActiveModel = model.into();
        active.payment_status = Set(PaymentStatus::Paid);
        active.status = Set(OrderStatus::Processing);
        active.payment_intent_id = Set(Some(payment_intent_id.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentSucceeded { order_id })
            .await;
        self.notify_status_change(order_id, old_status, updated.status)
            .await;

        Ok(updated)
    }

    /// Settles the order as failed: `{failed, cancelled}` with the
    /// human-readable reason appended to notes.
    #[instrument(skip(self, model), fields(order_number = %model.order_number))]
    pub async fn mark_payment_failed(
        &self,
        model: order::Model,
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        let order_id = model.id;
        let old_status = model.status;
        let notes = append_note(model.notes.clone(), format!("Payment failed: {reason}"));

        let mut active: order::ActiveModel = model.into();
        active.payment_status = Set(PaymentStatus::Failed);
        active.status = Set(OrderStatus::Cancelled);
        active.notes = Set(notes);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentFailed { order_id })
            .await;
        self.notify_status_change(order_id, old_status, updated.status)
            .await;

        Ok(updated)
    }

    /// Records a refund. Full refunds cancel the order; partial refunds only
    /// flip the payment status.
    #[instrument(skip(self, model), fields(order_number = %model.order_number))]
    pub async fn record_refund(
        &self,
        model: order::Model,
        amount: Decimal,
        full: bool,
    ) -> Result<order::Model, ServiceError> {
        let order_id = model.id;
        let old_status = model.status;
        let notes = append_note(model.notes.clone(), format!("Refunded {amount}"));

        let mut active: order::ActiveModel = model.into();
        active.payment_status = Set(if full {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::Partial
        });
        if full {
            active.status = Set(OrderStatus::Cancelled);
        }
        active.notes = Set(notes);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderRefunded { order_id, full })
            .await;
        if full {
            self.notify_status_change(order_id, old_status, updated.status)
                .await;
        }

        Ok(updated)
    }

    /// Stamps the confirmation-sent marker, making the email side effect
    /// idempotent under webhook redelivery.
    pub async fn mark_confirmation_sent(
        &self,
        model: order::Model,
    ) -> Result<order::Model, ServiceError> {
        let order_id = model.id;
        let mut active: order::ActiveModel = model.into();
        active.confirmation_sent_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ConfirmationEmailSent(order_id))
            .await;

        Ok(updated)
    }

    /// Back-office status update (ship, deliver, cancel).
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let model = self
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = model.status;
        let mut active: order::ActiveModel = model.into();
        active.status = Set(status);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        self.notify_status_change(order_id, old_status, updated.status)
            .await;

        Ok(updated)
    }

    async fn notify_status_change(&self, order_id: Uuid, old: OrderStatus, new: OrderStatus) {
        if old != new {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old.to_string(),
                    new_status: new.to_string(),
                })
                .await;
        }
    }
}

fn append_note(existing: Option<String>, line: String) -> Option<String> {
    match existing {
        Some(notes) if !notes.is_empty() => Some(format!("{notes}\n{line}")),
        _ => Some(line),
    }
}
