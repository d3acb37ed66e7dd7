use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CartContents, ShippingAddress};

/// Order record. `order_number` is the business id shared with the payment
/// processor; the primary key stays internal. Items and addresses are stored
/// as JSON snapshots frozen at checkout time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_number: String,

    #[sea_orm(nullable)]
    pub customer_id: Option<Uuid>,

    pub email: String,

    #[sea_orm(column_type = "Json")]
    pub items: Json,

    #[sea_orm(column_type = "Json", nullable)]
    pub shipping_address: Option<Json>,

    #[sea_orm(column_type = "Json", nullable)]
    pub billing_address: Option<Json>,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,

    pub currency: String,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    #[sea_orm(nullable)]
    pub payment_intent_id: Option<String>,

    /// Selected shipping service code from the quote step
    #[sea_orm(nullable)]
    pub shipping_method: Option<String>,

    #[sea_orm(nullable)]
    pub notes: Option<String>,

    /// Stamped when the confirmation email went out; redelivered success
    /// events skip the send when set.
    #[sea_orm(nullable)]
    pub confirmation_sent_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Parses the frozen line-item snapshot. Stored blobs are parsed once
    /// here and handed around as typed values.
    pub fn line_items(&self) -> Result<CartContents, serde_json::Error> {
        serde_json::from_value(self.items.clone())
    }

    pub fn shipping_address(&self) -> Result<Option<ShippingAddress>, serde_json::Error> {
        match &self.shipping_address {
            Some(value) if !value.is_null() => Ok(Some(serde_json::from_value(value.clone())?)),
            _ => Ok(None),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

/// Order fulfillment status. No transition table is enforced server-side;
/// the webhook reconciliation path sets status directly from event type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending_payment")]
    PendingPayment,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Payment status, driven entirely by processor webhook events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partial")]
    Partial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(OrderStatus::PendingPayment.to_string(), "pending_payment");
        assert_eq!(
            "cancelled".parse::<OrderStatus>().unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(PaymentStatus::Paid.to_string(), "paid");
        assert_eq!(
            "partial".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::Partial
        );
        assert!("unknown".parse::<OrderStatus>().is_err());
    }
}
