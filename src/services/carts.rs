use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::cart;
use crate::entities::Cart;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::CartContents;

/// Server-side mirror of client carts for signed-in users.
///
/// The browser owns cart state; every client mutation fires a non-blocking
/// mirror write that lands here as a last-write-wins replacement. The only
/// other writer is payment reconciliation clearing the cart after checkout.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    pub async fn get_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<cart::Model>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?)
    }

    /// Replaces the mirror record with the client's cart (last write wins).
    #[instrument(skip(self, contents))]
    pub async fn sync(
        &self,
        customer_id: Uuid,
        contents: CartContents,
    ) -> Result<cart::Model, ServiceError> {
        let updated = self.write_contents(customer_id, &contents).await?;
        self.event_sender
            .send_or_log(Event::CartSynced(customer_id))
            .await;
        Ok(updated)
    }

    /// Sign-in merge: union of the local cart and the mirror by
    /// `(product_id, color, size)`, local quantities winning ties. The
    /// merged result is written back and returned.
    #[instrument(skip(self, local))]
    pub async fn merge_on_sign_in(
        &self,
        customer_id: Uuid,
        local: CartContents,
    ) -> Result<(cart::Model, CartContents), ServiceError> {
        let server_contents = match self.get_for_customer(customer_id).await? {
            Some(record) => record.contents()?,
            None => CartContents::default(),
        };

        let mut merged = local;
        merged.merge(server_contents);

        let record = self.write_contents(customer_id, &merged).await?;
        self.event_sender
            .send_or_log(Event::CartMerged(customer_id))
            .await;

        info!(%customer_id, lines = merged.items.len(), "Merged cart on sign-in");
        Ok((record, merged))
    }

    /// Empties the customer's mirror record. A missing record is fine — the
    /// reconciliation path calls this for every paid order with an owner.
    #[instrument(skip(self))]
    pub async fn clear_for_customer(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        let Some(record) = self.get_for_customer(customer_id).await? else {
            return Ok(());
        };

        let mut active: cart::ActiveModel = record.into();
        active.items = Set(serde_json::to_value(CartContents::default())?);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCleared(customer_id))
            .await;

        info!(%customer_id, "Cleared cart");
        Ok(())
    }

    async fn write_contents(
        &self,
        customer_id: Uuid,
        contents: &CartContents,
    ) -> Result<cart::Model, ServiceError> {
        let items = serde_json::to_value(contents)?;
        let now = Utc::now();

        match self.get_for_customer(customer_id).await? {
            Some(record) => {
                let mut active: cart::ActiveModel = record.into();
                active.items = Set(items);
                active.updated_at = Set(now);
                Ok(active.update(&*self.db).await?)
            }
            None => {
                let record = cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    customer_id: Set(customer_id),
                    items: Set(items),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                Ok(record.insert(&*self.db).await?)
            }
        }
    }
}
