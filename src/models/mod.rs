//! Typed boundary records.
//!
//! The record store keeps cart lines and addresses as serialized JSON blobs;
//! these types are parsed once at the storage/wire boundary and passed around
//! as values from then on.

use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A cart line item, shared between the live cart and the frozen order
/// snapshot. Unit price is captured at the time the item was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Per-unit weight in pounds, when the product defines one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl CartItem {
    /// Cart-level uniqueness key: same product in the same variant merges.
    pub fn merge_key(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            self.product_id.as_str(),
            self.color.as_deref(),
            self.size.as_deref(),
        )
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Ordered list of cart lines with merge-by-key semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartContents {
    pub items: Vec<CartItem>,
}

impl CartContents {
    pub fn new(items: Vec<CartItem>) -> Self {
        Self { items }
    }

    /// Adds an item, merging into an existing line with the same
    /// `(product_id, color, size)` key by summing quantities.
    pub fn add(&mut self, item: CartItem) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|line| line.merge_key() == item.merge_key())
        {
            existing.quantity += item.quantity;
        } else {
            self.items.push(item);
        }
    }

    /// Removes the line matching the key, if present.
    pub fn remove(&mut self, product_id: &str, color: Option<&str>, size: Option<&str>) {
        self.items
            .retain(|line| line.merge_key() != (product_id, color, size));
    }

    /// Sets the quantity for a line; quantity ≤ 0 removes it.
    pub fn set_quantity(
        &mut self,
        product_id: &str,
        color: Option<&str>,
        size: Option<&str>,
        quantity: i32,
    ) {
        if quantity <= 0 {
            self.remove(product_id, color, size);
            return;
        }
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| line.merge_key() == (product_id, color, size))
        {
            line.quantity = quantity;
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(|line| line.line_total()).sum()
    }

    /// Union with `other` by composite key; lines already in `self` win ties.
    /// Used for the sign-in merge where `self` holds the local cart.
    pub fn merge(&mut self, other: CartContents) {
        for item in other.items {
            if !self
                .items
                .iter()
                .any(|line| line.merge_key() == item.merge_key())
            {
                self.items.push(item);
            }
        }
    }
}

/// Shipping destination. Stored on the order as an opaque JSON blob; only
/// structural validation is applied, never external address verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A selectable shipping rate. Ephemeral: produced fresh per quote request,
/// never persisted. `list_amount` keeps the provider price when the
/// free-shipping rule zeroes out `amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShippingRate {
    pub carrier: String,
    pub service_code: String,
    pub service_name: String,
    pub amount: Decimal,
    pub list_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guaranteed: Option<bool>,
}

/// Generates a human-presentable business order id, e.g. `ORD-7K3FA2B91C`.
/// This id joins the storefront, processor metadata, and webhook handler;
/// the storage primary key never leaves the backend.
pub fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{suffix}")
}
