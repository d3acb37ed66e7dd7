//! Property-based tests for the monetary rules that must hold for every
//! cart: the free-shipping override and the merge-by-key cart semantics.

use proptest::prelude::*;
use rust_decimal::Decimal;

use storefront_api::models::{CartContents, CartItem, ShippingRate};
use storefront_api::services::checkout::apply_free_shipping;

fn rate(code: &str, cents: i64) -> ShippingRate {
    let amount = Decimal::new(cents, 2);
    ShippingRate {
        carrier: "flat-rate".to_string(),
        service_code: code.to_string(),
        service_name: code.to_string(),
        amount,
        list_amount: amount,
        estimated_days: None,
        guaranteed: None,
    }
}

fn item(product_id: &str, color: Option<&str>, size: Option<&str>, qty: i32, cents: i64) -> CartItem {
    CartItem {
        product_id: product_id.to_string(),
        name: product_id.to_string(),
        price: Decimal::new(cents, 2),
        quantity: qty,
        color: color.map(str::to_string),
        size: size.map(str::to_string),
        sku: None,
        image: None,
        weight: None,
    }
}

proptest! {
    /// For all carts at or above the threshold, exactly one rate is charged
    /// at zero while its list price survives for display.
    #[test]
    fn free_shipping_always_zeroes_exactly_one_rate(
        rate_cents in proptest::collection::vec(1i64..20_000, 1..6),
        subtotal_cents in 7_500i64..1_000_000,
    ) {
        let mut rates: Vec<ShippingRate> = rate_cents
            .iter()
            .enumerate()
            .map(|(i, cents)| rate(&format!("svc{i}"), *cents))
            .collect();
        let originals: Vec<Decimal> = rates.iter().map(|r| r.amount).collect();

        apply_free_shipping(&mut rates, Decimal::new(subtotal_cents, 2), Decimal::from(75));

        let free: Vec<&ShippingRate> =
            rates.iter().filter(|r| r.amount == Decimal::ZERO).collect();
        prop_assert_eq!(free.len(), 1);

        let min = originals.iter().min().unwrap();
        prop_assert_eq!(free[0].list_amount, *min);

        // Every other rate keeps its charged price
        for r in &rates {
            if r.amount != Decimal::ZERO {
                prop_assert_eq!(r.amount, r.list_amount);
            }
        }
    }

    /// Below the threshold nothing changes.
    #[test]
    fn below_threshold_rates_are_untouched(
        rate_cents in proptest::collection::vec(1i64..20_000, 1..6),
        subtotal_cents in 0i64..7_500,
    ) {
        let mut rates: Vec<ShippingRate> = rate_cents
            .iter()
            .enumerate()
            .map(|(i, cents)| rate(&format!("svc{i}"), *cents))
            .collect();
        let before: Vec<Decimal> = rates.iter().map(|r| r.amount).collect();

        apply_free_shipping(&mut rates, Decimal::new(subtotal_cents, 2), Decimal::from(75));

        let after: Vec<Decimal> = rates.iter().map(|r| r.amount).collect();
        prop_assert_eq!(before, after);
    }

    /// Adding the same variant repeatedly never creates a second line, and
    /// the quantity is the sum of all adds.
    #[test]
    fn repeated_adds_merge_into_one_line(
        quantities in proptest::collection::vec(1i32..50, 1..10),
        price_cents in 1i64..100_000,
    ) {
        let mut cart = CartContents::default();
        for qty in &quantities {
            cart.add(item("p1", Some("Black"), Some("M"), *qty, price_cents));
        }

        prop_assert_eq!(cart.items.len(), 1);
        let total: i32 = quantities.iter().sum();
        prop_assert_eq!(cart.items[0].quantity, total);
        prop_assert_eq!(cart.item_count(), total);
        prop_assert_eq!(
            cart.subtotal(),
            Decimal::new(price_cents, 2) * Decimal::from(total)
        );
    }

    /// The subtotal is always the sum of line totals, whatever the mix of
    /// variants.
    #[test]
    fn subtotal_is_sum_of_line_totals(
        lines in proptest::collection::vec((1i32..20, 1i64..50_000), 1..8),
    ) {
        let mut cart = CartContents::default();
        for (i, (qty, cents)) in lines.iter().enumerate() {
            cart.add(item(&format!("p{i}"), None, None, *qty, *cents));
        }

        let expected: Decimal = lines
            .iter()
            .map(|(qty, cents)| Decimal::new(*cents, 2) * Decimal::from(*qty))
            .sum();
        prop_assert_eq!(cart.subtotal(), expected);
    }
}
