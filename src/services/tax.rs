use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::config::TaxConfig;
use crate::errors::ServiceError;
use crate::models::ShippingAddress;

/// Flat combined rates by US state, used when the tax provider is
/// unconfigured or errors. Accuracy is sacrificed for checkout continuity;
/// nexus logic beyond this table is out of scope.
static STATE_TAX_RATES: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    HashMap::from([
        ("AL", dec!(0.0400)),
        ("AK", dec!(0.0000)),
        ("AZ", dec!(0.0560)),
        ("CA", dec!(0.0725)),
        ("CO", dec!(0.0290)),
        ("DE", dec!(0.0000)),
        ("FL", dec!(0.0600)),
        ("GA", dec!(0.0400)),
        ("IL", dec!(0.0625)),
        ("IN", dec!(0.0700)),
        ("MA", dec!(0.0625)),
        ("MI", dec!(0.0600)),
        ("MN", dec!(0.0688)),
        ("MT", dec!(0.0000)),
        ("NC", dec!(0.0475)),
        ("NH", dec!(0.0000)),
        ("NJ", dec!(0.0663)),
        ("NY", dec!(0.0400)),
        ("OH", dec!(0.0575)),
        ("OR", dec!(0.0000)),
        ("PA", dec!(0.0600)),
        ("TN", dec!(0.0700)),
        ("TX", dec!(0.0625)),
        ("UT", dec!(0.0610)),
        ("VA", dec!(0.0530)),
        ("WA", dec!(0.0650)),
    ])
});

/// Line item in a tax calculation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaxLineItem {
    pub id: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TaxLineItem {
    fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity.max(0))
    }
}

/// Per-line tax amounts alongside the total.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaxLineBreakdown {
    pub id: String,
    pub tax: Decimal,
}

/// Tax quote result. Same always-succeeds contract as shipping quoting:
/// `success` only reports whether the provider answered.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaxQuote {
    pub success: bool,
    pub total_tax: Decimal,
    pub line_items: Vec<TaxLineBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProviderTaxRequest<'a> {
    address: &'a ShippingAddress,
    line_items: &'a [TaxLineItem],
}

#[derive(Debug, Deserialize)]
struct ProviderTaxResponse {
    total_tax: Decimal,
    #[serde(default)]
    line_items: Vec<TaxLineBreakdown>,
}

/// Client for the tax calculation provider with the flat per-state fallback.
#[derive(Clone)]
pub struct TaxClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_token: Option<String>,
    fallback_rate: Decimal,
}

impl TaxClient {
    pub fn new(tax: &TaxConfig, fallback_tax_rate: f64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: tax.base_url.clone(),
            api_token: tax.api_token.clone(),
            fallback_rate: Decimal::from_f64_retain(fallback_tax_rate).unwrap_or(Decimal::ZERO),
        }
    }

    /// Calculates tax for the cart against the destination. Never fails:
    /// provider problems degrade to the per-state estimate.
    #[instrument(skip(self, items))]
    pub async fn calculate(&self, items: &[TaxLineItem], address: &ShippingAddress) -> TaxQuote {
        let (base_url, api_token) = match (&self.base_url, &self.api_token) {
            (Some(url), Some(token)) => (url, token),
            _ => {
                debug!("Tax provider not configured; using per-state estimate");
                let mut quote = self.estimate(items, address);
                quote.error = Some("tax provider not configured".to_string());
                return quote;
            }
        };

        match self
            .request_provider_tax(base_url, api_token, items, address)
            .await
        {
            Ok(quote) => quote,
            Err(err) => {
                warn!("Tax provider error, falling back to estimate: {err}");
                let mut quote = self.estimate(items, address);
                quote.error = Some(err.to_string());
                quote
            }
        }
    }

    async fn request_provider_tax(
        &self,
        base_url: &str,
        api_token: &str,
        items: &[TaxLineItem],
        address: &ShippingAddress,
    ) -> Result<TaxQuote, ServiceError> {
        let request = ProviderTaxRequest {
            address,
            line_items: items,
        };

        let response = self
            .client
            .post(format!("{base_url}/calculate"))
            .bearer_auth(api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "tax request returned {}",
                response.status()
            )));
        }

        let body: ProviderTaxResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(TaxQuote {
            success: true,
            total_tax: body.total_tax,
            line_items: body.line_items,
            error: None,
        })
    }

    /// Deterministic local estimate: flat percentage by destination state.
    pub fn estimate(&self, items: &[TaxLineItem], address: &ShippingAddress) -> TaxQuote {
        let rate = self.rate_for(address);

        let line_items: Vec<TaxLineBreakdown> = items
            .iter()
            .map(|item| TaxLineBreakdown {
                id: item.id.clone(),
                tax: (item.line_total() * rate).round_dp(2),
            })
            .collect();

        let total_tax = line_items.iter().map(|line| line.tax).sum();

        TaxQuote {
            success: false,
            total_tax,
            line_items,
            error: None,
        }
    }

    fn rate_for(&self, address: &ShippingAddress) -> Decimal {
        if !address.country.eq_ignore_ascii_case("US") {
            return self.fallback_rate;
        }
        STATE_TAX_RATES
            .get(address.state.to_ascii_uppercase().as_str())
            .copied()
            .unwrap_or(self.fallback_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaxConfig;

    fn client() -> TaxClient {
        TaxClient::new(&TaxConfig::default(), 0.0)
    }

    fn address(state: &str, country: &str) -> ShippingAddress {
        ShippingAddress {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            line1: "1 Analytical Way".into(),
            line2: None,
            city: "Bloomington".into(),
            state: state.into(),
            postal_code: "47401".into(),
            country: country.into(),
            phone: None,
        }
    }

    fn items() -> Vec<TaxLineItem> {
        vec![TaxLineItem {
            id: "p1".into(),
            price: dec!(25.00),
            quantity: 2,
            category: None,
        }]
    }

    #[test]
    fn seven_percent_state_estimate() {
        let quote = client().estimate(&items(), &address("IN", "US"));
        assert_eq!(quote.total_tax, dec!(3.50));
        assert_eq!(quote.line_items.len(), 1);
        assert_eq!(quote.line_items[0].tax, dec!(3.50));
    }

    #[test]
    fn no_sales_tax_states_estimate_zero() {
        for state in ["OR", "MT", "NH", "DE", "AK"] {
            let quote = client().estimate(&items(), &address(state, "US"));
            assert_eq!(quote.total_tax, Decimal::ZERO, "state {state}");
        }
    }

    #[test]
    fn unknown_region_uses_fallback_rate() {
        let zero = client().estimate(&items(), &address("ZZ", "US"));
        assert_eq!(zero.total_tax, Decimal::ZERO);

        let with_fallback = TaxClient::new(&TaxConfig::default(), 0.05);
        let quote = with_fallback.estimate(&items(), &address("ZZ", "US"));
        assert_eq!(quote.total_tax, dec!(2.50));

        let intl = with_fallback.estimate(&items(), &address("BY", "DE"));
        assert_eq!(intl.total_tax, dec!(2.50));
    }

    #[tokio::test]
    async fn unconfigured_provider_degrades_with_error_string() {
        let quote = client().calculate(&items(), &address("IN", "US")).await;
        assert!(!quote.success);
        assert_eq!(quote.total_tax, dec!(3.50));
        assert!(quote.error.as_deref().unwrap().contains("not configured"));
    }

    #[test]
    fn line_breakdown_sums_to_total() {
        let many = vec![
            TaxLineItem {
                id: "p1".into(),
                price: dec!(19.99),
                quantity: 3,
                category: Some("apparel".into()),
            },
            TaxLineItem {
                id: "p2".into(),
                price: dec!(4.50),
                quantity: 1,
                category: None,
            },
        ];
        let quote = client().estimate(&many, &address("CA", "US"));
        let sum: Decimal = quote.line_items.iter().map(|l| l.tax).sum();
        assert_eq!(sum, quote.total_tax);
    }
}
