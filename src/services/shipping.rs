use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::config::{CheckoutConfig, ShippingConfig};
use crate::errors::ServiceError;
use crate::models::{ShippingAddress, ShippingRate};

/// Line item in a rate request. Weight falls back to the configured flat
/// per-unit weight; unit price is only used by the free-shipping rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateRequestItem {
    pub product_id: String,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
}

/// Quote result. The estimate path always yields rates; `success` reports
/// whether the configured provider answered, and callers are free to ignore
/// it — control flow never fails on a quote.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateQuote {
    pub success: bool,
    pub rates: Vec<ShippingRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Current tracking state for a shipment, straight from the carrier API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingInfo {
    pub tracking_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub events: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingEvent {
    pub timestamp: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProviderRateRequest<'a> {
    address: &'a ShippingAddress,
    parcel: ProviderParcel,
    items: &'a [RateRequestItem],
}

#[derive(Debug, Serialize)]
struct ProviderParcel {
    weight_lb: f64,
}

#[derive(Debug, Deserialize)]
struct ProviderRatesResponse {
    rates: Vec<ProviderRate>,
}

#[derive(Debug, Deserialize)]
struct ProviderRate {
    carrier: String,
    service_code: String,
    service_name: String,
    amount: Decimal,
    #[serde(default)]
    estimated_days: Option<i32>,
    #[serde(default)]
    guaranteed: Option<bool>,
}

/// Client for the shipping rate/tracking provider. Rate quoting degrades to
/// a deterministic zone-table estimate when the provider is unconfigured or
/// errors, so checkout never blocks on it.
#[derive(Clone)]
pub struct ShippingRateClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_token: Option<String>,
    home_country: String,
    default_item_weight_lb: f64,
}

impl ShippingRateClient {
    pub fn new(shipping: &ShippingConfig, checkout: &CheckoutConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: shipping.base_url.clone(),
            api_token: shipping.api_token.clone(),
            home_country: shipping.home_country.clone(),
            default_item_weight_lb: checkout.default_item_weight_lb,
        }
    }

    /// Quotes shipping rates for the given items and destination, cheapest
    /// first. Never fails: provider problems degrade to the zone-table
    /// estimate with `success: false` and the provider error attached.
    #[instrument(skip(self, items))]
    pub async fn get_rates(
        &self,
        items: &[RateRequestItem],
        address: &ShippingAddress,
    ) -> RateQuote {
        let total_weight = self.total_weight(items);

        let (base_url, api_token) = match (&self.base_url, &self.api_token) {
            (Some(url), Some(token)) => (url, token),
            _ => {
                debug!("Shipping provider not configured; using zone-table estimate");
                return RateQuote {
                    success: false,
                    rates: self.estimate_rates(total_weight, address),
                    error: Some("shipping provider not configured".to_string()),
                };
            }
        };

        match self
            .request_provider_rates(base_url, api_token, items, total_weight, address)
            .await
        {
            Ok(mut rates) => {
                rates.sort_by(|a, b| a.amount.cmp(&b.amount));
                RateQuote {
                    success: true,
                    rates,
                    error: None,
                }
            }
            Err(err) => {
                warn!("Shipping provider error, falling back to estimate: {err}");
                RateQuote {
                    success: false,
                    rates: self.estimate_rates(total_weight, address),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn request_provider_rates(
        &self,
        base_url: &str,
        api_token: &str,
        items: &[RateRequestItem],
        total_weight: f64,
        address: &ShippingAddress,
    ) -> Result<Vec<ShippingRate>, ServiceError> {
        let request = ProviderRateRequest {
            address,
            parcel: ProviderParcel {
                weight_lb: total_weight,
            },
            items,
        };

        let response = self
            .client
            .post(format!("{base_url}/rates"))
            .bearer_auth(api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "rate request returned {}",
                response.status()
            )));
        }

        let body: ProviderRatesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        Ok(body
            .rates
            .into_iter()
            .map(|rate| ShippingRate {
                carrier: rate.carrier,
                service_code: rate.service_code,
                service_name: rate.service_name,
                amount: rate.amount,
                list_amount: rate.amount,
                estimated_days: rate.estimated_days,
                guaranteed: rate.guaranteed,
            })
            .collect())
    }

    /// Deterministic local estimate: a small zone table keyed on destination
    /// country, base price plus a per-pound step.
    pub fn estimate_rates(&self, total_weight_lb: f64, address: &ShippingAddress) -> Vec<ShippingRate> {
        let country = address.country.to_ascii_uppercase();
        let weight = Decimal::from_f64_retain(total_weight_lb).unwrap_or(Decimal::ONE);

        let make = |code: &str, name: &str, base: Decimal, per_lb: Decimal, days: i32| {
            let amount = (base + per_lb * weight).round_dp(2);
            ShippingRate {
                carrier: "flat-rate".to_string(),
                service_code: code.to_string(),
                service_name: name.to_string(),
                amount,
                list_amount: amount,
                estimated_days: Some(days),
                guaranteed: None,
            }
        };

        let mut rates = if country == self.home_country.to_ascii_uppercase() {
            vec![
                make("standard", "Standard Shipping", dec!(5.95), dec!(0.55), 5),
                make("expedited", "Expedited Shipping", dec!(12.95), dec!(0.90), 2),
            ]
        } else if country == "CA" || country == "MX" {
            vec![make(
                "intl-neighbor",
                "International Standard",
                dec!(14.95),
                dec!(1.50),
                8,
            )]
        } else {
            vec![make(
                "intl-standard",
                "International Standard",
                dec!(19.95),
                dec!(2.25),
                12,
            )]
        };

        rates.sort_by(|a, b| a.amount.cmp(&b.amount));
        rates
    }

    fn total_weight(&self, items: &[RateRequestItem]) -> f64 {
        items
            .iter()
            .map(|item| {
                item.weight.unwrap_or(self.default_item_weight_lb) * f64::from(item.quantity.max(0))
            })
            .sum()
    }

    /// Looks up current tracking state with the provider. Tracking has no
    /// local fallback; an unconfigured provider is surfaced to the caller.
    #[instrument(skip(self))]
    pub async fn track(&self, tracking_number: &str) -> Result<TrackingInfo, ServiceError> {
        let (base_url, api_token) = match (&self.base_url, &self.api_token) {
            (Some(url), Some(token)) => (url, token),
            _ => {
                return Err(ServiceError::ServiceUnavailable(
                    "shipping provider not configured".to_string(),
                ))
            }
        };

        let response = self
            .client
            .get(format!("{base_url}/tracking/{tracking_number}"))
            .bearer_auth(api_token)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "Tracking number {tracking_number} not found"
            )));
        }
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "tracking request returned {}",
                response.status()
            )));
        }

        response
            .json::<TrackingInfo>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))
    }
}
