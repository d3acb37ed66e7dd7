pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod tracking;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
/// Clients are constructed once here and dependency-injected; no service
/// reaches for a global handle.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<crate::services::OrderService>,
    pub carts: Arc<crate::services::CartService>,
    pub checkout: Arc<crate::services::CheckoutService>,
    pub reconciliation: Arc<crate::services::ReconciliationService>,
    pub shipping: Arc<crate::services::ShippingRateClient>,
    pub tax: Arc<crate::services::TaxClient>,
    pub gateway: Arc<crate::services::PaymentGatewayClient>,
    pub email: Arc<crate::services::EmailClient>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let orders = Arc::new(crate::services::OrderService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let carts = Arc::new(crate::services::CartService::new(db, event_sender));

        let shipping = Arc::new(crate::services::ShippingRateClient::new(
            &config.shipping,
            &config.checkout,
        ));
        let tax = Arc::new(crate::services::TaxClient::new(
            &config.tax,
            config.checkout.fallback_tax_rate,
        ));
        let gateway = Arc::new(crate::services::PaymentGatewayClient::new(&config.payment));
        let email = Arc::new(crate::services::EmailClient::new(&config.email));

        let checkout = Arc::new(crate::services::CheckoutService::new(
            orders.clone(),
            gateway.clone(),
            shipping.clone(),
            tax.clone(),
            config.currency.clone(),
            config.checkout.free_shipping_threshold,
        ));
        let reconciliation = Arc::new(crate::services::ReconciliationService::new(
            orders.clone(),
            carts.clone(),
            gateway.clone(),
            email.clone(),
            config.currency.clone(),
        ));

        Self {
            orders,
            carts,
            checkout,
            reconciliation,
            shipping,
            tax,
            gateway,
            email,
        }
    }
}
