use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
# Storefront Checkout & Order API

Backend for a direct-to-consumer storefront: checkout quoting (shipping and
tax, with deterministic local estimates when providers are unavailable),
payment-intent creation, asynchronous payment reconciliation via processor
webhooks, cart mirroring for signed-in users, and back-office order
management.

## Checkout flow

1. Collect the contact email and shipping address client-side.
2. Quote shipping (`/checkout/shipping-rates`) and tax (`/checkout/tax`);
   both always answer, falling back to local estimates on provider trouble.
3. Create the pending order and payment intent
   (`/checkout/payment-intent`), then confirm payment in the browser with
   the processor SDK. The processor's webhook settles the order
   asynchronously.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    paths(
        crate::handlers::checkout::quote_shipping_rates,
        crate::handlers::checkout::quote_tax,
        crate::handlers::checkout::create_payment_intent,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::update_order_status,
        crate::handlers::tracking::track_shipment,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::models::CartItem,
        crate::models::ShippingAddress,
        crate::models::ShippingRate,
        crate::services::shipping::RateRequestItem,
        crate::services::shipping::TrackingInfo,
        crate::services::shipping::TrackingEvent,
        crate::services::tax::TaxLineItem,
        crate::services::tax::TaxLineBreakdown,
        crate::handlers::checkout::AddressRequest,
        crate::handlers::checkout::ShippingQuoteRequest,
        crate::handlers::checkout::ShippingQuoteResponse,
        crate::handlers::checkout::TaxQuoteRequest,
        crate::handlers::checkout::TaxQuoteResponse,
        crate::handlers::checkout::CreatePaymentIntentRequest,
        crate::handlers::checkout::CreatePaymentIntentResponse,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::UpdateOrderStatusRequest,
    )),
    tags(
        (name = "Checkout", description = "Quoting and payment-intent creation"),
        (name = "Payments", description = "Payment processor webhook"),
        (name = "Orders", description = "Back-office order management"),
        (name = "Tracking", description = "Shipment tracking lookups")
    )
)]
pub struct ApiDoc;

/// Swagger UI router, mounted by the binary at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
