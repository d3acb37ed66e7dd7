use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_FREE_SHIPPING_THRESHOLD: f64 = 75.0;
const DEFAULT_ITEM_WEIGHT_LB: f64 = 1.0;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_PAYMENT_BASE_URL: &str = "https://api.stripe.com/v1";
const DEFAULT_EMAIL_FROM: &str = "orders@example.com";

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be a 3-letter ISO code".into());
        Err(err)
    }
}

/// Checkout tuning knobs shared by the quoting adapters and the orchestrator.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Subtotal at or above which the cheapest shipping rate is free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,

    /// Assumed per-unit weight (lb) when an item carries no weight
    #[serde(default = "default_item_weight_lb")]
    pub default_item_weight_lb: f64,

    /// Tax rate applied when the destination state has no table entry
    #[serde(default)]
    pub fallback_tax_rate: f64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: default_free_shipping_threshold(),
            default_item_weight_lb: default_item_weight_lb(),
            fallback_tax_rate: 0.0,
        }
    }
}

/// Payment processor configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Payment-intent API base URL
    #[serde(default = "default_payment_base_url")]
    pub base_url: String,

    /// API secret key; intent creation fails without it
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Shared secret for verifying webhook signatures
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            base_url: default_payment_base_url(),
            secret_key: None,
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

/// Shipping rate/tracking provider configuration.
/// Unconfigured base URL means rate quotes fall back to the local zone table.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Domestic country for the zone-table estimate
    #[serde(default = "default_home_country")]
    pub home_country: String,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            home_country: default_home_country(),
        }
    }
}

/// Tax calculation provider configuration.
/// Unconfigured base URL means tax quotes fall back to the per-state table.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Transactional email provider configuration.
/// Unconfigured base URL disables sending (logged no-op).
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_email_from")]
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            from_address: default_email_from(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Settlement currency for orders and payment intents
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    #[serde(default)]
    pub checkout: CheckoutConfig,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub shipping: ShippingConfig,

    #[serde(default)]
    pub tax: TaxConfig,

    #[serde(default)]
    pub email: EmailConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_free_shipping_threshold() -> f64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD
}
fn default_item_weight_lb() -> f64 {
    DEFAULT_ITEM_WEIGHT_LB
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_payment_base_url() -> String {
    DEFAULT_PAYMENT_BASE_URL.to_string()
}
fn default_home_country() -> String {
    "US".to_string()
}
fn default_email_from() -> String {
    DEFAULT_EMAIL_FROM.to_string()
}

impl AppConfig {
    /// Construct a minimal configuration programmatically (tests, tools).
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            currency: default_currency(),
            checkout: CheckoutConfig::default(),
            payment: PaymentConfig::default(),
            shipping: ShippingConfig::default(),
            tax: TaxConfig::default(),
            email: EmailConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("dev")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.cors_allow_any_origin || self.is_development()
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Load configuration from layered files and `APP__`-prefixed environment
/// variables. `config/default.toml` is the base; `config/{environment}.toml`
/// overrides it when present; environment variables win last.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false));

    let env_file = Path::new(CONFIG_DIR).join(&environment);
    builder = builder.add_source(File::from(env_file).required(false));

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(
        environment = %cfg.environment,
        port = cfg.port,
        "Configuration loaded"
    );
    Ok(cfg)
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmatic_config_validates() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        assert!(cfg.validate().is_ok());
        assert!(cfg.is_development());
        assert!(cfg.should_allow_permissive_cors());
    }

    #[test]
    fn bad_currency_is_rejected() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.currency = "DOLLARS".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn checkout_defaults() {
        let checkout = CheckoutConfig::default();
        assert_eq!(checkout.free_shipping_threshold, 75.0);
        assert_eq!(checkout.default_item_weight_lb, 1.0);
        assert_eq!(checkout.fallback_tax_rate, 0.0);
    }
}
