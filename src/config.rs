//! Service configuration

use rust_decimal::Decimal;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Platform fee applied on top of the discounted subtotal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlatformFee {
    /// Fraction of the subtotal (0.10 = 10%)
    Percentage(Decimal),
    /// Fixed amount per order
    Flat(Decimal),
}

/// Service configuration, loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Master key for the credential vault, 64 hex chars (32 bytes).
    /// Absence is a fatal configuration error — there is no plaintext fallback.
    pub master_key_hex: String,
    /// Payment processor API base URL
    pub processor_base_url: String,
    /// Per-call timeout for processor requests (milliseconds)
    pub processor_timeout_ms: u64,
    /// Fallback seller token for sandbox testing (split payment supported)
    pub fallback_seller_token: Option<String>,
    /// Fallback application token (no split payment)
    pub fallback_app_token: Option<String>,
    /// Platform fee configuration
    pub platform_fee: PlatformFee,
    /// Public base URL for return URLs and the webhook notification URL
    pub public_base_url: String,
    /// Shared secret for webhook signature verification
    pub webhook_secret: String,
    /// Interval between background reconciliation sweeps (seconds)
    pub sweep_interval_secs: u64,
    /// Maximum pending orders examined per sweep
    pub sweep_batch_size: i64,
    /// Only orders created within this many hours are swept
    pub sweep_window_hours: i64,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development
    /// environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        // The vault key has no development fallback: a generated fallback key
        // would silently rotate between restarts and orphan stored tokens.
        let master_key_hex = std::env::var("CREDENTIAL_MASTER_KEY")
            .map_err(|_| "CREDENTIAL_MASTER_KEY must be set (64 hex chars)")?;

        let fee_value: Decimal = std::env::var("PLATFORM_FEE_VALUE")
            .unwrap_or_else(|_| "0.10".into())
            .parse()
            .map_err(|_| "PLATFORM_FEE_VALUE must be a decimal number")?;
        let platform_fee = match std::env::var("PLATFORM_FEE_MODE")
            .unwrap_or_else(|_| "percentage".into())
            .as_str()
        {
            "percentage" => PlatformFee::Percentage(fee_value),
            "flat" => PlatformFee::Flat(fee_value),
            other => return Err(format!("Unknown PLATFORM_FEE_MODE: {other}").into()),
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            master_key_hex,
            processor_base_url: std::env::var("PROCESSOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".into()),
            processor_timeout_ms: std::env::var("PROCESSOR_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10_000),
            fallback_seller_token: std::env::var("FALLBACK_SELLER_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            fallback_app_token: std::env::var("FALLBACK_APP_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            platform_fee,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            webhook_secret: Self::require_secret("WEBHOOK_SECRET", &environment)?,
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),
            sweep_batch_size: std::env::var("SWEEP_BATCH_SIZE")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(100),
            sweep_window_hours: std::env::var("SWEEP_WINDOW_HOURS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(48),
            environment,
        })
    }

    /// Is this a production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
