use std::env;
use std::net::IpAddr;
use std::time::Duration;

use storefront::constants::{
    DEFAULT_GATEWAY_BASE_URL, DEFAULT_GATEWAY_TIMEOUT_SECS, DEFAULT_PAYMENT_EXPIRY_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};
use storefront::gateway::GatewayConfig;
use storefront::{CoordinatorConfig, Currency, SharedSecret};
use url::Url;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STORE_CURRENCY: &str = "EUR";
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;

/// Deployment environment, from `ENVIRONMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: Environment,
    pub debug_mode: bool,
    /// SQLite database path
    pub database_path: String,
    /// Client request timeout
    pub request_timeout: Duration,
    /// Currency every product and order is priced in
    pub store_currency: Currency,
    /// How long an ACTIVE payment may wait for its callback
    pub payment_expiry: Duration,
    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
    /// Payment provider merchant account
    pub merchant_id: String,
    /// Payment provider shared secret
    pub secret_key: Vec<u8>,
    pub gateway_base_url: String,
    pub callback_url: String,
    pub success_url: String,
    pub cancel_url: String,
    pub gateway_timeout: Duration,
    /// Shared secret the upstream API gateway sends in `X-Internal-Auth`
    /// (None = user routes trust `X-User-Id` as is)
    pub internal_auth_secret: Option<SharedSecret>,
    /// Peers allowed to call user routes (empty = any)
    pub allowed_gateway_ips: Vec<IpAddr>,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<SharedSecret>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("debug_mode", &self.debug_mode)
            .field("database_path", &self.database_path)
            .field("request_timeout", &self.request_timeout)
            .field("store_currency", &self.store_currency)
            .field("payment_expiry", &self.payment_expiry)
            .field("sweep_interval", &self.sweep_interval)
            .field("merchant_id", &self.merchant_id)
            .field("secret_key", &"[REDACTED]")
            .field("gateway_base_url", &self.gateway_base_url)
            .field("callback_url", &self.callback_url)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("gateway_timeout", &self.gateway_timeout)
            .field("internal_auth_secret", &self.internal_auth_secret)
            .field("allowed_gateway_ips", &self.allowed_gateway_ips)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("metrics_token", &self.metrics_token)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::MissingRequired(key));
        let secs = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber(key, v.clone())),
                None => Ok(default),
            }
        };
        let url = |key: &'static str| -> Result<String, ConfigError> {
            let value = required(key)?;
            Url::parse(&value).map_err(|_| ConfigError::InvalidUrl(value.clone()))?;
            Ok(value)
        };

        let port = match get("PORT") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("PORT", v.clone()))?,
            None => DEFAULT_PORT,
        };
        let environment =
            Environment::parse(&get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()))?;
        let debug_mode = get("DEBUG_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let database_path = required("DATABASE_PATH")?;

        let request_timeout = secs("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if request_timeout < 1 {
            return Err(ConfigError::Invalid(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        let currency_code =
            get("STORE_CURRENCY").unwrap_or_else(|| DEFAULT_STORE_CURRENCY.to_string());
        let store_currency = Currency::new(&currency_code)
            .map_err(|_| ConfigError::InvalidCurrency(currency_code.clone()))?;

        let payment_expiry = secs("PAYMENT_EXPIRY_SECS", DEFAULT_PAYMENT_EXPIRY_SECS)?;
        let sweep_interval = secs("EXPIRY_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        if payment_expiry == 0 || sweep_interval == 0 {
            return Err(ConfigError::Invalid(
                "payment expiry and sweep interval must be positive".to_string(),
            ));
        }

        let merchant_id = required("PAYTRAIL_MERCHANT_ID")?;
        let secret_key = required("PAYTRAIL_SECRET_KEY")?.into_bytes();
        let gateway_base_url =
            get("PAYTRAIL_BASE_URL").unwrap_or_else(|| DEFAULT_GATEWAY_BASE_URL.to_string());
        Url::parse(&gateway_base_url)
            .map_err(|_| ConfigError::InvalidUrl(gateway_base_url.clone()))?;
        let callback_url = url("PAYTRAIL_CALLBACK_URL")?;
        let success_url = url("PAYTRAIL_SUCCESS_URL")?;
        let cancel_url = url("PAYTRAIL_CANCEL_URL")?;
        let gateway_timeout = secs("GATEWAY_TIMEOUT_SECS", DEFAULT_GATEWAY_TIMEOUT_SECS)?;

        let internal_auth_secret = get("INTERNAL_AUTH_SECRET").map(SharedSecret::new);
        let allowed_gateway_ips = get("ALLOWED_GATEWAY_IPS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<IpAddr>()
                            .map_err(|_| ConfigError::InvalidIp(s.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]);

        let rate_limit_rpm = match get("RATE_LIMIT_RPM") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("RATE_LIMIT_RPM", v.clone()))?,
            None => DEFAULT_RATE_LIMIT_RPM,
        };
        if rate_limit_rpm == 0 {
            return Err(ConfigError::Invalid(
                "RATE_LIMIT_RPM must be at least 1".to_string(),
            ));
        }

        let metrics_token = get("METRICS_TOKEN").map(SharedSecret::new);

        if environment == Environment::Production {
            if debug_mode {
                return Err(ConfigError::Invalid(
                    "debug mode must not be enabled in production".to_string(),
                ));
            }
            if internal_auth_secret.is_none() {
                return Err(ConfigError::MissingRequired("INTERNAL_AUTH_SECRET"));
            }
            if allowed_origins.iter().any(|o| o == "*") {
                return Err(ConfigError::Invalid(
                    "wildcard CORS origin '*' is not allowed in production".to_string(),
                ));
            }
        }

        if secret_key.len() < 16 {
            tracing::warn!(
                "PAYTRAIL_SECRET_KEY is short ({} bytes), check that the full merchant secret is set",
                secret_key.len()
            );
        }
        if internal_auth_secret.is_none() {
            tracing::warn!("INTERNAL_AUTH_SECRET not set: X-User-Id is trusted without gateway auth");
        }
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set: /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            port,
            environment,
            debug_mode,
            database_path,
            request_timeout: Duration::from_secs(request_timeout),
            store_currency,
            payment_expiry: Duration::from_secs(payment_expiry),
            sweep_interval: Duration::from_secs(sweep_interval),
            merchant_id,
            secret_key,
            gateway_base_url,
            callback_url,
            success_url,
            cancel_url,
            gateway_timeout: Duration::from_secs(gateway_timeout),
            internal_auth_secret,
            allowed_gateway_ips,
            allowed_origins,
            rate_limit_rpm,
            metrics_token,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug_mode {
            "debug,actix_web=debug"
        } else if self.is_production() {
            "warn,actix_web=warn"
        } else {
            "info,actix_web=info"
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(
            self.merchant_id.clone(),
            self.secret_key.clone(),
            &self.callback_url,
        )
        .with_base_url(self.gateway_base_url.clone())
        .with_return_urls(
            self.callback_url.clone(),
            self.success_url.clone(),
            self.cancel_url.clone(),
        )
        .with_timeout(self.gateway_timeout)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(self.store_currency.clone()).with_payment_expiry(self.payment_expiry)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid environment: {0} (must be development, staging, or production)")]
    InvalidEnvironment(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid number for {0}: {1}")]
    InvalidNumber(&'static str, String),

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
