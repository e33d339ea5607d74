use alloy::primitives::Address;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use url::Url;
use x402_failover::{
    parse_price, usdc_for_network, Credentials, DispatchOrdering, FacilitatorDescriptor,
    FailoverSettings, PaymentRequirements, BASE_SEPOLIA, DEFAULT_TIMEOUT_MS, SCHEME_NAME,
    TOKEN_DECIMALS,
};

const DEFAULT_PORT: u16 = 4021;
const DEFAULT_RATE_LIMIT_RPM: u32 = 60;
const MAX_FACILITATORS: usize = 16;

const DEFAULT_WEATHER_PRICE: &str = "$0.001";
const DEFAULT_PREMIUM_DATA_PRICE: &str = "$0.01";
const DEFAULT_ANALYTICS_PRICE: &str = "$0.05";

/// Facilitators used when no `FACILITATOR_<n>_URL` is set: (id, name, url, priority).
const DEFAULT_FACILITATORS: [(&str, &str, &str, i64); 2] = [
    ("x402-rs", "X402 RS", "https://facilitator.x402.rs", 1),
    (
        "payai-network",
        "PayAI Network",
        "https://facilitator.payai.network",
        2,
    ),
];

#[derive(Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,
    /// Recipient of every payment
    pub pay_to: Address,
    /// x402 network name (e.g. "base-sepolia")
    pub network: String,
    /// USDC contract on `network`
    pub asset: Address,
    pub weather_price: String,
    pub premium_data_price: String,
    pub analytics_price: String,
    /// Facilitators in configuration order
    pub facilitators: Vec<FacilitatorDescriptor>,
    pub failover: FailoverSettings,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Bearer token required for /metrics
    pub metrics_token: Option<String>,
    /// Serve /metrics without a token when none is configured
    pub public_metrics: bool,
    /// Bearer token required for /facilitator-status
    pub status_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("pay_to", &self.pay_to)
            .field("network", &self.network)
            .field("asset", &self.asset)
            .field("weather_price", &self.weather_price)
            .field("premium_data_price", &self.premium_data_price)
            .field("analytics_price", &self.analytics_price)
            // Credentials redact themselves.
            .field("facilitators", &self.facilitators)
            .field("failover", &self.failover)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .field(
                "status_token",
                &self.status_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Required: payment recipient
        let pay_to_str = var("EVM_ADDRESS").ok_or(ConfigError::MissingRequired("EVM_ADDRESS"))?;
        let pay_to: Address = pay_to_str
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(pay_to_str))?;

        let network = var("NETWORK").unwrap_or_else(|| BASE_SEPOLIA.to_string());
        let asset =
            usdc_for_network(&network).ok_or_else(|| ConfigError::UnknownNetwork(network.clone()))?;

        let port = parse_or("PORT", var("PORT"), DEFAULT_PORT)?;

        let weather_price = var("WEATHER_PRICE").unwrap_or_else(|| DEFAULT_WEATHER_PRICE.into());
        let premium_data_price =
            var("PREMIUM_DATA_PRICE").unwrap_or_else(|| DEFAULT_PREMIUM_DATA_PRICE.into());
        let analytics_price =
            var("ANALYTICS_PRICE").unwrap_or_else(|| DEFAULT_ANALYTICS_PRICE.into());

        let failover = failover_settings(&var)?;
        let facilitators = facilitators(&var)?;

        let allowed_origins: Vec<String> = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        let rate_limit_rpm = parse_or("RATE_LIMIT_RPM", var("RATE_LIMIT_RPM"), DEFAULT_RATE_LIMIT_RPM)?;

        let metrics_token = var("METRICS_TOKEN");
        let public_metrics = var("X402_PUBLIC_METRICS").is_some_and(|v| v == "true" || v == "1");
        let status_token = var("STATUS_TOKEN");

        if metrics_token.is_none() && !public_metrics {
            tracing::warn!("METRICS_TOKEN not set; /metrics will answer 403");
        }
        if status_token.is_none() {
            tracing::warn!("STATUS_TOKEN not set; /facilitator-status is publicly accessible");
        }

        Ok(Self {
            port,
            pay_to,
            network,
            asset,
            weather_price,
            premium_data_price,
            analytics_price,
            facilitators,
            failover,
            allowed_origins,
            rate_limit_rpm,
            metrics_token,
            public_metrics,
            status_token,
        })
    }
}

fn failover_settings(var: &impl Fn(&str) -> Option<String>) -> Result<FailoverSettings, ConfigError> {
    let mut settings = FailoverSettings::default();

    if let Some(ms) = var("FACILITATOR_TIMEOUT_MS") {
        settings.default_timeout = millis("FACILITATOR_TIMEOUT_MS", &ms)?;
    }
    settings.retries_per_facilitator = parse_or(
        "FACILITATOR_RETRIES",
        var("FACILITATOR_RETRIES"),
        settings.retries_per_facilitator,
    )?;
    settings.health_check.enabled = var("FACILITATOR_HEALTH_CHECK").as_deref() != Some("false");
    if let Some(ms) = var("FACILITATOR_HEALTH_CHECK_INTERVAL_MS") {
        settings.health_check.interval = millis("FACILITATOR_HEALTH_CHECK_INTERVAL_MS", &ms)?;
    }
    if let Some(ms) = var("FACILITATOR_PROBE_TIMEOUT_MS") {
        settings.health_check.probe_timeout = millis("FACILITATOR_PROBE_TIMEOUT_MS", &ms)?;
    }
    settings.health_check.max_consecutive_failures = parse_or(
        "FACILITATOR_MAX_CONSECUTIVE_FAILURES",
        var("FACILITATOR_MAX_CONSECUTIVE_FAILURES"),
        settings.health_check.max_consecutive_failures,
    )?;
    settings.logging.enabled = var("FACILITATOR_LOGGING").as_deref() != Some("false");
    settings.logging.max_entries = parse_or(
        "FACILITATOR_MAX_LOG_ENTRIES",
        var("FACILITATOR_MAX_LOG_ENTRIES"),
        settings.logging.max_entries,
    )?;
    if let Some(ordering) = var("FACILITATOR_DISPATCH_ORDERING") {
        settings.ordering = ordering
            .parse::<DispatchOrdering>()
            .map_err(|reason| ConfigError::InvalidValue {
                key: "FACILITATOR_DISPATCH_ORDERING".to_string(),
                reason,
            })?;
    }

    settings.validate().map_err(|reason| ConfigError::InvalidValue {
        key: "FACILITATOR_*".to_string(),
        reason,
    })?;
    Ok(settings)
}

/// Read `FACILITATOR_<n>_*` for n = 1..=16, falling back to the built-in list.
fn facilitators(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Vec<FacilitatorDescriptor>, ConfigError> {
    let mut descriptors = Vec::new();

    for n in 1..=MAX_FACILITATORS {
        let key = |field: &str| format!("FACILITATOR_{n}_{field}");
        let Some(raw_url) = var(&key("URL")) else {
            continue;
        };
        let endpoint = Url::parse(&raw_url).map_err(|_| ConfigError::InvalidUrl(raw_url))?;

        let id = var(&key("ID")).unwrap_or_else(|| format!("facilitator-{n}"));
        let name = var(&key("NAME")).unwrap_or_else(|| id.clone());
        let priority = parse_or(&key("PRIORITY"), var(&key("PRIORITY")), n as i64)?;

        let mut descriptor = FacilitatorDescriptor::new(id, name, priority, endpoint);
        if let Some(ms) = var(&key("TIMEOUT_MS")) {
            descriptor = descriptor.with_timeout(millis(&key("TIMEOUT_MS"), &ms)?);
        }
        if var(&key("ENABLED")).as_deref() == Some("false") {
            descriptor = descriptor.disabled();
        }
        if let Some(api_key) = var(&key("API_KEY")) {
            descriptor = descriptor.with_credentials(Credentials::Bearer(api_key));
        } else if let Some(secret) = var(&key("SHARED_SECRET")) {
            if secret.len() < 32 {
                tracing::warn!(
                    facilitator = %descriptor.id,
                    "Shared secret is shorter than 32 bytes; use `openssl rand -hex 32`"
                );
            }
            descriptor = descriptor.with_credentials(Credentials::SharedSecret(secret.into_bytes()));
        }
        descriptors.push(descriptor);
    }

    if descriptors.is_empty() {
        tracing::info!("No FACILITATOR_<n>_URL configured; using built-in facilitators");
        for (id, name, url, priority) in DEFAULT_FACILITATORS {
            let endpoint = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
            descriptors.push(
                FacilitatorDescriptor::new(id, name, priority, endpoint)
                    .with_timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            );
        }
    }

    Ok(descriptors)
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn millis(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(key, Some(raw.to_string()), 0)?;
    if ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

/// Payment terms for one priced route.
#[derive(Debug, Clone)]
pub struct RoutePaymentConfig {
    /// Human-readable price, e.g. "$0.001"
    pub price: String,
    pub requirements: PaymentRequirements,
}

/// Priced routes keyed by `"METHOD /path"`.
#[derive(Debug, Default)]
pub struct PaymentConfig {
    pub routes: HashMap<String, RoutePaymentConfig>,
}

impl PaymentConfig {
    /// The three demo resources at their configured prices.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(PaymentConfigBuilder::new(config.pay_to, &config.network, config.asset)
            .route(
                "GET",
                "/api/weather",
                &config.weather_price,
                "Current weather conditions",
            )?
            .route(
                "POST",
                "/api/weather",
                &config.weather_price,
                "Current weather conditions",
            )?
            .route(
                "GET",
                "/api/premium-data",
                &config.premium_data_price,
                "Market data, trends and predictions",
            )?
            .route(
                "GET",
                "/api/analytics",
                &config.analytics_price,
                "Usage analytics report",
            )?
            .build())
    }

    pub fn get_route(&self, method: &str, path: &str) -> Option<&RoutePaymentConfig> {
        self.routes.get(&format!("{method} {path}"))
    }
}

pub struct PaymentConfigBuilder {
    pay_to: Address,
    network: String,
    asset: Address,
    routes: HashMap<String, RoutePaymentConfig>,
}

impl PaymentConfigBuilder {
    pub fn new(pay_to: Address, network: &str, asset: Address) -> Self {
        Self {
            pay_to,
            network: network.to_string(),
            asset,
            routes: HashMap::new(),
        }
    }

    /// Register a priced route, e.g. `route("GET", "/api/weather", "$0.001", "...")`.
    pub fn route(
        mut self,
        method: &str,
        path: &str,
        price: &str,
        description: &str,
    ) -> Result<Self, ConfigError> {
        let amount = parse_price(price, TOKEN_DECIMALS)
            .map_err(|e| ConfigError::InvalidPrice(e.to_string()))?;

        self.routes.insert(
            format!("{method} {path}"),
            RoutePaymentConfig {
                price: price.to_string(),
                requirements: PaymentRequirements {
                    scheme: SCHEME_NAME.to_string(),
                    network: self.network.clone(),
                    max_amount_required: amount.to_string(),
                    resource: path.to_string(),
                    description: description.to_string(),
                    mime_type: "application/json".to_string(),
                    pay_to: self.pay_to,
                    max_timeout_seconds: 60,
                    asset: self.asset,
                    output_schema: None,
                    extra: Some(serde_json::json!({"name": "USDC", "version": "2"})),
                },
            },
        );
        Ok(self)
    }

    pub fn build(self) -> PaymentConfig {
        PaymentConfig {
            routes: self.routes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("unsupported network: {0}")]
    UnknownNetwork(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
