use {
    crate::{
        adapters::{mollie::MollieGateway, stripe::StripeGateway},
        domain::{
            gateway::{GatewayName, GatewayRegistry, PaymentGateway},
            money::{Currency, MoneyAmount},
        },
    },
    std::{str::FromStr, sync::Arc, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone)]
pub enum Storage {
    Postgres { database_url: String },
    Memory,
}

/// Credentials and routing preferences for one gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub priority: i32,
    pub currencies: Vec<Currency>,
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub storage: Storage,
    pub stripe: Option<GatewayConfig>,
    pub mollie: Option<GatewayConfig>,
    pub mollie_api_base: Option<String>,
    pub public_base_url: String,
    pub webhook_tolerance: Duration,
    pub job_timeout: Duration,
    pub worker_batch_size: i64,
    pub large_donation_threshold: MoneyAmount,
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage = match get("STORAGE").as_deref() {
            Some("memory") => Storage::Memory,
            Some("postgres") | None => Storage::Postgres {
                database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            Some(other) => return Err(invalid("STORAGE", other)),
        };

        let threshold = parse_or(&get, "LARGE_DONATION_THRESHOLD", 100_000i64)?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            storage,
            stripe: gateway_config(&get, "STRIPE", "STRIPE_SECRET_KEY", 1, &[Currency::Usd, Currency::Eur, Currency::Gbp])?,
            mollie: gateway_config(&get, "MOLLIE", "MOLLIE_API_KEY", 2, &[Currency::Eur])?,
            mollie_api_base: get("MOLLIE_API_BASE"),
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            webhook_tolerance: Duration::from_secs(parse_or(&get, "WEBHOOK_TOLERANCE_SECS", 300u64)?),
            job_timeout: Duration::from_secs(parse_or(&get, "JOB_TIMEOUT_SECS", 30u64)?),
            worker_batch_size: parse_or(&get, "WORKER_BATCH_SIZE", 10i64)?,
            large_donation_threshold: MoneyAmount::new(threshold)
                .map_err(|_| invalid("LARGE_DONATION_THRESHOLD", &threshold.to_string()))?,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 15u64)?),
        })
    }

    /// Registers every gateway whose credentials are present.
    pub fn gateway_registry(&self) -> GatewayRegistry {
        let mut registry = GatewayRegistry::new();

        if let Some(cfg) = &self.stripe {
            let gateway = StripeGateway::new(
                &cfg.secret_key,
                cfg.webhook_secret.clone(),
                cfg.descriptor(GatewayName::Stripe),
            )
            .with_tolerance(self.webhook_tolerance);
            registry = registry.register(Arc::new(gateway));
        }

        if let Some(cfg) = &self.mollie {
            let mut gateway = MollieGateway::new(
                cfg.secret_key.clone(),
                cfg.webhook_secret.clone(),
                self.public_base_url.clone(),
                cfg.descriptor(GatewayName::Mollie),
            );
            if let Some(base) = &self.mollie_api_base {
                gateway = gateway.with_api_base(base.clone());
            }
            registry = registry.register(Arc::new(gateway));
        }

        registry
    }
}

impl GatewayConfig {
    fn descriptor(&self, name: GatewayName) -> PaymentGateway {
        PaymentGateway {
            name,
            test_mode: self.test_mode,
            priority: self.priority,
            supported_currencies: self.currencies.clone(),
            enabled: true,
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
        None => Ok(default),
    }
}

fn gateway_config(
    get: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    key_var: &str,
    default_priority: i32,
    default_currencies: &[Currency],
) -> Result<Option<GatewayConfig>, ConfigError> {
    let secret_key = get(key_var);
    let webhook_secret = get(&format!("{prefix}_WEBHOOK_SECRET"));
    let (Some(secret_key), Some(webhook_secret)) = (secret_key, webhook_secret) else {
        return Ok(None);
    };

    let currencies_key = format!("{prefix}_CURRENCIES");
    let currencies = match get(&currencies_key) {
        Some(raw) => raw
            .split(',')
            .map(|c| Currency::try_from(c.trim()).map_err(|_| invalid(&currencies_key, &raw)))
            .collect::<Result<Vec<_>, _>>()?,
        None => default_currencies.to_vec(),
    };

    let test_mode_key = format!("{prefix}_TEST_MODE");
    Ok(Some(GatewayConfig {
        secret_key,
        webhook_secret,
        priority: parse_or(get, &format!("{prefix}_PRIORITY"), default_priority)?,
        currencies,
        test_mode: parse_or(get, &test_mode_key, true)?,
    }))
}
