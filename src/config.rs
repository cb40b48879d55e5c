//! Runtime configuration, read from the environment (after `.env`).

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::value_objects::Money;
use crate::store::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment { Development, Production }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat { Pretty, Json }

/// Flat shipping fee, waived once the sub-total reaches the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct ShippingPolicy {
    pub flat_fee: Money,
    pub free_threshold: Option<Money>,
}

impl ShippingPolicy {
    pub fn price_for(&self, sub_total: Money) -> Money {
        match self.free_threshold {
            Some(threshold) if sub_total >= threshold => Money::ZERO,
            _ => self.flat_fee,
        }
    }
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self { flat_fee: Money::from_major(30_000), free_threshold: Some(Money::from_major(500_000)) }
    }
}

/// Knobs the order services read on every request.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub shipping: ShippingPolicy,
    /// Largest accepted gap between a client's expected total and ours.
    pub total_tolerance: Money,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shipping: ShippingPolicy::default(),
            total_tolerance: Money::new(Decimal::new(1, 2)),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub environment: Environment,
    pub log_format: LogFormat,
    pub db_max_connections: u32,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = EngineConfig::default();

        let environment = match get("ENVIRONMENT").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Development,
        };
        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let flat_fee = parse_or(get("SHIPPING_FLAT_FEE"), "SHIPPING_FLAT_FEE", defaults.shipping.flat_fee.amount())?;
        let free_threshold = match get("SHIPPING_FREE_THRESHOLD").as_deref() {
            Some("none") | Some("off") => None,
            Some(raw) => Some(Money::new(parse("SHIPPING_FREE_THRESHOLD", raw)?)),
            None => defaults.shipping.free_threshold,
        };
        let tolerance = parse_or(get("TOTAL_TOLERANCE"), "TOTAL_TOLERANCE", defaults.total_tolerance.amount())?;
        let max_attempts = parse_or(get("TX_MAX_ATTEMPTS"), "TX_MAX_ATTEMPTS", defaults.retry.max_attempts)?;

        if flat_fee.is_sign_negative() || tolerance.is_sign_negative() {
            return Err(ConfigError::Invalid { key: "SHIPPING_FLAT_FEE/TOTAL_TOLERANCE", value: "negative".into() });
        }

        Ok(Self {
            port: parse_or(get("PORT"), "PORT", 8083)?,
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            environment,
            log_format,
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?,
            engine: EngineConfig {
                shipping: ShippingPolicy { flat_fee: Money::new(flat_fee).rounded(), free_threshold },
                total_tolerance: Money::new(tolerance),
                retry: RetryPolicy { max_attempts: max_attempts.max(1), ..defaults.retry },
            },
        })
    }

    pub fn is_development(&self) -> bool { self.environment == Environment::Development }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw.to_string() })
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    raw.map_or(Ok(default), |v| parse(key, &v))
}
