// Application configuration
//
// Everything is read from the environment (optionally seeded from a .env file)
// once at startup and validated before the server binds.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::discounts::error::{DResult, DiscountError};
use crate::discounts::rules::{parse_month_day, SeasonalWindow};

/// Where coupons, sales and customers are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local stores, for development and tests
    Memory,
}

impl FromStr for StorageBackend {
    type Err = DiscountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(DiscountError::InvalidConfiguration(format!(
                "STORAGE must be 'postgres' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

/// Rule parameters
#[derive(Debug, Clone)]
pub struct DiscountConfig {
    pub platinum_rate: Decimal,
    pub vip_rate: Decimal,
    pub minimum_threshold: Decimal,
    pub minimum_amount: Decimal,
    pub seasonal_rate: Decimal,
    pub seasonal_window: SeasonalWindow,
    pub client_tier_priority: i32,
    pub minimum_amount_priority: i32,
    pub seasonal_priority: i32,
    pub coupon_priority: i32,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            platinum_rate: Decimal::new(15, 2),
            vip_rate: Decimal::new(10, 2),
            minimum_threshold: Decimal::new(100_000, 2),
            minimum_amount: Decimal::new(5_000, 2),
            seasonal_rate: Decimal::new(10, 2),
            seasonal_window: SeasonalWindow::default(),
            client_tier_priority: 50,
            minimum_amount_priority: 20,
            seasonal_priority: 10,
            coupon_priority: 5,
        }
    }
}

impl DiscountConfig {
    /// Read rule parameters, falling back to the defaults for unset variables
    pub fn from_env() -> DResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process environment
    pub fn from_lookup<F>(lookup: F) -> DResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let seasonal_window = match (
            lookup("DISCOUNT_SEASONAL_START"),
            lookup("DISCOUNT_SEASONAL_END"),
        ) {
            (None, None) => defaults.seasonal_window,
            (start, end) => SeasonalWindow::new(
                parse_month_day(start.as_deref().unwrap_or("12-20"))?,
                parse_month_day(end.as_deref().unwrap_or("12-25"))?,
            )?,
        };

        let config = Self {
            platinum_rate: parse_or(&lookup, "DISCOUNT_PLATINUM_RATE", defaults.platinum_rate)?,
            vip_rate: parse_or(&lookup, "DISCOUNT_VIP_RATE", defaults.vip_rate)?,
            minimum_threshold: parse_or(
                &lookup,
                "DISCOUNT_MINIMUM_THRESHOLD",
                defaults.minimum_threshold,
            )?,
            minimum_amount: parse_or(&lookup, "DISCOUNT_MINIMUM_AMOUNT", defaults.minimum_amount)?,
            seasonal_rate: parse_or(&lookup, "DISCOUNT_SEASONAL_RATE", defaults.seasonal_rate)?,
            seasonal_window,
            client_tier_priority: parse_or(
                &lookup,
                "DISCOUNT_CLIENT_TIER_PRIORITY",
                defaults.client_tier_priority,
            )?,
            minimum_amount_priority: parse_or(
                &lookup,
                "DISCOUNT_MINIMUM_AMOUNT_PRIORITY",
                defaults.minimum_amount_priority,
            )?,
            seasonal_priority: parse_or(
                &lookup,
                "DISCOUNT_SEASONAL_PRIORITY",
                defaults.seasonal_priority,
            )?,
            coupon_priority: parse_or(&lookup, "DISCOUNT_COUPON_PRIORITY", defaults.coupon_priority)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rates must lie in (0, 1] and amounts must not be negative
    pub fn validate(&self) -> DResult<()> {
        for (name, rate) in [
            ("DISCOUNT_PLATINUM_RATE", self.platinum_rate),
            ("DISCOUNT_VIP_RATE", self.vip_rate),
            ("DISCOUNT_SEASONAL_RATE", self.seasonal_rate),
        ] {
            if rate <= Decimal::ZERO || rate > Decimal::ONE {
                return Err(DiscountError::InvalidConfiguration(format!(
                    "{} must be in (0, 1], got {}",
                    name, rate
                )));
            }
        }

        for (name, amount) in [
            ("DISCOUNT_MINIMUM_THRESHOLD", self.minimum_threshold),
            ("DISCOUNT_MINIMUM_AMOUNT", self.minimum_amount),
        ] {
            if amount < Decimal::ZERO {
                return Err(DiscountError::InvalidConfiguration(format!(
                    "{} cannot be negative, got {}",
                    name, amount
                )));
            }
        }

        Ok(())
    }
}

/// Process-wide settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageBackend,
    /// Required for the postgres backend
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Upper bound on each sale and customer lookup
    pub lookup_timeout: Duration,
    /// Persist the discounted total back to the sale after a successful evaluation
    pub write_back_sale_total: bool,
    pub discounts: DiscountConfig,
}

impl AppConfig {
    pub fn from_env() -> DResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE") {
            Some(value) => value.parse()?,
            None => StorageBackend::Postgres,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(DiscountError::InvalidConfiguration(
                "DATABASE_URL must be set when STORAGE=postgres".to_string(),
            ));
        }

        let lookup_timeout_ms: u64 = parse_or(&lookup, "LOOKUP_TIMEOUT_MS", 2000)?;
        if lookup_timeout_ms == 0 {
            return Err(DiscountError::InvalidConfiguration(
                "LOOKUP_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            storage,
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            lookup_timeout: Duration::from_millis(lookup_timeout_ms),
            write_back_sale_total: parse_or(&lookup, "WRITE_BACK_SALE_TOTAL", true)?,
            discounts: DiscountConfig::from_lookup(&lookup)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `key` when set, otherwise return `default`
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> DResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            DiscountError::InvalidConfiguration(format!("{}='{}': {}", key, raw, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_discount_defaults() {
        let config = DiscountConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.platinum_rate, dec!(0.15));
        assert_eq!(config.vip_rate, dec!(0.10));
        assert_eq!(config.minimum_threshold, dec!(1000.00));
        assert_eq!(config.minimum_amount, dec!(50.00));
        assert_eq!(config.seasonal_window, SeasonalWindow::default());
        assert_eq!(config.client_tier_priority, 50);
        assert_eq!(config.coupon_priority, 5);
    }

    #[test]
    fn test_discount_overrides() {
        let config = DiscountConfig::from_lookup(lookup_from(&[
            ("DISCOUNT_PLATINUM_RATE", "0.20"),
            ("DISCOUNT_SEASONAL_START", "11-25"),
            ("DISCOUNT_SEASONAL_END", "11-30"),
            ("DISCOUNT_SEASONAL_PRIORITY", "99"),
        ]))
        .unwrap();

        assert_eq!(config.platinum_rate, dec!(0.20));
        assert_eq!(config.seasonal_window, SeasonalWindow::new((11, 25), (11, 30)).unwrap());
        assert_eq!(config.seasonal_priority, 99);
    }

    #[test]
    fn test_rate_out_of_range_is_rejected() {
        let err = DiscountConfig::from_lookup(lookup_from(&[("DISCOUNT_VIP_RATE", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, DiscountError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = DiscountConfig::from_lookup(lookup_from(&[("DISCOUNT_MINIMUM_AMOUNT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("DISCOUNT_MINIMUM_AMOUNT"));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, DiscountError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("STORAGE", "memory"),
            ("PORT", "9090"),
            ("LOOKUP_TIMEOUT_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.bind_address(), "0.0.0.0:9090");
        assert_eq!(config.lookup_timeout, Duration::from_millis(500));
        assert!(config.write_back_sale_total);
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn test_unknown_storage_backend() {
        assert!(AppConfig::from_lookup(lookup_from(&[("STORAGE", "redis")])).is_err());
    }
}
