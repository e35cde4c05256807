//! Process configuration, read from the environment (and `.env` if present).

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_STORAGE_URL: &str = "sqlite://storefront.db?mode=rwc";
pub const DEFAULT_NOTIFICATION_SUBJECT: &str = "storefront.notifications.>";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the remote storefront REST API, without trailing slash.
    pub api_url: String,
    pub port: u16,
    pub storage_url: String,
    /// Push channel; the notification bridge stays off when unset.
    pub nats_url: Option<String>,
    pub notification_subject: String,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = get("STOREFRONT_API_URL").ok_or(ConfigError::Missing("STOREFRONT_API_URL"))?;
        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };
        let timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(ConfigError::Invalid { name: "HTTP_TIMEOUT_SECS", value: raw }),
            },
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            port,
            storage_url: get("STOREFRONT_STORAGE_URL").unwrap_or_else(|| DEFAULT_STORAGE_URL.to_string()),
            nats_url: get("NATS_URL"),
            notification_subject: get("NOTIFICATION_SUBJECT").unwrap_or_else(|| DEFAULT_NOTIFICATION_SUBJECT.to_string()),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn bind_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[("STOREFRONT_API_URL", "https://api.example.com/api/")]).unwrap();
        assert_eq!(c.api_url, "https://api.example.com/api");
        assert_eq!(c.port, 8083);
        assert_eq!(c.storage_url, DEFAULT_STORAGE_URL);
        assert_eq!(c.nats_url, None);
        assert_eq!(c.http_timeout, Duration::from_secs(15));
        assert_eq!(c.bind_addr(), "0.0.0.0:8083");
    }

    #[test]
    fn test_api_url_required() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("STOREFRONT_API_URL")));
        assert_eq!(config(&[("STOREFRONT_API_URL", "  ")]), Err(ConfigError::Missing("STOREFRONT_API_URL")));
    }

    #[test]
    fn test_invalid_values() {
        let err = config(&[("STOREFRONT_API_URL", "http://x"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid { name: "PORT", value: "eighty".into() });
        assert!(config(&[("STOREFRONT_API_URL", "http://x"), ("HTTP_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("STOREFRONT_API_URL", "http://x"),
            ("PORT", "9000"),
            ("NATS_URL", "nats://localhost:4222"),
            ("NOTIFICATION_SUBJECT", "orders.>"),
        ])
        .unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(c.notification_subject, "orders.>");
    }
}
