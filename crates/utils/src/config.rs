//! Process configuration read from the environment (and `.env`, when present).

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use thiserror::Error;

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_ALERT_POLL_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub alert_poll_interval: Duration,
    pub anthropic_api_key: Option<String>,
}

impl Config {
    /// Read configuration from the process environment, loading `.env` first
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let host = match lookup("HOST") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value,
            })?,
            None => DEFAULT_HOST,
        };

        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?;
        let poll_secs = parse_or(
            "ALERT_POLL_INTERVAL_SECS",
            lookup("ALERT_POLL_INTERVAL_SECS"),
            DEFAULT_ALERT_POLL_INTERVAL_SECS,
        )?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "ALERT_POLL_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url,
            host,
            port,
            alert_poll_interval: Duration::from_secs(poll_secs),
            anthropic_api_key,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingDatabaseUrl);

        let err = Config::from_lookup(lookup_from(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingDatabaseUrl);
    }

    #[test]
    fn test_defaults_apply() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "sqlite://roofing.db")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host.to_string(), "127.0.0.1");
        assert_eq!(
            config.alert_poll_interval,
            Duration::from_secs(DEFAULT_ALERT_POLL_INTERVAL_SECS)
        );
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_invalid_port_is_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite://roofing.db"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite://roofing.db"),
            ("ALERT_POLL_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ALERT_POLL_INTERVAL_SECS", .. }));
    }
}
