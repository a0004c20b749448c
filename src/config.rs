//! Service configuration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP port
    pub port: u16,
    /// PostgreSQL connection URL; the in-memory backend is used when unset
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// NATS server for real-time status events
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    /// HTTP mail relay endpoint (env: MAIL_RELAY_URL) and bearer token (env: MAIL_RELAY_TOKEN)
    pub mail_relay_url: Option<String>,
    pub mail_relay_token: Option<String>,
    pub mail_from: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| var(name).filter(|s| !s.trim().is_empty());
        Ok(Self {
            port: number(&var, "PORT", 8083)?,
            database_url: optional("DATABASE_URL"),
            database_max_connections: number(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: optional("NATS_URL"),
            nats_subject_prefix: optional("NATS_SUBJECT_PREFIX").unwrap_or_else(|| "notifications".into()),
            mail_relay_url: optional("MAIL_RELAY_URL"),
            mail_relay_token: optional("MAIL_RELAY_TOKEN"),
            mail_from: optional("MAIL_FROM").unwrap_or_else(|| "orders@localhost".into()),
        })
    }
}

fn number<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::NotANumber { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.nats_subject_prefix, "notifications");
        assert_eq!(config.mail_from, "orders@localhost");
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = load(&[("PORT", "9000"), ("DATABASE_URL", "postgres://localhost/orders"), ("NATS_URL", "  ")]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert_eq!(config.nats_url, None);
    }

    #[test]
    fn test_bad_number_is_rejected() {
        assert!(matches!(load(&[("PORT", "eighty")]), Err(ConfigError::NotANumber { name: "PORT", .. })));
    }
}
