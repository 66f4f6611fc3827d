// Server configuration loaded from environment variables
// Decision: No DATABASE_URL means dev mode (in-memory storage)
// Decision: Malformed values fail startup instead of silently falling back

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// PostgreSQL connection string; `None` runs in dev mode
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_acquire_timeout: Duration,
    pub http_addr: SocketAddr,
    /// Prefix for API routes, e.g. "/api" gives /api/v1/users
    pub api_prefix: String,
    pub cors_allowed_origins: Vec<String>,
    /// Attempts cap for event views and the in-process worker
    pub outbox_max_attempts: u32,
    /// Run the outbox worker inside the server (dev mode default)
    pub inprocess_worker: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            database_acquire_timeout: Duration::from_secs(5),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            api_prefix: String::new(),
            cors_allowed_origins: Vec::new(),
            outbox_max_attempts: 5,
            inprocess_worker: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");
        let inprocess_worker = match var("OUTBOX_INPROCESS_WORKER") {
            Some(v) => parse_bool("OUTBOX_INPROCESS_WORKER", &v)?,
            None => database_url.is_none(),
        };

        Ok(Self {
            database_max_connections: parse_or(
                var("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            database_acquire_timeout: Duration::from_secs(parse_or(
                var("DATABASE_ACQUIRE_TIMEOUT_SECS"),
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                defaults.database_acquire_timeout.as_secs(),
            )?),
            http_addr: parse_or(var("HTTP_ADDR"), "HTTP_ADDR", defaults.http_addr)?,
            api_prefix: var("API_PREFIX")
                .map(|p| normalize_prefix(&p))
                .unwrap_or_default(),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            outbox_max_attempts: parse_or(
                var("OUTBOX_MAX_ATTEMPTS"),
                "OUTBOX_MAX_ATTEMPTS",
                defaults.outbox_max_attempts,
            )?
            .max(1),
            inprocess_worker,
            database_url,
        })
    }

    /// Check if this is dev mode (no database configured)
    pub fn is_dev_mode(&self) -> bool {
        self.database_url.is_none()
    }
}

fn parse_or<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value: v,
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// "/api/" and "api" both become "/api"
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_dev_mode() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.is_dev_mode());
        assert!(config.inprocess_worker);
    }

    #[test]
    fn test_database_disables_inprocess_worker() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/userrole"),
            ("DATABASE_MAX_CONNECTIONS", "20"),
            ("HTTP_ADDR", "127.0.0.1:8080"),
            ("API_PREFIX", "api/"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("OUTBOX_MAX_ATTEMPTS", "0"),
        ])
        .unwrap();

        assert!(!config.is_dev_mode());
        assert!(!config.inprocess_worker);
        assert_eq!(config.database_max_connections, 20);
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.outbox_max_attempts, 1);
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[("DATABASE_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));

        assert!(load(&[("OUTBOX_INPROCESS_WORKER", "maybe")]).is_err());
        assert!(!load(&[("OUTBOX_INPROCESS_WORKER", "off")])
            .unwrap()
            .inprocess_worker);
    }
}
