//! Configuration management for the POS server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with POS_ prefix

use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Station notification fan-out
    pub notifications: NotificationsConfig,

    /// Stock ledger behaviour
    pub inventory: InventoryConfig,

    /// Order numbering
    pub orders: OrdersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    /// Messages buffered per station topic before slow subscribers lag
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Accepted beverage items draw down the bartender's stock
    pub consume_on_accept: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdersConfig {
    /// Upper bound of the NN part of YYYYMMDD-NN
    pub max_daily_sequence: u32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("POS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = Self::defaults(&environment)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (POS_ prefix)
            .add_source(
                Environment::with_prefix("POS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Builder preloaded with every default; `database.url` and `jwt.secret`
    /// have none and must come from a file or the environment
    fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("environment", environment)?
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("jwt.refresh_token_expiry", 604800)?
            .set_default("notifications.channel_capacity", 256)?
            .set_default("inventory.consume_on_accept", true)?
            .set_default(
                "orders.max_daily_sequence",
                shared::MAX_DAILY_SEQUENCE as i64,
            )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_everything_but_secrets() {
        let config: Config = Config::defaults("test")
            .unwrap()
            .set_override("database.url", "postgres://localhost/pos")
            .unwrap()
            .set_override("jwt.secret", "s3cret")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.environment, "test");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.notifications.channel_capacity, 256);
        assert!(config.inventory.consume_on_accept);
        assert_eq!(config.orders.max_daily_sequence, 99);
    }

    #[test]
    fn test_missing_database_url_fails() {
        let result: Result<Config, _> = Config::defaults("test")
            .unwrap()
            .set_override("jwt.secret", "s3cret")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();
        assert!(result.is_err());
    }
}
