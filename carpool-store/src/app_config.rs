use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Pending plus matched trips one user may hold at once
    #[serde(default = "default_max_active_trips")]
    pub max_active_trips: i64,
    /// Trips one user may create per calendar day
    #[serde(default = "default_max_daily_trips")]
    pub max_daily_trips: i64,
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
}

fn default_max_active_trips() -> i64 { 2 }
fn default_max_daily_trips() -> i64 { 5 }
fn default_page_size() -> i64 { 20 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            max_active_trips: default_max_active_trips(),
            max_daily_trips: default_max_daily_trips(),
            default_page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_trip_ttl")]
    pub trip_ttl_seconds: u64,
    #[serde(default = "default_list_ttl")]
    pub list_ttl_seconds: u64,
}

fn default_enabled() -> bool { true }
fn default_trip_ttl() -> u64 { 600 }
fn default_list_ttl() -> u64 { 300 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            trip_ttl_seconds: default_trip_ttl(),
            list_ttl_seconds: default_list_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn trip_ttl(&self) -> Duration {
        Duration::from_secs(self.trip_ttl_seconds)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    /// Outbound messages buffered per connection before it is dropped
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_mailbox_capacity() -> usize { 256 }

impl Default for HubConfig {
    fn default() -> Self {
        Self { mailbox_capacity: default_mailbox_capacity() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `CARPOOL__HUB__MAILBOX_CAPACITY=512`
            .add_source(config::Environment::with_prefix("CARPOOL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_source() {
        let source = r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/carpool"
            [redis]
            url = "redis://localhost"
            [auth]
            jwt_secret = "secret"
        "#;
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.hub.mailbox_capacity, 256);
        assert_eq!(cfg.cache.trip_ttl(), Duration::from_secs(600));
        assert_eq!(cfg.cache.list_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.business_rules.max_active_trips, 2);
        assert_eq!(cfg.business_rules.max_daily_trips, 5);
        assert_eq!(cfg.database.max_connections, 5);
    }
}
