//! # Configuration Module
//!
//! Gateway configuration loaded from YAML, overridden by `GATEWAY_*`
//! environment variables and validated as a whole before startup.
//!
//! ## Loading order
//! 1. `GatewayConfig::default()` when the file is absent, otherwise the YAML file
//! 2. environment overrides (`GATEWAY_<SECTION>_<FIELD>`)
//! 3. `validate()`, which reports every problem at once

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::caching::cache_manager::{CacheBackend, CacheConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Backing database settings
    pub sources: SourcesConfig,

    /// Token verification and route permissions
    pub auth: AuthConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,

    /// Upper bound for a whole request, including every backing call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long in-flight requests may drain after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Connection settings for one relational store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 30,
            idle_timeout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Ski federation results schema
    pub fis: DatabaseConfig,

    /// Wearable telemetry schema
    pub utv: DatabaseConfig,

    /// Deadline applied to every single store call
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fis: DatabaseConfig::default(),
            utv: DatabaseConfig::default(),
            query_timeout: Duration::from_secs(7),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret for bearer tokens
    pub jwt_secret: String,

    /// Expected `iss` claim, checked when set
    pub issuer: Option<String>,

    /// Role → `METHOD:/path` grants. Empty means the built-in table.
    pub roles: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file when it exists, otherwise start from defaults.
    ///
    /// Either way environment overrides and validation are applied.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        if tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            return Self::load_from_file(path).await;
        }

        let mut config = GatewayConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Variables follow the pattern `GATEWAY_<SECTION>_<FIELD>`, for example
    /// `GATEWAY_SERVER_PORT=9000` or `GATEWAY_CACHE_VOLATILE_TTL=5m`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(port) = lookup("GATEWAY_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_SERVER_PORT: {}", e)))?;
        }
        if let Some(timeout) = lookup("GATEWAY_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = parse_duration("GATEWAY_SERVER_REQUEST_TIMEOUT", &timeout)?;
        }

        if let Some(backend) = lookup("GATEWAY_CACHE_BACKEND") {
            self.cache.backend = match backend.to_ascii_lowercase().as_str() {
                "redis" => CacheBackend::Redis,
                "memory" => CacheBackend::Memory,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid GATEWAY_CACHE_BACKEND: {} (expected redis or memory)",
                        other
                    )))
                }
            };
        }
        if let Some(url) = lookup("GATEWAY_CACHE_REDIS_URL") {
            self.cache.redis.url = url;
        }
        if let Some(ttl) = lookup("GATEWAY_CACHE_REFERENCE_TTL") {
            self.cache.reference_ttl = parse_duration("GATEWAY_CACHE_REFERENCE_TTL", &ttl)?;
        }
        if let Some(ttl) = lookup("GATEWAY_CACHE_VOLATILE_TTL") {
            self.cache.volatile_ttl = parse_duration("GATEWAY_CACHE_VOLATILE_TTL", &ttl)?;
        }
        if let Some(timeout) = lookup("GATEWAY_CACHE_SWEEP_TIMEOUT") {
            self.cache.sweep_timeout = parse_duration("GATEWAY_CACHE_SWEEP_TIMEOUT", &timeout)?;
        }

        if let Some(url) = lookup("GATEWAY_FIS_DB_URL") {
            self.sources.fis.url = url;
        }
        if let Some(url) = lookup("GATEWAY_UTV_DB_URL") {
            self.sources.utv.url = url;
        }
        if let Some(timeout) = lookup("GATEWAY_SOURCES_QUERY_TIMEOUT") {
            self.sources.query_timeout = parse_duration("GATEWAY_SOURCES_QUERY_TIMEOUT", &timeout)?;
        }

        if let Some(secret) = lookup("GATEWAY_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }
        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid GATEWAY_LOG_FORMAT: {} (expected json or text)",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Configuration validation with every problem reported at once
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("server.bind_address cannot be empty".to_string());
        }
        if self.server.request_timeout.is_zero() {
            errors.push("server.request_timeout must be greater than 0".to_string());
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis.url.is_empty() {
            errors.push("cache.redis.url is required when cache.backend is redis".to_string());
        }
        if self.cache.reference_ttl.is_zero() || self.cache.volatile_ttl.is_zero() {
            errors.push("cache TTLs must be greater than 0".to_string());
        }
        if self.cache.operation_timeout.is_zero() {
            errors.push("cache.operation_timeout must be greater than 0".to_string());
        }
        if self.cache.sweep_timeout < self.cache.operation_timeout {
            errors.push(
                "cache.sweep_timeout must not be shorter than cache.operation_timeout".to_string(),
            );
        }
        if self.cache.redis.scan_batch_size == 0 {
            errors.push("cache.redis.scan_batch_size must be greater than 0".to_string());
        }

        if self.sources.fis.url.is_empty() {
            errors.push("sources.fis.url cannot be empty".to_string());
        }
        if self.sources.utv.url.is_empty() {
            errors.push("sources.utv.url cannot be empty".to_string());
        }
        if self.sources.query_timeout.is_zero() {
            errors.push("sources.query_timeout must be greater than 0".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            errors.push("auth.jwt_secret cannot be empty".to_string());
        }
        for (role, grants) in &self.auth.roles {
            if grants.is_empty() {
                errors.push(format!("auth.roles.{} has no grants", role));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(errors.join("; ")))
        }
    }
}

fn parse_duration(name: &str, value: &str) -> GatewayResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.sources.fis.url = "postgres://localhost/fis".to_string();
        config.sources.utv.url = "postgres://localhost/utv".to_string();
        config.auth.jwt_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_defaults_need_connection_settings() {
        let err = GatewayConfig::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sources.fis.url"));
        assert!(message.contains("sources.utv.url"));
        assert!(message.contains("auth.jwt_secret"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_sweep_timeout_covers_single_calls() {
        let mut config = valid_config();
        config.cache.operation_timeout = Duration::from_secs(5);
        config.cache.sweep_timeout = Duration::from_secs(1);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.sweep_timeout"));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = valid_config();
        let vars: HashMap<&str, &str> = [
            ("GATEWAY_SERVER_PORT", "9090"),
            ("GATEWAY_CACHE_BACKEND", "memory"),
            ("GATEWAY_CACHE_VOLATILE_TTL", "2m"),
            ("GATEWAY_LOG_FORMAT", "text"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.volatile_ttl, Duration::from_secs(120));
        assert_eq!(config.observability.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = valid_config();
        let result = config.apply_overrides_from(|name| {
            (name == "GATEWAY_SERVER_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_round_trip_uses_humantime() {
        let yaml = r#"
server:
  port: 8181
  request_timeout: 15s
cache:
  backend: memory
  reference_ttl: 6h
  volatile_ttl: 10m
sources:
  fis:
    url: postgres://localhost/fis
  utv:
    url: postgres://localhost/utv
  query_timeout: 5s
auth:
  jwt_secret: s3cret
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8181);
        assert_eq!(config.server.request_timeout, Duration::from_secs(15));
        assert_eq!(config.cache.reference_ttl, Duration::from_secs(6 * 3600));
        assert_eq!(config.sources.query_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }
}
