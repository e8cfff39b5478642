//! Layered application configuration (SPEC_FULL.md §4.13).
//!
//! Load order: compiled-in defaults, an optional `config/{default,<RUN_MODE>}.yaml`
//! file pair, then `SEG_`-prefixed environment variables — the same three-tier
//! layering the teacher's `AppConfig::load` uses, just with a different env prefix.

use config::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "netseg".to_string(),
            max_connections: 20,
        }
    }
}

/// Bind address for the ambient health/readiness surface (SPEC_FULL.md §1, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".parse().unwrap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    pub otlp_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "netseg-core".to_string(),
            environment: "development".to_string(),
            otlp_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

/// Settings for the SGROUP client a [`crate::sync::SyncManager`] adapter would
/// use. The wire protocol itself is out of scope; this still models the
/// operator-facing knobs (SPEC_FULL.md §4.13).
#[derive(Debug, Clone, Deserialize)]
pub struct SgroupConfig {
    pub endpoint: String,
    #[serde(with = "humantime_seconds", default = "default_call_timeout")]
    pub call_timeout: Duration,
    pub max_retries: u32,
}

impl Default for SgroupConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9090".to_string(),
            call_timeout: default_call_timeout(),
            max_retries: 3,
        }
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

mod humantime_seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sgroup: SgroupConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Ok(run_mode) = std::env::var("RUN_MODE") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("SEG").separator("_"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}
