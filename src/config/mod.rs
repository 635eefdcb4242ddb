use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub bridge: BridgeConfig,
    pub queue: QueueConfig,
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

/// Session bridge endpoint (the browser-extension relay that holds the
/// provider session)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Periodic sweep cadence and batch shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Seconds between pending-job sweeps
    pub pending_sweep_interval_secs: u64,
    /// Seconds between due-retry sweeps
    pub retry_sweep_interval_secs: u64,
    /// Seconds between reconciliation sweeps
    pub reconcile_sweep_interval_secs: u64,
    /// Jobs picked up per sweep
    pub batch_size: i64,
    /// Base pause between jobs within one sweep, in milliseconds
    pub inter_job_delay_ms: u64,
    /// Extra random pause added on top of the base delay, in milliseconds
    pub inter_job_jitter_ms: u64,
    /// Minutes a queued job may wait for a confirmation webhook before the
    /// reconciliation sweep promotes it to sent
    pub reconcile_after_mins: i64,
    /// Minutes after which a job stuck in processing counts as an abandoned
    /// attempt and takes the retry-or-dead-letter branch
    pub stale_processing_after_mins: i64,
}

/// Default per-user daily quotas, applied when a user has no settings row yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub default_daily_connection_limit: i64,
    pub default_daily_message_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./outreach-relay.db".to_string(),
                max_connections: Some(10),
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            bridge: BridgeConfig {
                base_url: "http://localhost:8090".to_string(),
                request_timeout_secs: 30,
            },
            queue: QueueConfig {
                pending_sweep_interval_secs: 60,
                retry_sweep_interval_secs: 60,
                reconcile_sweep_interval_secs: 120,
                batch_size: 10,
                inter_job_delay_ms: 2000,
                inter_job_jitter_ms: 1000,
                reconcile_after_mins: 5,
                stale_processing_after_mins: 15,
            },
            quota: QuotaConfig {
                default_daily_connection_limit: 20,
                default_daily_message_limit: 50,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}
