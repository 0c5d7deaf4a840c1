use std::fmt;
use std::time::Duration;

use serde::Deserialize;

fn default_wait_seconds() -> u64 {
    20
}

fn default_worker_concurrency() -> usize {
    20
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Worker configuration, loaded from the environment with a `TESSERA_` prefix
/// (e.g. `TESSERA_QUEUE_URL`, `TESSERA_WORKER_CONCURRENCY`).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub queue_url: String,

    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    pub inventory_addr: String,

    pub reservation_base_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl WorkerConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("TESSERA").try_parsing(true))
            .build()?;

        let cfg: Self = source.try_deserialize()?;
        cfg.validate().map_err(config::ConfigError::Message)?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), String> {
        if self.queue_url.is_empty() {
            return Err("queue_url is required".into());
        }
        if !(1..=20).contains(&self.wait_seconds) {
            return Err("wait_seconds must be between 1 and 20".into());
        }
        if !(1..=1000).contains(&self.worker_concurrency) {
            return Err("worker_concurrency must be between 1 and 1000".into());
        }
        if self.max_retries > 10 {
            return Err("max_retries must be between 0 and 10".into());
        }
        if !(100..=10_000).contains(&self.backoff_base_ms) {
            return Err("backoff_base_ms must be between 100 and 10000".into());
        }
        if self.inventory_addr.is_empty() {
            return Err("inventory_addr is required".into());
        }
        if self.reservation_base_url.is_empty() {
            return Err("reservation_base_url is required".into());
        }
        if !matches!(self.log_level.as_str(), "debug" | "info" | "warn" | "error") {
            return Err("log_level must be one of: debug, info, warn, error".into());
        }
        Ok(())
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl fmt::Display for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queue_url={} wait_seconds={} worker_concurrency={} max_retries={} backoff_base_ms={} inventory_addr={} reservation_base_url={} log_level={}",
            self.queue_url,
            self.wait_seconds,
            self.worker_concurrency,
            self.max_retries,
            self.backoff_base_ms,
            self.inventory_addr,
            self.reservation_base_url,
            self.log_level,
        )
    }
}
