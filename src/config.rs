//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use std::time::Duration;

/// Default path prefixes that are never eligible for digestion.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] =
    &["app/", ".app/", ".git/", ".lifedb/", "node_modules/"];

/// lifedb configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem root the catalog paths are relative to.
    pub data_root: std::path::PathBuf,

    /// Digest pipeline tuning.
    pub digest: DigestConfig,

    /// External gateway endpoints.
    pub gateways: GatewayConfig,
}

/// Digest pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Per-digest attempt cap.
    pub max_attempts: i64,

    /// Supervisor warm-up delay before the first iteration.
    pub start_delay: Duration,

    /// Sleep when file selection comes back empty.
    pub idle_sleep: Duration,

    /// Pacing delay after each processed file.
    pub file_delay: Duration,

    /// Base delay for the consecutive-failure backoff.
    pub failure_base_delay: Duration,

    /// Cap for the consecutive-failure backoff.
    pub failure_max_delay: Duration,

    /// Age past which an in-progress digest is considered stale.
    pub stale_threshold: Duration,

    /// Interval between stale sweeps.
    pub stale_sweep_interval: Duration,

    /// Path prefixes never offered by file selection.
    pub excluded_path_prefixes: Vec<String>,

    /// Maximum paths pulled per selection query.
    pub selection_limit: i64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            start_delay: Duration::from_millis(10_000),
            idle_sleep: Duration::from_millis(1_000),
            file_delay: Duration::from_millis(1_000),
            failure_base_delay: Duration::from_millis(5_000),
            failure_max_delay: Duration::from_millis(60_000),
            stale_threshold: Duration::from_millis(600_000),
            stale_sweep_interval: Duration::from_millis(60_000),
            excluded_path_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            selection_limit: 25,
        }
    }
}

/// External gateway endpoints and shared request timeout.
///
/// A `None` base URL means the service is not deployed; digesters that need
/// it report not-applicable instead of failing.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub crawl_url: Option<String>,
    pub media_url: Option<String>,
    pub llm_url: Option<String>,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let data_root = match std::env::var("LIFEDB_DATA_ROOT") {
            Ok(path) if !path.trim().is_empty() => std::path::PathBuf::from(path),
            _ => dirs::data_dir()
                .map(|dir| dir.join("lifedb"))
                .unwrap_or_else(|| std::path::PathBuf::from("./data")),
        };

        std::fs::create_dir_all(&data_root)
            .with_context(|| format!("failed to create data root: {}", data_root.display()))?;

        let mut digest = DigestConfig {
            max_attempts: env_i64("LIFEDB_MAX_ATTEMPTS", 4)?,
            start_delay: env_duration_ms("LIFEDB_START_DELAY_MS", 10_000)?,
            idle_sleep: env_duration_ms("LIFEDB_IDLE_SLEEP_MS", 1_000)?,
            file_delay: env_duration_ms("LIFEDB_FILE_DELAY_MS", 1_000)?,
            failure_base_delay: env_duration_ms("LIFEDB_FAILURE_BASE_DELAY_MS", 5_000)?,
            failure_max_delay: env_duration_ms("LIFEDB_FAILURE_MAX_DELAY_MS", 60_000)?,
            stale_threshold: env_duration_ms("LIFEDB_STALE_THRESHOLD_MS", 600_000)?,
            stale_sweep_interval: env_duration_ms("LIFEDB_STALE_SWEEP_INTERVAL_MS", 60_000)?,
            ..DigestConfig::default()
        };

        if let Ok(extra) = std::env::var("LIFEDB_EXCLUDED_PATH_PREFIXES") {
            for prefix in extra.split(',') {
                let prefix = prefix.trim();
                if prefix.is_empty() {
                    continue;
                }
                let mut prefix = prefix.to_string();
                if !prefix.ends_with('/') {
                    prefix.push('/');
                }
                if !digest.excluded_path_prefixes.contains(&prefix) {
                    digest.excluded_path_prefixes.push(prefix);
                }
            }
        }

        if digest.max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "LIFEDB_MAX_ATTEMPTS must be at least 1".into(),
            )
            .into());
        }

        let gateways = GatewayConfig {
            crawl_url: env_url("LIFEDB_CRAWL_GATEWAY_URL"),
            media_url: env_url("LIFEDB_MEDIA_GATEWAY_URL"),
            llm_url: env_url("LIFEDB_LLM_GATEWAY_URL"),
            timeout: env_duration_ms("LIFEDB_GATEWAY_TIMEOUT_MS", 30_000)?,
        };

        Ok(Self {
            data_root,
            digest,
            gateways,
        })
    }

    /// The app's own metadata directory under the data root.
    pub fn app_dir(&self) -> std::path::PathBuf {
        self.data_root.join(".lifedb")
    }

    /// SQLite catalog path.
    pub fn catalog_path(&self) -> std::path::PathBuf {
        self.app_dir().join("catalog.db")
    }

    /// Blob store root directory.
    pub fn blob_root(&self) -> std::path::PathBuf {
        self.app_dir().join("blobs")
    }

    /// Log directory for the rolling file appender.
    pub fn log_dir(&self) -> std::path::PathBuf {
        self.app_dir().join("logs")
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

fn env_duration_ms(key: &str, default_ms: u64) -> Result<Duration> {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) => Ok(Duration::from_millis(ms)),
            Err(_) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }
            .into()),
        },
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

fn env_url(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}
