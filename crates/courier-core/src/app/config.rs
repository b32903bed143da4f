//! QueueConfig - キュー設定
//!
//! JSON ファイルから読み込み、欠けたフィールドはデフォルト値で埋める。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::{RetryPolicy, StoreSettings};

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on stored events; inserts beyond it evict.
    pub max_queue_size: usize,
    /// Safety-net wake-up period for the delivery loop.
    pub processing_interval_ms: u64,
    /// Delay after the first failure in a row.
    pub retry_interval_ms: u64,
    /// Automatic attempts per event before it becomes `failed`.
    pub max_retries: u32,
    /// Pause between two successful deliveries.
    pub success_delay_ms: u64,
    /// Upper bound on a single delivery call.
    pub delivery_timeout_ms: u64,
    /// Backoff growth per consecutive failure. 1.0 = fixed interval.
    pub retry_multiplier: f64,
    /// Backoff cap.
    pub max_retry_delay_ms: u64,
    /// Completed events kept for diagnostics.
    pub completed_retention: usize,
    /// Persistence namespace.
    pub storage_key: String,
    /// Destination URL for the HTTP delivery adapter.
    pub endpoint: Option<String>,
    /// Key consulted in health reports.
    pub service_name: String,
    /// Connectivity belief before any signal arrives.
    pub assume_online: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            processing_interval_ms: 5_000,
            retry_interval_ms: 10_000,
            max_retries: 5,
            success_delay_ms: 100,
            delivery_timeout_ms: 30_000,
            retry_multiplier: 1.0,
            max_retry_delay_ms: 300_000,
            completed_retention: 100,
            storage_key: "event_queue".to_string(),
            endpoint: None,
            service_name: "web".to_string(),
            assume_online: true,
        }
    }
}

/// ConfigError は設定の読み込み・検証エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl QueueConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Fail fast on values the queue cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("max_queue_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.processing_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "processing_interval_ms must be greater than 0".into(),
            ));
        }
        if self.delivery_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery_timeout_ms must be greater than 0".into(),
            ));
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry_multiplier must be a finite number >= 1.0, got {}",
                self.retry_multiplier
            )));
        }
        if self.max_retry_delay_ms < self.retry_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "max_retry_delay_ms ({}) is below retry_interval_ms ({})",
                self.max_retry_delay_ms, self.retry_interval_ms
            )));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_key must not be empty".into()));
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty".into()));
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint must be an http(s) URL, got {endpoint}"
                )));
            }
        }
        Ok(())
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            storage_key: self.storage_key.clone(),
            max_queue_size: self.max_queue_size,
            completed_retention: self.completed_retention,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
            success_delay: Duration::from_millis(self.success_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.processing_interval(), Duration::from_secs(5));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.storage_key, "event_queue");
        assert_eq!(config.service_name, "web");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            QueueConfig::from_json_str(r#"{ "max_retries": 3, "endpoint": "https://x.test/e" }"#)
                .unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.endpoint.as_deref(), Some("https://x.test/e"));
        assert_eq!(config.retry_interval_ms, 10_000);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "storage_key": "tenant_a" }}"#).unwrap();

        let config = QueueConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.storage_key, "tenant_a");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = QueueConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[rstest]
    #[case(r#"{ "max_queue_size": 0 }"#)]
    #[case(r#"{ "max_retries": 0 }"#)]
    #[case(r#"{ "processing_interval_ms": 0 }"#)]
    #[case(r#"{ "retry_multiplier": 0.5 }"#)]
    #[case(r#"{ "retry_interval_ms": 10, "max_retry_delay_ms": 5 }"#)]
    #[case(r#"{ "storage_key": " " }"#)]
    #[case(r#"{ "endpoint": "ftp://x" }"#)]
    fn invalid_values_are_rejected(#[case] raw: &str) {
        let config = QueueConfig::from_json_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
