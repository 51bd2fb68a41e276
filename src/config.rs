use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "kyc-moderation";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,kyc_moderation=debug,reqwest=warn,hyper=warn"
}

/// Get the application data directory (~/.local/share/kyc-moderation on Linux).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default moderation database location.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("moderation.db")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Connection settings for the external recognition provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub access_token: String,
    /// Connect timeout for the underlying HTTP client.
    pub connect_timeout: Duration,
}

/// Bounded retry for transient provider faults.
///
/// `max_attempts` counts the first call, so 3 means one call plus two retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: u32,
    pub max_delay: Duration,
    /// Deadline applied to each individual attempt.
    pub call_timeout: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Longest one provider operation can take: every attempt hitting its
    /// deadline plus every backoff sleep in between.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        (1..attempts).fold(self.call_timeout.saturating_mul(attempts), |total, attempt| {
            total.saturating_add(self.delay_after(attempt))
        })
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum moderation runs executing at once.
    pub concurrency: usize,
    /// Jobs waiting for a worker before `submit` applies backpressure.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 64,
        }
    }
}

/// Full engine configuration.
///
/// The face-match threshold and retry bounds have no built-in default:
/// they are product decisions and must be supplied explicitly.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
    pub face_match_threshold: f32,
    pub workers: WorkerConfig,
    pub database_path: PathBuf,
}

impl ModerationConfig {
    /// Load configuration from `MODERATION_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let base_url = required("MODERATION_PROVIDER_URL")?;
        let access_token = required("MODERATION_PROVIDER_TOKEN")?;

        let face_match_threshold: f32 = parse("MODERATION_FACE_THRESHOLD", &required("MODERATION_FACE_THRESHOLD")?)?;
        if !(0.0..=1.0).contains(&face_match_threshold) {
            return Err(ConfigError::Invalid {
                key: "MODERATION_FACE_THRESHOLD",
                value: face_match_threshold.to_string(),
            });
        }

        let max_attempts: u32 = parse("MODERATION_RETRY_ATTEMPTS", &required("MODERATION_RETRY_ATTEMPTS")?)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MODERATION_RETRY_ATTEMPTS",
                value: "0".into(),
            });
        }
        let delay_ms: u64 = parse("MODERATION_RETRY_DELAY_MS", &required("MODERATION_RETRY_DELAY_MS")?)?;

        let optional = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_delay_ms: u64 = match optional("MODERATION_RETRY_MAX_DELAY_MS") {
            Some(v) => parse("MODERATION_RETRY_MAX_DELAY_MS", &v)?,
            None => delay_ms.saturating_mul(8),
        };
        let call_timeout_secs: u64 = match optional("MODERATION_CALL_TIMEOUT_SECS") {
            Some(v) => parse("MODERATION_CALL_TIMEOUT_SECS", &v)?,
            None => 30,
        };

        let mut workers = WorkerConfig::default();
        if let Some(v) = optional("MODERATION_WORKERS") {
            workers.concurrency = parse("MODERATION_WORKERS", &v)?;
        }
        if let Some(v) = optional("MODERATION_QUEUE_CAPACITY") {
            workers.queue_capacity = parse("MODERATION_QUEUE_CAPACITY", &v)?;
        }
        if workers.concurrency == 0 || workers.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "MODERATION_WORKERS",
                value: format!("{}/{}", workers.concurrency, workers.queue_capacity),
            });
        }

        let database_path = optional("MODERATION_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        Ok(Self {
            provider: ProviderConfig {
                base_url,
                access_token,
                connect_timeout: Duration::from_secs(10),
            },
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(delay_ms),
                backoff_multiplier: 2,
                max_delay: Duration::from_millis(max_delay_ms),
                call_timeout: Duration::from_secs(call_timeout_secs),
            },
            face_match_threshold,
            workers,
            database_path,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MODERATION_PROVIDER_URL", "https://recognition.example"),
            ("MODERATION_PROVIDER_TOKEN", "secret"),
            ("MODERATION_FACE_THRESHOLD", "0.75"),
            ("MODERATION_RETRY_ATTEMPTS", "3"),
            ("MODERATION_RETRY_DELAY_MS", "200"),
        ]
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let config = ModerationConfig::from_lookup(env(&minimal())).unwrap();
        assert_eq!(config.provider.base_url, "https://recognition.example");
        assert_eq!(config.face_match_threshold, 0.75);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(200));
        assert_eq!(config.retry.max_delay, Duration::from_millis(1600));
        assert_eq!(config.retry.call_timeout, Duration::from_secs(30));
        assert_eq!(config.workers.concurrency, 4);
        assert!(config.database_path.ends_with("moderation.db"));
    }

    #[test]
    fn threshold_is_required() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "MODERATION_FACE_THRESHOLD")
            .collect();
        let err = ModerationConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MODERATION_FACE_THRESHOLD")));
    }

    #[test]
    fn retry_bounds_are_required() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "MODERATION_RETRY_ATTEMPTS")
            .collect();
        let err = ModerationConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MODERATION_RETRY_ATTEMPTS")));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "MODERATION_FACE_THRESHOLD");
        pairs.push(("MODERATION_FACE_THRESHOLD", "1.5"));
        let err = ModerationConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MODERATION_FACE_THRESHOLD", .. }));
    }

    #[test]
    fn rejects_unparseable_number() {
        let mut pairs = minimal();
        pairs.push(("MODERATION_WORKERS", "many"));
        let err = ModerationConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MODERATION_WORKERS", .. }));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2,
            max_delay: Duration::from_millis(350),
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
    }

    #[test]
    fn worst_case_includes_backoff_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff_multiplier: 2,
            max_delay: Duration::from_secs(3),
            call_timeout: Duration::from_secs(1),
        };
        // 3 attempts x 1 s, then sleeps of 2 s and 3 s (capped)
        assert_eq!(policy.worst_case(), Duration::from_secs(8));

        let single = RetryPolicy { max_attempts: 1, ..policy };
        assert_eq!(single.worst_case(), Duration::from_secs(1));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
