//! Runtime configuration.
//!
//! Everything is environment-driven with sensible defaults so the crate
//! works against a local mock backend with nothing but `BREWLINE_API_URL`
//! set. A `.env` file is honored in development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default polling cadence for the live order list.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// How long after a user action the next scheduled poll is skipped, giving
/// the backend time to persist before we fetch again.
const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(6);
/// Generous request timeout to tolerate a cold-starting backend.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(750);

#[derive(Debug, Clone)]
pub struct Config {
    /// Dashboard base URL, e.g. `https://dash.brewline.app`.
    pub base_url: String,
    /// Path of the SQLite overlay cache.
    pub cache_path: PathBuf,
    pub poll_interval: Duration,
    pub suppression_window: Duration,
    pub request_timeout: Duration,
    /// Attempts per remote call for retriable failures.
    pub max_retries: u32,
    /// Base delay for linear backoff (attempt N waits N * retry_delay).
    pub retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = env::var("BREWLINE_API_URL")
            .map_err(|_| anyhow::anyhow!("BREWLINE_API_URL is not set"))?;

        let cache_path = env::var("BREWLINE_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("brewline-admin.db"));

        Ok(Self {
            base_url,
            cache_path,
            poll_interval: secs_var("BREWLINE_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL),
            suppression_window: secs_var("BREWLINE_SUPPRESSION_SECS", DEFAULT_SUPPRESSION_WINDOW),
            request_timeout: secs_var("BREWLINE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT),
            max_retries: env::var("BREWLINE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: env::var("BREWLINE_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            cache_path: PathBuf::from("brewline-admin.db"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "BREWLINE_API_URL",
            "BREWLINE_CACHE_PATH",
            "BREWLINE_POLL_INTERVAL_SECS",
            "BREWLINE_SUPPRESSION_SECS",
            "BREWLINE_REQUEST_TIMEOUT_SECS",
            "BREWLINE_MAX_RETRIES",
            "BREWLINE_RETRY_DELAY_MS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_base_url() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("BREWLINE_API_URL", "https://dash.example");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.base_url, "https://dash.example");
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.suppression_window, Duration::from_secs(6));
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_retries, 3);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("BREWLINE_API_URL", "https://dash.example");
        env::set_var("BREWLINE_POLL_INTERVAL_SECS", "10");
        env::set_var("BREWLINE_MAX_RETRIES", "5");
        env::set_var("BREWLINE_RETRY_DELAY_MS", "100");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(10));
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.retry_delay, Duration::from_millis(100));

        clear_env();
    }
}
