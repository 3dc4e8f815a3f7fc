//! Harness configuration

use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for the platform API under test
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Base URL of the platform (scheme, host, port)
    pub base_url: String,

    /// Prefix prepended to every API path, e.g. "/api"
    pub api_prefix: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Health endpoint probed before a suite runs (None = skip the probe)
    pub health_path: Option<String>,

    /// How long to wait for the health endpoint to answer
    pub startup_timeout: Duration,

    /// Default polling behaviour for orchestration jobs
    pub poll: PollConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_prefix: String::new(),
            request_timeout: Duration::from_secs(30),
            health_path: Some("/health".to_string()),
            startup_timeout: Duration::from_secs(30),
            poll: PollConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `VIDASEGURA_E2E_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("VIDASEGURA_E2E_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(prefix) = std::env::var("VIDASEGURA_E2E_API_PREFIX") {
            config.api_prefix = prefix;
        }
        if let Some(secs) = std::env::var("VIDASEGURA_E2E_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(path) = std::env::var("VIDASEGURA_E2E_HEALTH_PATH") {
            config.health_path = if path.is_empty() { None } else { Some(path) };
        }

        config
    }

    /// Resolve a path or absolute URL against the base URL.
    ///
    /// Absolute URLs (such as redirect targets) are returned untouched.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            normalize_path(path)
        )
    }

    /// Resolve an API path, applying the configured prefix
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let prefix = self.api_prefix.trim_end_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            normalize_path(prefix)
        };
        self.url(&format!("{}{}", prefix, normalize_path(path)))
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Polling behaviour for asynchronous orchestration jobs
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Fixed delay between status checks
    pub interval: Duration,

    /// Hard ceiling on total wait
    pub max_wait: Duration,

    /// Extra status checks after a terminal state to confirm it holds
    pub settle_checks: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
            settle_checks: 0,
        }
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub harness: HarnessConfig,
    pub scenarios_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}
