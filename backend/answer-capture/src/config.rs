use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::utils::retry::RetryConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub autosave: AutosaveSettings,
    pub retry: RetrySettings,
    pub submission: SubmissionSettings,
    pub storage: StorageSettings,
    pub connectivity: ConnectivitySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveSettings {
    pub debounce_ms: u64,
    pub interval_ms: u64,
    pub status_reset_ms: u64,
    /// Attempt budget when a save is forced through the retry controller.
    pub max_attempts: usize,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            interval_ms: 30_000,
            status_reset_ms: 3000,
            max_attempts: 3,
        }
    }
}

impl AutosaveSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn status_reset(&self) -> Duration {
        Duration::from_millis(self.status_reset_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
    /// Application-level retry delay when the endpoint gives no hint.
    pub default_retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            jitter_ms: 0,
            default_retry_delay_ms: 3000,
        }
    }
}

impl RetrySettings {
    pub fn submission_retry(&self) -> RetryConfig {
        self.retry_config(self.max_attempts)
    }

    pub fn retry_config(&self, max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter_max: (self.jitter_ms > 0).then(|| Duration::from_millis(self.jitter_ms)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmissionSettings {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 15_000,
        }
    }
}

impl SubmissionSettings {
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = self
            .url
            .as_deref()
            .context("submission.url is not configured")?;
        let url = Url::parse(raw).context("Invalid submission endpoint URL")?;
        if url.scheme() != "https" && url.scheme() != "http" {
            bail!(
                "Invalid submission endpoint scheme: {}. Must be http or https.",
                url.scheme()
            );
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub dir: PathBuf,
    pub key_prefix: String,
    pub max_item_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".drafts"),
            key_prefix: "quiz_draft_".to_string(),
            max_item_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivitySettings {
    pub health_url: Option<String>,
    pub probe_interval_ms: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            health_url: None,
            probe_interval_ms: 5000,
        }
    }
}

impl ConnectivitySettings {
    pub fn health_endpoint(&self) -> Result<Option<Url>> {
        self.health_url
            .as_deref()
            .map(|raw| Url::parse(raw).context("Invalid connectivity health URL"))
            .transpose()
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl CaptureConfig {
    pub fn load() -> Result<Self> {
        // .env is optional; explicit environment variables still win
        dotenvy::dotenv().ok();

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("CAPTURE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build capture configuration")?;

        let config: CaptureConfig = settings
            .try_deserialize()
            .context("Failed to deserialize capture configuration")?;

        config.validate()?;

        tracing::info!(
            env = %env,
            debounce_ms = config.autosave.debounce_ms,
            interval_ms = config.autosave.interval_ms,
            max_attempts = config.retry.max_attempts,
            "Capture configuration loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.autosave.max_attempts == 0 {
            bail!("autosave.max_attempts must be at least 1");
        }
        if self.autosave.interval_ms == 0 {
            bail!("autosave.interval_ms must be positive");
        }
        if self.storage.key_prefix.is_empty() {
            bail!("storage.key_prefix must not be empty");
        }
        if self.submission.url.is_some() {
            self.submission.endpoint_url()?;
        }
        if self.connectivity.probe_interval_ms == 0 {
            bail!("connectivity.probe_interval_ms must be positive");
        }
        self.connectivity.health_endpoint()?;
        Ok(())
    }
}
