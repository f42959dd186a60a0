//! Configuration management for the sync client.

use std::env;
use std::time::Duration;

/// Sync configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after a local edit before pending edits are submitted
    pub flush_delay: Duration,
    /// Wait before each rejoin attempt; the last entry repeats
    pub rejoin_backoff: Vec<Duration>,
    /// Rejoin attempts before a document gives up and detaches
    pub max_rejoin_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_delay: Duration::from_millis(100),
            rejoin_backoff: [3, 8, 15, 25, 40]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            max_rejoin_attempts: 5,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load a `.env` file if there is one, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build the configuration from a key lookup, falling back to defaults
    /// for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("TANDEM_FLUSH_DELAY_MS") {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidFlushDelay(raw.clone()))?;
            config.flush_delay = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("TANDEM_REJOIN_BACKOFF_SECS") {
            let backoff = raw
                .split(',')
                .map(|part| part.trim().parse::<u64>().map(Duration::from_secs))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigError::InvalidBackoff(raw.clone()))?;
            config.rejoin_backoff = backoff;
        }

        if let Some(raw) = lookup("TANDEM_MAX_REJOIN_ATTEMPTS") {
            let attempts: u32 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidMaxAttempts(raw.clone()))?;
            if attempts == 0 {
                return Err(ConfigError::InvalidMaxAttempts(raw));
            }
            config.max_rejoin_attempts = attempts;
        }

        Ok(config)
    }

    /// Wait before rejoin attempt `attempt` (1-based), clamped to the last
    /// configured step.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) - 1) as usize;
        self.rejoin_backoff
            .get(index)
            .or_else(|| self.rejoin_backoff.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid TANDEM_FLUSH_DELAY_MS value: {0}")]
    InvalidFlushDelay(String),

    #[error("Invalid TANDEM_REJOIN_BACKOFF_SECS value: {0}")]
    InvalidBackoff(String),

    #[error("Invalid TANDEM_MAX_REJOIN_ATTEMPTS value: {0}")]
    InvalidMaxAttempts(String),
}
