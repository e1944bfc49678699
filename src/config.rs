//! Ledger configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for posting, numbering and commit retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Attempts per operation when storage reports a commit conflict
    pub max_attempts: u32,
    /// Backoff before the second attempt, doubled on each further attempt
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single backoff
    pub retry_max_delay_ms: u64,
    /// Number of decimal places allowed on amounts (minor units)
    pub amount_scale: i64,
    /// Zero-padded width of sub-ledger transaction numbers
    pub number_width: usize,
    /// Appended to an entry id to form the id of its reversal
    pub reversal_suffix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 200,
            amount_scale: 2,
            number_width: 6,
            reversal_suffix: "-REV".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from `LEDGER_*` environment variables, falling
    /// back to the defaults for anything unset
    pub fn from_env() -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(::config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Bounded exponential backoff for commit conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.amount_scale, 2);
        assert_eq!(config.reversal_suffix, "-REV");
        assert_eq!(config.retry_policy().max_attempts, 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(4), Duration::from_millis(50));
        assert_eq!(policy.delay_for(30), Duration::from_millis(50));
    }

    #[test]
    fn test_from_env_overrides_defaults() {
        std::env::set_var("LEDGER_NUMBER_WIDTH", "4");
        std::env::set_var("LEDGER_REVERSAL_SUFFIX", "-R");
        let config = LedgerConfig::from_env().unwrap();
        std::env::remove_var("LEDGER_NUMBER_WIDTH");
        std::env::remove_var("LEDGER_REVERSAL_SUFFIX");

        assert_eq!(config.number_width, 4);
        assert_eq!(config.reversal_suffix, "-R");
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let config = LedgerConfig {
            max_attempts: 0,
            ..LedgerConfig::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
