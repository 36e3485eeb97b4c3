use crate::domain::fee::FeeSchedule;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One-time challenge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub ttl_secs: u64,
    pub code_length: u32,
}

impl ChallengeConfig {
    /// Codes are 4 to 10 digits.
    pub fn validate(&self) -> Result<()> {
        if !(4..=10).contains(&self.code_length) {
            return Err(LedgerError::Config(format!(
                "challenge.code_length must be between 4 and 10, got {}",
                self.code_length
            )));
        }
        Ok(())
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            code_length: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositConfig {
    /// Deposits at or above this amount (minor units) need a challenge.
    pub large_deposit_threshold: u64,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            large_deposit_threshold: 500_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Provider calls per transaction before it is marked failed.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub queue_capacity: usize,
}

impl SettlementConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 500,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level engine configuration.
///
/// Every section has defaults, so an empty YAML document is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub challenge: ChallengeConfig,
    pub fees: FeeSchedule,
    pub deposits: DepositConfig,
    pub settlement: SettlementConfig,
    pub logging: LogConfig,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.challenge.validate()?;
        if self.settlement.max_attempts == 0 {
            return Err(LedgerError::Config(
                "settlement.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.settlement.queue_capacity == 0 {
            return Err(LedgerError::Config(
                "settlement.queue_capacity must be at least 1".to_string(),
            ));
        }
        self.fees.validate().map_err(LedgerError::Config)
    }
}
