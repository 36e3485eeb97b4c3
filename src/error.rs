use crate::domain::account::AccountId;
use thiserror::Error;

/// Errors surfaced by the ledger engine.
///
/// The first group is the caller-facing taxonomy: each variant is specific
/// enough for a client to re-prompt (e.g. re-enter a code) without restarting
/// the whole flow. The second group covers storage and input plumbing.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("Invalid or expired challenge code")]
    InvalidOrExpiredChallenge,
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("Account is inactive: {0}")]
    AccountInactive(AccountId),
    #[error("Compliance check blocked the operation: {0}")]
    ComplianceBlocked(String),
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountId),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<serde_yaml::Error> for LedgerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_display() {
        let err = LedgerError::InsufficientFunds {
            needed: 5000,
            available: 1200,
        };
        let msg = err.to_string();
        assert!(msg.contains("5000"));
        assert!(msg.contains("1200"));
    }

    #[test]
    fn test_io_conversion() {
        let err: LedgerError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, LedgerError::IoError(_)));
    }
}
