use super::account::{AccountId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Withdrawal,
    Deposit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transfer => "transfer",
            Self::Withdrawal => "withdrawal",
            Self::Deposit => "deposit",
        };
        f.write_str(s)
    }
}

/// Persisted transaction status.
///
/// `pending` exists only before a record is written (between initiate and
/// confirm), so it has no variant here.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Well-known annotation keys.
pub mod keys {
    pub const BALANCE_BEFORE: &str = "balance_before";
    pub const BALANCE_AFTER: &str = "balance_after";
    pub const COUNTERPARTY_BALANCE_BEFORE: &str = "counterparty_balance_before";
    pub const COUNTERPARTY_BALANCE_AFTER: &str = "counterparty_balance_after";
    pub const FEE: &str = "fee";
    pub const TOTAL_DEBIT: &str = "total_debit";
    pub const DESTINATION_ID: &str = "destination_id";
    pub const DESTINATION_CATEGORY: &str = "destination_category";
    pub const DESCRIPTION: &str = "description";
    pub const EXTERNAL_REFERENCE: &str = "external_reference";
    pub const PROVIDER_REFERENCE: &str = "provider_reference";
    pub const SETTLEMENT_ERROR: &str = "settlement_error";
    pub const SETTLEMENT_ATTEMPTS: &str = "settlement_attempts";
}

/// Free-form structured annotations attached to a transaction.
pub type Annotations = BTreeMap<String, Value>;

/// An immutable ledger entry.
///
/// Written once at confirm time. Afterwards only the settlement transition
/// may touch `status`, `processed_at` and the settlement annotations.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    /// Globally unique, caller-visible reference token.
    pub reference: String,
    pub owner: OwnerId,
    pub source: Option<AccountId>,
    /// Absent for external transfers and withdrawals.
    pub destination: Option<AccountId>,
    pub amount: u64,
    pub currency: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Method or category tag: "internal", "bank", "crypto", ...
    pub method: String,
    pub annotations: Annotations,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        owner: OwnerId,
        kind: TransactionKind,
        status: TransactionStatus,
        amount: u64,
        currency: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        let id = TransactionId::new();
        let now = Utc::now();
        Self {
            id,
            reference: format!("txn_{}", id.0.simple()),
            owner,
            source: None,
            destination: None,
            amount,
            currency: currency.into(),
            kind,
            status,
            method: method.into(),
            annotations: Annotations::new(),
            created_at: now,
            processed_at: status.is_final().then_some(now),
        }
    }

    pub fn annotate(&mut self, key: &str, value: impl Into<Value>) {
        self.annotations.insert(key.to_string(), value.into());
    }

    pub fn annotation_u64(&self, key: &str) -> Option<u64> {
        self.annotations.get(key).and_then(Value::as_u64)
    }

    pub fn annotation_str(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).and_then(Value::as_str)
    }

    /// Whether this record touches the given account on either side.
    pub fn involves(&self, account: AccountId) -> bool {
        self.source == Some(account) || self.destination == Some(account)
    }
}
