use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger account identifier.
///
/// Identifiers are totally ordered; the ledger relies on that order to acquire
/// multi-account locks without deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

/// Reference to the authenticated customer that owns accounts and destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner:{}", self.0)
    }
}

/// A strictly positive amount in minor currency units (e.g. cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(LedgerError::ValidationError(
                "Amount must be greater than zero".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Adds a fee on top of the amount, failing on overflow.
    pub fn checked_add(self, extra: u64) -> Result<Self> {
        self.0
            .checked_add(extra)
            .map(Self)
            .ok_or_else(|| LedgerError::ValidationError("Amount overflow".to_string()))
    }
}

impl TryFrom<u64> for Amount {
    type Error = LedgerError;

    fn try_from(value: u64) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance of one account before and after a single mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: u64,
    pub after: u64,
}

/// A customer account held in the ledger.
///
/// The balance is only ever changed through a ledger guard; see
/// [`crate::application::ledger::LedgerGuard`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub owner: OwnerId,
    /// ISO-4217 style code, e.g. "NGN" or "USD".
    pub currency: String,
    /// Balance in minor units. Never negative by construction.
    pub balance: u64,
    pub active: bool,
}

impl Account {
    pub fn new(id: AccountId, owner: OwnerId, currency: impl Into<String>) -> Self {
        Self {
            id,
            owner,
            currency: currency.into(),
            balance: 0,
            active: true,
        }
    }

    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }

    pub(crate) fn debit(&mut self, amount: Amount) -> Result<BalanceChange> {
        if !self.active {
            return Err(LedgerError::AccountInactive(self.id));
        }
        let before = self.balance;
        let after = before
            .checked_sub(amount.value())
            .ok_or(LedgerError::InsufficientFunds {
                needed: amount.value(),
                available: before,
            })?;
        self.balance = after;
        Ok(BalanceChange { before, after })
    }

    pub(crate) fn credit(&mut self, amount: Amount) -> Result<BalanceChange> {
        if !self.active {
            return Err(LedgerError::AccountInactive(self.id));
        }
        let before = self.balance;
        let after = before
            .checked_add(amount.value())
            .ok_or_else(|| LedgerError::internal(format!("balance overflow on {}", self.id)))?;
        self.balance = after;
        Ok(BalanceChange { before, after })
    }
}
