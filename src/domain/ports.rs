//! Storage ports and external collaborator contracts.
//!
//! The application layer only talks to these traits; concrete adapters live in
//! `crate::infrastructure`.

use super::account::{Account, AccountId};
use super::challenge::{Challenge, ChallengePurpose};
use super::destination::{DestinationId, PayoutCategory, WithdrawalDestination};
use super::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts or replaces an account outside of any ledger batch.
    async fn store_account(&self, account: Account) -> Result<()>;
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;
    async fn all_accounts(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn transactions_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>>;
    /// All records touching the account, newest first.
    async fn transactions_for_account(&self, account: AccountId) -> Result<Vec<Transaction>>;
    /// Replaces the record only if its stored status is still `expected`.
    ///
    /// Returns `false` when another writer got there first.
    async fn transition_transaction(
        &self,
        expected: TransactionStatus,
        updated: Transaction,
    ) -> Result<bool>;
}

/// Accounts and transactions changed together by one ledger commit.
#[derive(Debug, Default, Clone)]
pub struct LedgerBatch {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

/// Combined account/transaction storage with an atomic multi-record commit.
#[async_trait]
pub trait LedgerStore: AccountStore + TransactionStore {
    /// Persists every record in the batch, or none of them.
    async fn commit(&self, batch: LedgerBatch) -> Result<()>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Marks every unconsumed challenge for the same (account, purpose) as
    /// consumed and stores `challenge`, as one atomic step.
    ///
    /// Returns how many prior challenges were invalidated.
    async fn replace_active(&self, challenge: Challenge) -> Result<usize>;

    /// Atomically finds a live challenge accepting the submission, marks it
    /// consumed and returns it. Changes nothing when no challenge matches.
    async fn consume_matching(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        code: &str,
        binding: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Challenge>>;
}

/// Out-of-band delivery of one-time codes (email, SMS, ...).
#[async_trait]
pub trait ChallengeDelivery: Send + Sync {
    /// Returns `false` when delivery failed. Failure never undoes issuance.
    async fn deliver(&self, account: AccountId, code: &str, purpose: ChallengePurpose) -> bool;
}

/// KYC / compliance gate consulted before money moves.
#[async_trait]
pub trait ComplianceGate: Send + Sync {
    async fn can_transact(&self, account: &Account) -> bool;
    /// Largest single amount allowed, in minor units. `None` means unlimited.
    async fn transaction_ceiling(&self, account: &Account) -> Option<u64>;
}

/// Read-only view of customer-registered payout destinations.
#[async_trait]
pub trait DestinationDirectory: Send + Sync {
    async fn get_destination(&self, id: DestinationId) -> Result<Option<WithdrawalDestination>>;
}

/// Result reported by a payout provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutOutcome {
    pub reference: String,
    pub success: bool,
    pub error: Option<String>,
}

/// One implementation per destination category.
///
/// `Err` means the provider could not be reached and the call may be retried;
/// `Ok` with `success == false` is a definitive rejection.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    fn category(&self) -> PayoutCategory;

    async fn submit_payout(
        &self,
        destination: &WithdrawalDestination,
        amount: u64,
        currency: &str,
    ) -> Result<PayoutOutcome>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type ChallengeStoreRef = Arc<dyn ChallengeStore>;
pub type ChallengeDeliveryRef = Arc<dyn ChallengeDelivery>;
pub type ComplianceGateRef = Arc<dyn ComplianceGate>;
pub type DestinationDirectoryRef = Arc<dyn DestinationDirectory>;
pub type PayoutProviderRef = Arc<dyn PayoutProvider>;
