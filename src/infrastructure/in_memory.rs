use crate::domain::account::{Account, AccountId};
use crate::domain::challenge::{Challenge, ChallengeId, ChallengePurpose};
use crate::domain::ports::{AccountStore, ChallengeStore, LedgerBatch, LedgerStore, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
}

/// A thread-safe in-memory store for accounts and transactions.
///
/// Both maps sit behind one `RwLock` so a [`LedgerBatch`] becomes visible to
/// readers all at once. Ideal for tests and single-process runs where
/// durability is not required.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryLedgerStore {
    async fn store_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }
}

#[async_trait]
impl TransactionStore for InMemoryLedgerStore {
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn transactions_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut txs: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.created_at);
        Ok(txs)
    }

    async fn transactions_for_account(&self, account: AccountId) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut txs: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| tx.involves(account))
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    async fn transition_transaction(
        &self,
        expected: TransactionStatus,
        updated: Transaction,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.transactions.get_mut(&updated.id) {
            Some(current) if current.status == expected => {
                *current = updated;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let mut state = self.state.write().await;
        for account in batch.accounts {
            state.accounts.insert(account.id, account);
        }
        for tx in batch.transactions {
            state.transactions.insert(tx.id, tx);
        }
        Ok(())
    }
}

/// A thread-safe in-memory store for one-time challenges.
#[derive(Default, Clone)]
pub struct InMemoryChallengeStore {
    challenges: Arc<RwLock<HashMap<ChallengeId, Challenge>>>,
}

impl InMemoryChallengeStore {
    /// Creates a new, empty in-memory challenge store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn replace_active(&self, challenge: Challenge) -> Result<usize> {
        let mut challenges = self.challenges.write().await;
        let mut invalidated = 0;
        for existing in challenges.values_mut().filter(|c| {
            c.account == challenge.account && c.purpose == challenge.purpose && !c.consumed
        }) {
            existing.consumed = true;
            invalidated += 1;
        }
        challenges.insert(challenge.id, challenge);
        Ok(invalidated)
    }

    async fn consume_matching(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        code: &str,
        binding: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Challenge>> {
        let mut challenges = self.challenges.write().await;
        let matched = challenges.values_mut().find(|c| {
            c.account == account && c.purpose == purpose && c.accepts(code, binding, now)
        });
        Ok(matched.map(|c| {
            c.consumed = true;
            c.clone()
        }))
    }
}
