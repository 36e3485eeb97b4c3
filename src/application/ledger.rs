use crate::domain::account::{Account, AccountId, Amount, BalanceChange};
use crate::domain::ports::{AccountStore, LedgerBatch, LedgerStoreRef};
use crate::domain::transaction::Transaction;
use crate::error::{LedgerError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

/// Owner of all account balances.
///
/// Balances change only inside a [`LedgerGuard`], which holds exclusive locks
/// on every account it touches. Locks are always taken in ascending
/// [`AccountId`] order, so two operations over overlapping account sets can
/// never wait on each other in a cycle.
pub struct BalanceLedger {
    store: LedgerStoreRef,
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl BalanceLedger {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &LedgerStoreRef {
        &self.store
    }

    /// Provisions a new account. Fails if the id is already taken.
    pub async fn open_account(&self, account: Account) -> Result<()> {
        let lock = self.lock_for(account.id).await;
        let _held = lock.lock_owned().await;
        if self.store.get_account(account.id).await?.is_some() {
            return Err(LedgerError::DuplicateAccount(account.id));
        }
        debug!(account = %account.id, owner = %account.owner, currency = %account.currency, "Opening account");
        self.store.store_account(account).await
    }

    /// Flips the active flag under the account lock.
    pub async fn set_active(&self, id: AccountId, active: bool) -> Result<()> {
        let mut guard = self.lock_accounts([id]).await?;
        let mut account = guard.snapshot(id)?.clone();
        account.active = active;
        guard.replace(account);
        self.commit(guard, Vec::new()).await
    }

    /// Unlocked read of an account. Suitable for validation, never for
    /// deciding a mutation.
    pub async fn account(&self, id: AccountId) -> Result<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.store.all_accounts().await
    }

    async fn lock_for(&self, id: AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    /// Forgets the lock of an id that turned out not to exist, unless another
    /// task still holds or awaits it.
    async fn prune_lock(&self, id: AccountId) {
        let mut locks = self.locks.lock().await;
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
            trace!(account = %id, "Account lock pruned");
        }
    }

    /// Acquires exclusive locks on every named account, in ascending id order,
    /// and snapshots their current state.
    ///
    /// Duplicate ids are collapsed. Every lock is released when the guard is
    /// dropped or committed, including on error paths.
    pub async fn lock_accounts(
        &self,
        ids: impl IntoIterator<Item = AccountId>,
    ) -> Result<LedgerGuard> {
        let ordered: BTreeSet<AccountId> = ids.into_iter().collect();
        let mut held = Vec::with_capacity(ordered.len());
        for id in &ordered {
            let lock = self.lock_for(*id).await;
            held.push(lock.lock_owned().await);
            trace!(account = %id, "Account lock acquired");
        }

        let mut accounts = BTreeMap::new();
        for id in ordered {
            match self.store.get_account(id).await? {
                Some(account) => {
                    accounts.insert(id, account);
                }
                None => {
                    drop(held);
                    self.prune_lock(id).await;
                    return Err(LedgerError::AccountNotFound(id));
                }
            }
        }

        Ok(LedgerGuard {
            accounts,
            dirty: BTreeSet::new(),
            _held: held,
        })
    }

    /// Persists every mutation staged on the guard together with `records`,
    /// as one atomic batch, then releases the locks.
    ///
    /// On error nothing is persisted and the locks are still released.
    pub async fn commit(&self, guard: LedgerGuard, records: Vec<Transaction>) -> Result<()> {
        let LedgerGuard {
            mut accounts,
            dirty,
            _held,
        } = guard;
        let batch = LedgerBatch {
            accounts: dirty
                .iter()
                .filter_map(|id| accounts.remove(id))
                .collect(),
            transactions: records,
        };
        debug!(
            accounts = batch.accounts.len(),
            records = batch.transactions.len(),
            "Committing ledger batch"
        );
        self.store.commit(batch).await
        // `_held` drops here, after the batch is durable.
    }
}

/// Scoped, exclusive access to a set of accounts.
///
/// Mutations are staged on in-guard copies and only become visible through
/// [`BalanceLedger::commit`]. Dropping the guard discards them.
pub struct LedgerGuard {
    accounts: BTreeMap<AccountId, Account>,
    dirty: BTreeSet<AccountId>,
    _held: Vec<OwnedMutexGuard<()>>,
}

impl LedgerGuard {
    fn snapshot_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::internal(format!("lock on {id} is not held")))
    }

    /// The staged state of a locked account.
    pub fn snapshot(&self, id: AccountId) -> Result<&Account> {
        self.accounts
            .get(&id)
            .ok_or_else(|| LedgerError::internal(format!("lock on {id} is not held")))
    }

    pub fn balance(&self, id: AccountId) -> Result<u64> {
        self.snapshot(id).map(|a| a.balance)
    }

    /// Ids covered by this guard, ascending.
    pub fn account_ids(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.accounts.keys().copied()
    }

    /// Removes `amount` from a locked account.
    ///
    /// Fails with `InsufficientFunds` if the balance is short; the staged
    /// balance is then left untouched.
    pub fn debit(&mut self, id: AccountId, amount: Amount) -> Result<BalanceChange> {
        let change = self.snapshot_mut(id)?.debit(amount)?;
        self.dirty.insert(id);
        Ok(change)
    }

    pub fn credit(&mut self, id: AccountId, amount: Amount) -> Result<BalanceChange> {
        let change = self.snapshot_mut(id)?.credit(amount)?;
        self.dirty.insert(id);
        Ok(change)
    }

    fn replace(&mut self, account: Account) {
        self.dirty.insert(account.id);
        self.accounts.insert(account.id, account);
    }
}
