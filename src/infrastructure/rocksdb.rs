use crate::domain::account::{Account, AccountId};
use crate::domain::challenge::{Challenge, ChallengePurpose};
use crate::domain::ports::{AccountStore, ChallengeStore, LedgerBatch, LedgerStore, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing the transaction ledger.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for storing one-time challenges.
pub const CF_CHALLENGES: &str = "challenges";

/// A persistent store implementation using RocksDB.
///
/// Accounts, transactions and challenges live in separate Column Families.
/// Ledger commits go through a single `WriteBatch`, so a crash can never leave
/// a debit without its matching credit or record.
///
/// Read-modify-write operations (challenge replacement and consumption,
/// settlement transitions) are serialized through `write_lock`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ACCOUNTS, CF_TRANSACTIONS, CF_CHALLENGES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn put_transaction(&self, batch: &mut WriteBatch, tx: &Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        batch.put_cf(cf, tx.id.0.as_bytes(), serde_json::to_vec(tx)?);
        Ok(())
    }

    fn put_challenge(&self, batch: &mut WriteBatch, challenge: &Challenge) -> Result<()> {
        let cf = self.cf(CF_CHALLENGES)?;
        batch.put_cf(cf, challenge.id.0.as_bytes(), serde_json::to_vec(challenge)?);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn store_account(&self, account: Account) -> Result<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db
            .put_cf(cf, account.id.0.to_be_bytes(), serde_json::to_vec(&account)?)?;
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.read(CF_ACCOUNTS, &id.0.to_be_bytes())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        // Big-endian keys iterate in ascending id order.
        self.scan(CF_ACCOUNTS)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.read(CF_TRANSACTIONS, id.0.as_bytes())
    }

    async fn transactions_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .scan::<Transaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|tx| tx.status == status)
            .collect();
        txs.sort_by_key(|tx| tx.created_at);
        Ok(txs)
    }

    async fn transactions_for_account(&self, account: AccountId) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .scan::<Transaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|tx| tx.involves(account))
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    async fn transition_transaction(
        &self,
        expected: TransactionStatus,
        updated: Transaction,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current: Option<Transaction> = self.read(CF_TRANSACTIONS, updated.id.0.as_bytes())?;
        match current {
            Some(current) if current.status == expected => {
                let mut batch = WriteBatch::default();
                self.put_transaction(&mut batch, &updated)?;
                self.db.write(batch)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let accounts_cf = self.cf(CF_ACCOUNTS)?;
        let mut write = WriteBatch::default();
        for account in &batch.accounts {
            write.put_cf(
                accounts_cf,
                account.id.0.to_be_bytes(),
                serde_json::to_vec(account)?,
            );
        }
        for tx in &batch.transactions {
            self.put_transaction(&mut write, tx)?;
        }
        self.db.write(write)?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for RocksDBStore {
    async fn replace_active(&self, challenge: Challenge) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        let mut invalidated = 0;
        for mut existing in self.scan::<Challenge>(CF_CHALLENGES)? {
            if existing.account == challenge.account
                && existing.purpose == challenge.purpose
                && !existing.consumed
            {
                existing.consumed = true;
                self.put_challenge(&mut batch, &existing)?;
                invalidated += 1;
            }
        }
        self.put_challenge(&mut batch, &challenge)?;
        self.db.write(batch)?;
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
        let _guard = self.write_lock.lock().await;
        let matched = self
            .scan::<Challenge>(CF_CHALLENGES)?
            .into_iter()
            .find(|c| c.account == account && c.purpose == purpose && c.accepts(code, binding, now));

        match matched {
            Some(mut challenge) => {
                challenge.consumed = true;
                let mut batch = WriteBatch::default();
                self.put_challenge(&mut batch, &challenge)?;
                self.db.write(batch)?;
                Ok(Some(challenge))
            }
            None => Ok(None),
        }
    }
}
