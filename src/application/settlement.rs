//! Settlement Worker
//!
//! Drives `processing` withdrawals and external transfers to a final status by
//! handing them to the payout provider registered for the destination
//! category. Records are finalized with a compare-and-set on their status, so
//! a record delivered twice (queue plus recovery scan) is finalized once.

use crate::config::SettlementConfig;
use crate::domain::destination::{DestinationId, PayoutCategory};
use crate::domain::ports::{
    DestinationDirectoryRef, LedgerStoreRef, PayoutOutcome, PayoutProviderRef, TransactionStore,
};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus, keys};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Payout providers keyed by the destination category they serve.
#[derive(Default, Clone)]
pub struct PayoutRouter {
    providers: HashMap<PayoutCategory, PayoutProviderRef>,
}

impl PayoutRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` for its own category, replacing any previous one.
    pub fn register(&mut self, provider: PayoutProviderRef) {
        self.providers.insert(provider.category(), provider);
    }

    pub fn with(mut self, provider: PayoutProviderRef) -> Self {
        self.register(provider);
        self
    }

    pub fn route(&self, category: PayoutCategory) -> Option<&PayoutProviderRef> {
        self.providers.get(&category)
    }
}

/// Producer side of the settlement queue, held by the orchestrator.
#[derive(Clone)]
pub struct SettlementQueue {
    sender: mpsc::Sender<TransactionId>,
}

impl SettlementQueue {
    /// Enqueues a record without waiting.
    ///
    /// A full or closed queue is not an error: the record stays `processing`
    /// and the next recovery scan picks it up.
    pub fn schedule(&self, id: TransactionId) -> bool {
        match self.sender.try_send(id) {
            Ok(()) => {
                debug!(transaction = %id, "Settlement scheduled");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(transaction = %id, "Settlement queue full; deferring to recovery scan");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(transaction = %id, "Settlement worker stopped; deferring to recovery scan");
                false
            }
        }
    }
}

pub fn settlement_channel(capacity: usize) -> (SettlementQueue, mpsc::Receiver<TransactionId>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (SettlementQueue { sender }, receiver)
}

enum PayoutResult {
    Paid { reference: String, attempts: u32 },
    Refused { reason: String, reference: Option<String>, attempts: u32 },
}

pub struct SettlementWorker {
    store: LedgerStoreRef,
    destinations: DestinationDirectoryRef,
    router: PayoutRouter,
    config: SettlementConfig,
}

impl SettlementWorker {
    pub fn new(
        store: LedgerStoreRef,
        destinations: DestinationDirectoryRef,
        router: PayoutRouter,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            destinations,
            router,
            config,
        }
    }

    /// Settles one record and returns its status afterwards.
    ///
    /// Records that are no longer `processing` are left alone.
    pub async fn settle(&self, id: TransactionId) -> Result<TransactionStatus> {
        let tx = self
            .store
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::internal(format!("transaction {id} not found")))?;

        if tx.status != TransactionStatus::Processing {
            debug!(transaction = %id, status = %tx.status, "Skipping settled transaction");
            return Ok(tx.status);
        }

        let result = self.pay_out(&tx).await?;
        let mut updated = tx;
        match result {
            PayoutResult::Paid {
                reference,
                attempts,
            } => {
                updated.status = TransactionStatus::Completed;
                updated.annotate(keys::PROVIDER_REFERENCE, reference);
                updated.annotate(keys::SETTLEMENT_ATTEMPTS, attempts);
            }
            PayoutResult::Refused {
                reason,
                reference,
                attempts,
            } => {
                updated.status = TransactionStatus::Failed;
                if let Some(reference) = reference {
                    updated.annotate(keys::PROVIDER_REFERENCE, reference);
                }
                updated.annotate(
                    keys::SETTLEMENT_ERROR,
                    LedgerError::SettlementFailed(reason).to_string(),
                );
                updated.annotate(keys::SETTLEMENT_ATTEMPTS, attempts);
            }
        }
        updated.processed_at = Some(Utc::now());
        let status = updated.status;

        if !self
            .store
            .transition_transaction(TransactionStatus::Processing, updated.clone())
            .await?
        {
            let current = self
                .store
                .get_transaction(id)
                .await?
                .map(|t| t.status)
                .unwrap_or(status);
            debug!(transaction = %id, status = %current, "Settlement already finalized elsewhere");
            return Ok(current);
        }

        match status {
            TransactionStatus::Failed => warn!(
                transaction = %id,
                reference = %updated.reference,
                amount = updated.amount,
                error = updated.annotation_str(keys::SETTLEMENT_ERROR).unwrap_or_default(),
                "Settlement failed; debited funds await manual reversal"
            ),
            _ => info!(
                transaction = %id,
                reference = %updated.reference,
                provider_reference = updated.annotation_str(keys::PROVIDER_REFERENCE).unwrap_or_default(),
                "Settlement completed"
            ),
        }
        Ok(status)
    }

    /// Storage errors propagate and leave the record `processing`.
    async fn pay_out(&self, tx: &Transaction) -> Result<PayoutResult> {
        let refused = |reason: String| PayoutResult::Refused {
            reason,
            reference: None,
            attempts: 0,
        };

        let Some(destination_id) = tx.annotation_u64(keys::DESTINATION_ID).map(DestinationId) else {
            return Ok(refused("record has no payout destination".to_string()));
        };
        let Some(destination) = self.destinations.get_destination(destination_id).await? else {
            return Ok(refused(format!("destination {destination_id} no longer exists")));
        };
        let Some(provider) = self.router.route(destination.category()) else {
            return Ok(refused(format!(
                "no payout provider registered for {}",
                destination.category()
            )));
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            debug!(transaction = %tx.id, attempt, category = %destination.category(), "Submitting payout");
            match provider
                .submit_payout(&destination, tx.amount, &tx.currency)
                .await
            {
                Ok(PayoutOutcome {
                    reference,
                    success: true,
                    ..
                }) => {
                    return Ok(PayoutResult::Paid {
                        reference,
                        attempts: attempt,
                    });
                }
                Ok(PayoutOutcome {
                    reference, error, ..
                }) => {
                    return Ok(PayoutResult::Refused {
                        reason: error.unwrap_or_else(|| "payout rejected by provider".to_string()),
                        reference: Some(reference),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(transaction = %tx.id, attempt, max_attempts, error = %e, "Payout provider unreachable");
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_backoff()).await;
                    }
                }
            }
        }

        Ok(PayoutResult::Refused {
            reason: format!("provider unreachable after {max_attempts} attempts: {last_error}"),
            reference: None,
            attempts: max_attempts,
        })
    }

    /// Settles every record still `processing` in storage.
    ///
    /// Run at startup so work accepted before a restart is not lost. Returns
    /// how many records reached a final status.
    pub async fn recover_pending(&self) -> Result<usize> {
        let pending = self
            .store
            .transactions_by_status(TransactionStatus::Processing)
            .await?;
        if pending.is_empty() {
            debug!("No pending settlements found");
            return Ok(0);
        }
        info!(count = pending.len(), "Recovering pending settlements");

        let mut finalized = 0;
        for tx in pending {
            match self.settle(tx.id).await {
                Ok(status) if status.is_final() => finalized += 1,
                Ok(_) => {}
                Err(e) => error!(transaction = %tx.id, error = %e, "Failed to settle transaction"),
            }
        }
        Ok(finalized)
    }

    /// Recovery scan, then settle queued ids until every sender is dropped.
    pub async fn run(&self, mut receiver: mpsc::Receiver<TransactionId>) {
        info!(
            max_attempts = self.config.max_attempts,
            retry_backoff_ms = self.config.retry_backoff_ms,
            "Starting settlement worker"
        );
        if let Err(e) = self.recover_pending().await {
            error!(error = %e, "Recovery scan failed");
        }
        while let Some(id) = receiver.recv().await {
            if let Err(e) = self.settle(id).await {
                error!(transaction = %id, error = %e, "Failed to settle transaction");
            }
        }
        info!("Settlement queue closed; worker stopping");
    }

    pub fn spawn(self: Arc<Self>, receiver: mpsc::Receiver<TransactionId>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(receiver).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountId, OwnerId};
    use crate::domain::destination::{DestinationAddress, WithdrawalDestination};
    use crate::domain::ports::{LedgerBatch, LedgerStore, PayoutProvider};
    use crate::domain::transaction::TransactionKind;
    use crate::infrastructure::collaborators::{
        InMemoryDestinationDirectory, SimulatedPayoutProvider,
    };
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bank_destination() -> WithdrawalDestination {
        WithdrawalDestination {
            id: DestinationId(7),
            owner: OwnerId(1),
            provider: "paystack".to_string(),
            address: DestinationAddress::Bank {
                account_name: "Ada".to_string(),
                account_number: "0123456789".to_string(),
                bank_code: "058".to_string(),
                bank_name: Some("GTBank".to_string()),
            },
            verified: true,
            is_default: true,
        }
    }

    async fn fixture(
        provider: PayoutProviderRef,
        max_attempts: u32,
    ) -> (SettlementWorker, Arc<InMemoryLedgerStore>, TransactionId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let directory = InMemoryDestinationDirectory::new();
        directory.register(bank_destination()).await;

        let mut tx = Transaction::new(
            OwnerId(1),
            TransactionKind::Withdrawal,
            TransactionStatus::Processing,
            2000,
            "NGN",
            "bank",
        );
        tx.source = Some(AccountId(1));
        tx.annotate(keys::DESTINATION_ID, 7u64);
        let id = tx.id;
        store
            .commit(LedgerBatch {
                accounts: Vec::new(),
                transactions: vec![tx],
            })
            .await
            .unwrap();

        let worker = SettlementWorker::new(
            store.clone(),
            Arc::new(directory),
            PayoutRouter::new().with(provider),
            SettlementConfig {
                max_attempts,
                retry_backoff_ms: 1,
                queue_capacity: 8,
            },
        );
        (worker, store, id)
    }

    #[tokio::test]
    async fn test_successful_payout_completes() {
        let provider = Arc::new(SimulatedPayoutProvider::succeeding(PayoutCategory::Bank));
        let (worker, store, id) = fixture(provider, 3).await;

        assert_eq!(worker.settle(id).await.unwrap(), TransactionStatus::Completed);
        let tx = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.annotation_str(keys::PROVIDER_REFERENCE).unwrap().starts_with("bank-"));
        assert!(tx.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_rejected_payout_fails_with_cause() {
        let provider = Arc::new(SimulatedPayoutProvider::rejecting(PayoutCategory::Bank, "account closed"));
        let (worker, store, id) = fixture(provider, 3).await;

        assert_eq!(worker.settle(id).await.unwrap(), TransactionStatus::Failed);
        let tx = store.get_transaction(id).await.unwrap().unwrap();
        assert!(tx.annotation_str(keys::SETTLEMENT_ERROR).unwrap().contains("account closed"));
    }

    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl PayoutProvider for FlakyProvider {
        fn category(&self) -> PayoutCategory {
            PayoutCategory::Bank
        }

        async fn submit_payout(
            &self,
            _destination: &WithdrawalDestination,
            _amount: u64,
            _currency: &str,
        ) -> Result<PayoutOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(LedgerError::internal("connection reset"));
            }
            Ok(PayoutOutcome {
                reference: format!("flaky-{call}"),
                success: true,
                error: None,
            })
        }
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 2,
        });
        let (worker, store, id) = fixture(provider.clone(), 3).await;

        assert_eq!(worker.settle(id).await.unwrap(), TransactionStatus::Completed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let tx = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(tx.annotation_u64(keys::SETTLEMENT_ATTEMPTS), Some(3));
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        });
        let (worker, _store, id) = fixture(provider.clone(), 2).await;

        assert_eq!(worker.settle(id).await.unwrap(), TransactionStatus::Failed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_settled_record_is_skipped() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 0,
        });
        let (worker, _store, id) = fixture(provider.clone(), 3).await;

        worker.settle(id).await.unwrap();
        assert_eq!(worker.settle(id).await.unwrap(), TransactionStatus::Completed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_provider_fails_record() {
        let provider = Arc::new(SimulatedPayoutProvider::succeeding(PayoutCategory::Crypto));
        let (worker, _store, id) = fixture(provider, 3).await;
        assert_eq!(worker.settle(id).await.unwrap(), TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_recovery_and_queue() {
        let provider = Arc::new(SimulatedPayoutProvider::succeeding(PayoutCategory::Bank));
        let (worker, store, id) = fixture(provider, 3).await;
        let worker = Arc::new(worker);

        let (queue, receiver) = settlement_channel(4);
        let handle = worker.clone().spawn(receiver);
        // Already settled by the startup scan; the queued id is a no-op.
        assert!(queue.schedule(id));
        drop(queue);
        handle.await.unwrap();

        let tx = store.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
    }
}
