use super::challenge_issuer::ChallengeIssuer;
use super::ledger::BalanceLedger;
use super::orchestrator::TransferOrchestrator;
use super::settlement::{PayoutRouter, SettlementWorker, settlement_channel};
use crate::config::EngineConfig;
use crate::domain::account::Account;
use crate::domain::fee::FeeCalculator;
use crate::domain::ports::{
    ChallengeDeliveryRef, ChallengeStoreRef, ComplianceGateRef, DestinationDirectoryRef,
    LedgerStoreRef,
};
use crate::domain::transaction::TransactionId;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// External collaborators the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub delivery: ChallengeDeliveryRef,
    pub compliance: ComplianceGateRef,
    pub destinations: DestinationDirectoryRef,
    pub payouts: PayoutRouter,
}

/// The assembled ledger engine.
///
/// Builds the ledger, issuer, orchestrator and settlement worker over the
/// given storage. Every component is injected; nothing is global.
pub struct LedgerEngine {
    orchestrator: Arc<TransferOrchestrator>,
    settlement: Arc<SettlementWorker>,
    receiver: Option<mpsc::Receiver<TransactionId>>,
}

impl LedgerEngine {
    /// Builds an engine that queues accepted payouts for the background
    /// worker started by [`LedgerEngine::start_settlement`].
    pub fn new(
        config: &EngineConfig,
        store: LedgerStoreRef,
        challenges: ChallengeStoreRef,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::build(config, store, challenges, collaborators, true)
    }

    /// Builds an engine with no settlement queue. Accepted payouts stay
    /// `processing` until [`LedgerEngine::drain_settlements`] runs.
    pub fn batch(
        config: &EngineConfig,
        store: LedgerStoreRef,
        challenges: ChallengeStoreRef,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Self::build(config, store, challenges, collaborators, false)
    }

    fn build(
        config: &EngineConfig,
        store: LedgerStoreRef,
        challenges: ChallengeStoreRef,
        collaborators: Collaborators,
        queued: bool,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = Arc::new(BalanceLedger::new(store.clone()));
        let issuer = Arc::new(ChallengeIssuer::new(challenges, config.challenge.clone())?);

        let mut orchestrator = TransferOrchestrator::new(
            ledger,
            issuer,
            FeeCalculator::new(config.fees.clone()),
            collaborators.compliance,
            collaborators.destinations.clone(),
            collaborators.delivery,
            config.deposits.clone(),
        );
        let receiver = if queued {
            let (queue, receiver) = settlement_channel(config.settlement.queue_capacity);
            orchestrator = orchestrator.with_settlement_queue(queue);
            Some(receiver)
        } else {
            None
        };

        let settlement = SettlementWorker::new(
            store,
            collaborators.destinations,
            collaborators.payouts,
            config.settlement.clone(),
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            settlement: Arc::new(settlement),
            receiver,
        })
    }

    pub fn orchestrator(&self) -> &Arc<TransferOrchestrator> {
        &self.orchestrator
    }

    pub fn settlement(&self) -> &Arc<SettlementWorker> {
        &self.settlement
    }

    /// Starts the background settlement task. Returns `None` if it is
    /// already running or the engine was built with [`LedgerEngine::batch`].
    pub fn start_settlement(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        let receiver = self.receiver.take()?;
        Some(self.settlement.clone().spawn(receiver))
    }

    /// Settles everything still `processing` in the calling task.
    pub async fn drain_settlements(&self) -> Result<usize> {
        self.settlement.recover_pending().await
    }

    /// Final state of every account, by id.
    pub async fn into_results(self) -> Result<Vec<Account>> {
        self.orchestrator.ledger().accounts().await
    }
}
