#![allow(dead_code)]

use custody_ledger::application::engine::{Collaborators, LedgerEngine};
use custody_ledger::application::orchestrator::{
    TransferDestination, TransferOrchestrator, TransferRequest, WithdrawalRequest,
};
use custody_ledger::application::settlement::PayoutRouter;
use custody_ledger::config::EngineConfig;
use custody_ledger::domain::account::{Account, AccountId, OwnerId};
use custody_ledger::domain::challenge::ChallengePurpose;
use custody_ledger::domain::destination::{
    DestinationAddress, DestinationId, PayoutCategory, WithdrawalDestination,
};
use custody_ledger::domain::ports::{LedgerStoreRef, PayoutProviderRef};
use custody_ledger::domain::transaction::Transaction;
use custody_ledger::error::Result;
use custody_ledger::infrastructure::collaborators::{
    InMemoryDestinationDirectory, KycStatus, KycTierGate, OutboxDelivery,
    SimulatedPayoutProvider,
};
use custody_ledger::infrastructure::in_memory::{InMemoryChallengeStore, InMemoryLedgerStore};
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

/// An engine over in-memory storage with every owner KYC-verified.
pub struct Harness {
    pub engine: LedgerEngine,
    pub store: LedgerStoreRef,
    pub outbox: OutboxDelivery,
    pub kyc: KycTierGate,
    pub directory: InMemoryDestinationDirectory,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_providers(
            EngineConfig::default(),
            vec![
                Arc::new(SimulatedPayoutProvider::succeeding(PayoutCategory::Bank)),
                Arc::new(SimulatedPayoutProvider::succeeding(PayoutCategory::Crypto)),
                Arc::new(SimulatedPayoutProvider::succeeding(PayoutCategory::MobileMoney)),
            ],
        )
    }

    pub fn with_providers(config: EngineConfig, providers: Vec<PayoutProviderRef>) -> Self {
        let store: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());
        let outbox = OutboxDelivery::new();
        let kyc = KycTierGate::new(KycStatus::Verified);
        let directory = InMemoryDestinationDirectory::new();
        let payouts = providers
            .into_iter()
            .fold(PayoutRouter::new(), |router, provider| router.with(provider));

        let engine = LedgerEngine::new(
            &config,
            store.clone(),
            Arc::new(InMemoryChallengeStore::new()),
            Collaborators {
                delivery: Arc::new(outbox.clone()),
                compliance: Arc::new(kyc.clone()),
                destinations: Arc::new(directory.clone()),
                payouts,
            },
        )
        .unwrap();
        Self {
            engine,
            store,
            outbox,
            kyc,
            directory,
        }
    }

    pub fn orchestrator(&self) -> &Arc<TransferOrchestrator> {
        self.engine.orchestrator()
    }

    /// Opens an account owned by `owner` holding `balance` NGN.
    pub async fn open(&self, id: u64, owner: u64, balance: u64) {
        self.orchestrator()
            .ledger()
            .open_account(Account::new(AccountId(id), OwnerId(owner), "NGN").with_balance(balance))
            .await
            .unwrap();
    }

    pub async fn balance(&self, id: u64) -> u64 {
        self.orchestrator()
            .ledger()
            .account(AccountId(id))
            .await
            .unwrap()
            .balance
    }

    pub async fn register_bank(&self, id: u64, owner: u64) {
        self.directory
            .register(WithdrawalDestination {
                id: DestinationId(id),
                owner: OwnerId(owner),
                provider: "paystack".to_string(),
                address: DestinationAddress::Bank {
                    account_name: "Ada Obi".to_string(),
                    account_number: "0123456789".to_string(),
                    bank_code: "058".to_string(),
                    bank_name: Some("GTBank".to_string()),
                },
                verified: true,
                is_default: true,
            })
            .await;
    }

    pub async fn register_crypto(&self, id: u64, owner: u64, asset: &str) {
        self.directory
            .register(WithdrawalDestination {
                id: DestinationId(id),
                owner: OwnerId(owner),
                provider: "trust_wallet".to_string(),
                address: DestinationAddress::Crypto {
                    wallet_address: "bc1qexample".to_string(),
                    network: "bitcoin".to_string(),
                    asset: asset.to_string(),
                },
                verified: true,
                is_default: false,
            })
            .await;
    }

    pub async fn code(&self, account: u64, purpose: ChallengePurpose) -> String {
        self.outbox
            .take(AccountId(account), purpose)
            .await
            .expect("a code should have been delivered")
    }

    /// Initiate and confirm an internal transfer in one go.
    pub async fn transfer(&self, owner: u64, from: u64, to: u64, amount: u64) -> Result<Transaction> {
        let request = TransferRequest {
            source: AccountId(from),
            destination: TransferDestination::Account(AccountId(to)),
            amount,
            description: None,
        };
        self.orchestrator()
            .initiate_transfer(OwnerId(owner), &request)
            .await?;
        let code = self.code(from, ChallengePurpose::Transfer).await;
        self.orchestrator()
            .confirm_transfer(OwnerId(owner), &request, &code)
            .await
    }

    pub async fn withdraw(&self, owner: u64, from: u64, destination: u64, amount: u64) -> Result<Transaction> {
        let request = WithdrawalRequest {
            source: AccountId(from),
            destination: DestinationId(destination),
            amount,
        };
        self.orchestrator()
            .initiate_withdrawal(OwnerId(owner), &request)
            .await?;
        let code = self.code(from, ChallengePurpose::Withdrawal).await;
        self.orchestrator()
            .confirm_withdrawal(OwnerId(owner), &request, &code)
            .await
    }
}

/// Writes a driver script to `path`.
pub fn write_script(path: &Path, rows: &[[&str; 6]]) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["op", "owner", "account", "target", "amount", "detail"])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
