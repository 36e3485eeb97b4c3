use clap::Parser;
use custody_ledger::application::engine::{Collaborators, LedgerEngine};
use custody_ledger::application::settlement::PayoutRouter;
use custody_ledger::config::EngineConfig;
use custody_ledger::domain::destination::PayoutCategory;
use custody_ledger::domain::ports::{ChallengeStoreRef, LedgerStoreRef, TransactionStore};
use custody_ledger::domain::transaction::{Transaction, TransactionStatus};
use custody_ledger::infrastructure::collaborators::{
    InMemoryDestinationDirectory, KycTierGate, OutboxDelivery, SimulatedPayoutProvider,
};
use custody_ledger::infrastructure::in_memory::{InMemoryChallengeStore, InMemoryLedgerStore};
#[cfg(feature = "storage-rocksdb")]
use custody_ledger::infrastructure::rocksdb::RocksDBStore;
use custody_ledger::interfaces::csv::account_writer::AccountWriter;
use custody_ledger::interfaces::csv::script_reader::ScriptReader;
use custody_ledger::interfaces::csv::script_runner::ScriptRunner;
use custody_ledger::logging::init_logging;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input script CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Engine configuration (YAML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write every ledger record after the accounts.
    #[arg(long)]
    transactions: bool,
}

fn in_memory_storage() -> (LedgerStoreRef, ChallengeStoreRef) {
    (
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryChallengeStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<&Path>) -> Result<(LedgerStoreRef, ChallengeStoreRef)> {
    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        None => Ok(in_memory_storage()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<&Path>) -> Result<(LedgerStoreRef, ChallengeStoreRef)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_storage())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    init_logging(&config.logging);

    let (store, challenges) = open_storage(cli.db_path.as_deref())?;

    // Simulated collaborators: codes land in an outbox and every payout succeeds.
    let outbox = OutboxDelivery::new();
    let kyc = KycTierGate::default();
    let directory = InMemoryDestinationDirectory::new();
    let payouts = [
        PayoutCategory::Bank,
        PayoutCategory::Crypto,
        PayoutCategory::MobileMoney,
    ]
    .into_iter()
    .fold(PayoutRouter::new(), |router, category| {
        router.with(Arc::new(SimulatedPayoutProvider::succeeding(category)))
    });

    // Batch run: payouts settle in one pass after the script.
    let engine = LedgerEngine::batch(
        &config,
        store,
        challenges,
        Collaborators {
            delivery: Arc::new(outbox.clone()),
            compliance: Arc::new(kyc.clone()),
            destinations: Arc::new(directory.clone()),
            payouts,
        },
    )
    .into_diagnostic()?;
    let runner = ScriptRunner::new(engine.orchestrator().clone(), outbox, kyc, directory);

    // Apply the script
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = ScriptReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = runner.apply(&command).await {
                    eprintln!("Error processing {:?} row: {}", command.op, e);
                }
            }
            Err(e) => {
                eprintln!("Error reading row: {}", e);
            }
        }
    }

    engine.drain_settlements().await.into_diagnostic()?;

    let mut records: Vec<Transaction> = Vec::new();
    if cli.transactions {
        let ledger_store = engine.orchestrator().ledger().store().clone();
        for status in [
            TransactionStatus::Completed,
            TransactionStatus::Processing,
            TransactionStatus::Failed,
        ] {
            records.extend(
                ledger_store
                    .transactions_by_status(status)
                    .await
                    .into_diagnostic()?,
            );
        }
        records.sort_by_key(|tx| tx.created_at);
    }

    let accounts = engine.into_results().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;
    if cli.transactions {
        writer.write_transactions(&records).into_diagnostic()?;
    }

    Ok(())
}
