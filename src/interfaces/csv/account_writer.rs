use crate::domain::account::Account;
use crate::domain::transaction::{Transaction, keys};
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    account: u64,
    owner: u64,
    currency: &'a str,
    balance: u64,
    active: bool,
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    reference: &'a str,
    kind: String,
    status: String,
    owner: u64,
    source: Option<u64>,
    destination: Option<u64>,
    amount: u64,
    currency: &'a str,
    method: &'a str,
    fee: u64,
    balance_before: Option<u64>,
    balance_after: Option<u64>,
}

const ACCOUNT_HEADER: [&str; 5] = ["account", "owner", "currency", "balance", "active"];
const TRANSACTION_HEADER: [&str; 12] = [
    "reference",
    "kind",
    "status",
    "owner",
    "source",
    "destination",
    "amount",
    "currency",
    "method",
    "fee",
    "balance_before",
    "balance_after",
];

/// Writes final ledger state as CSV.
///
/// Each section writes its own header, so accounts and transactions can
/// share one output stream.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_accounts(&mut self, accounts: impl IntoIterator<Item = Account>) -> Result<()> {
        self.writer.write_record(ACCOUNT_HEADER)?;
        for account in accounts {
            self.writer.serialize(AccountRow {
                account: account.id.0,
                owner: account.owner.0,
                currency: &account.currency,
                balance: account.balance,
                active: account.active,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_transactions(&mut self, transactions: &[Transaction]) -> Result<()> {
        self.writer.write_record(TRANSACTION_HEADER)?;
        for tx in transactions {
            let fee = tx
                .annotations
                .get(keys::FEE)
                .and_then(|fee| fee.get("total_fee"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            self.writer.serialize(TransactionRow {
                reference: &tx.reference,
                kind: tx.kind.to_string(),
                status: tx.status.to_string(),
                owner: tx.owner.0,
                source: tx.source.map(|id| id.0),
                destination: tx.destination.map(|id| id.0),
                amount: tx.amount,
                currency: &tx.currency,
                method: &tx.method,
                fee,
                balance_before: tx.annotation_u64(keys::BALANCE_BEFORE),
                balance_after: tx.annotation_u64(keys::BALANCE_AFTER),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
