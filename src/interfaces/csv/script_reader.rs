use crate::domain::account::OwnerId;
use crate::domain::destination::{
    DestinationAddress, DestinationId, PayoutCategory, WithdrawalDestination,
};
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::Read;

/// Operation named in the `op` column of a script row.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOp {
    /// Open `account` for `owner` in currency `detail`.
    Open,
    /// Set the owner's KYC status to `detail`.
    Kyc,
    /// Register destination `target` for `owner`, address in `detail`.
    Destination,
    Deposit,
    /// Internal transfer from `account` to account `target`.
    Transfer,
    /// External transfer from `account` to destination `target`.
    Send,
    Withdraw,
}

/// One row of a driver script: `op,owner,account,target,amount,detail`.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct ScriptCommand {
    pub op: ScriptOp,
    pub owner: u64,
    pub account: Option<u64>,
    pub target: Option<u64>,
    pub amount: Option<u64>,
    pub detail: Option<String>,
}

impl ScriptCommand {
    pub fn owner(&self) -> OwnerId {
        OwnerId(self.owner)
    }

    pub fn require_account(&self) -> Result<u64> {
        self.account.ok_or_else(|| self.missing("account"))
    }

    pub fn require_target(&self) -> Result<u64> {
        self.target.ok_or_else(|| self.missing("target"))
    }

    pub fn require_amount(&self) -> Result<u64> {
        self.amount.ok_or_else(|| self.missing("amount"))
    }

    pub fn require_detail(&self) -> Result<&str> {
        self.detail
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| self.missing("detail"))
    }

    fn missing(&self, column: &str) -> LedgerError {
        LedgerError::ValidationError(format!("{:?} row is missing '{column}'", self.op))
    }
}

/// Parses a destination `detail` column into a verified destination.
///
/// Formats, colon separated:
/// `bank:<account_number>:<bank_code>[:<account_name>]`,
/// `crypto:<asset>:<network>:<wallet_address>`,
/// `mobile_money:<network>:<phone_number>`.
pub fn parse_destination(id: u64, owner: u64, detail: &str) -> Result<WithdrawalDestination> {
    let invalid = || LedgerError::ValidationError(format!("malformed destination '{detail}'"));
    let mut parts = detail.split(':').map(str::trim);
    let category: PayoutCategory = parts
        .next()
        .ok_or_else(invalid)?
        .parse()
        .map_err(LedgerError::ValidationError)?;
    let fields: Vec<&str> = parts.collect();

    let (provider, address) = match (category, fields.as_slice()) {
        (PayoutCategory::Bank, [number, code, rest @ ..]) if rest.len() <= 1 => (
            "bank_transfer",
            DestinationAddress::Bank {
                account_name: rest.first().unwrap_or(&"").to_string(),
                account_number: number.to_string(),
                bank_code: code.to_string(),
                bank_name: None,
            },
        ),
        (PayoutCategory::Crypto, [asset, network, wallet]) => (
            "crypto_wallet",
            DestinationAddress::Crypto {
                wallet_address: wallet.to_string(),
                network: network.to_string(),
                asset: asset.to_ascii_uppercase(),
            },
        ),
        (PayoutCategory::MobileMoney, [network, phone]) => (
            "mobile_money",
            DestinationAddress::MobileMoney {
                phone_number: phone.to_string(),
                network: network.to_string(),
            },
        ),
        _ => return Err(invalid()),
    };

    Ok(WithdrawalDestination {
        id: DestinationId(id),
        owner: OwnerId(owner),
        provider: provider.to_string(),
        address,
        verified: true,
        is_default: false,
    })
}

/// Reads driver script rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding one `Result` per row so a bad row does not stop the script.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows in file order.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
