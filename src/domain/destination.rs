use super::account::OwnerId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationId(pub u64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dest:{}", self.0)
    }
}

/// Category of an external payout destination.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PayoutCategory {
    Bank,
    Crypto,
    MobileMoney,
}

impl PayoutCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Crypto => "crypto",
            Self::MobileMoney => "mobile_money",
        }
    }
}

impl fmt::Display for PayoutCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayoutCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bank" => Ok(Self::Bank),
            "crypto" => Ok(Self::Crypto),
            "mobile_money" | "mobile-money" => Ok(Self::MobileMoney),
            other => Err(format!("unknown payout category '{other}'")),
        }
    }
}

/// Category-specific address fields.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum DestinationAddress {
    Bank {
        account_name: String,
        account_number: String,
        bank_code: String,
        bank_name: Option<String>,
    },
    Crypto {
        wallet_address: String,
        network: String,
        /// Asset symbol, e.g. "USDT". Drives the network-fee estimate.
        asset: String,
    },
    MobileMoney {
        phone_number: String,
        network: String,
    },
}

impl DestinationAddress {
    pub fn category(&self) -> PayoutCategory {
        match self {
            Self::Bank { .. } => PayoutCategory::Bank,
            Self::Crypto { .. } => PayoutCategory::Crypto,
            Self::MobileMoney { .. } => PayoutCategory::MobileMoney,
        }
    }
}

/// An external payout target registered by a customer.
///
/// Owned by the account-management collaborator; the engine only reads it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct WithdrawalDestination {
    pub id: DestinationId,
    pub owner: OwnerId,
    /// Provider tag, e.g. "paystack" or "trust_wallet".
    pub provider: String,
    pub address: DestinationAddress,
    pub verified: bool,
    pub is_default: bool,
}

impl WithdrawalDestination {
    pub fn category(&self) -> PayoutCategory {
        self.address.category()
    }

    /// Asset symbol for crypto destinations.
    pub fn asset(&self) -> Option<&str> {
        match &self.address {
            DestinationAddress::Crypto { asset, .. } => Some(asset.as_str()),
            _ => None,
        }
    }
}
