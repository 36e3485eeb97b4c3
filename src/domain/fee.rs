use super::account::Amount;
use super::destination::PayoutCategory;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Where money is going, for fee purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeCategory {
    /// Account-to-account inside the ledger. Always free.
    Internal,
    Bank,
    Crypto,
    MobileMoney,
}

impl From<PayoutCategory> for FeeCategory {
    fn from(category: PayoutCategory) -> Self {
        match category {
            PayoutCategory::Bank => Self::Bank,
            PayoutCategory::Crypto => Self::Crypto,
            PayoutCategory::MobileMoney => Self::MobileMoney,
        }
    }
}

/// Fee components in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub percentage_fee: u64,
    /// Flat currency fee, or the network-fee estimate for crypto.
    pub fixed_or_network_fee: u64,
    pub total_fee: u64,
}

impl FeeBreakdown {
    pub const ZERO: Self = Self {
        percentage_fee: 0,
        fixed_or_network_fee: 0,
        total_fee: 0,
    };
}

/// Published rates for one destination category.
///
/// `flat_fees` is keyed by currency code for bank and mobile-money, and by
/// asset symbol for crypto (where it holds the network-fee estimate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    /// Fraction of the amount, e.g. `0.015` for 1.5%.
    pub percentage: Decimal,
    #[serde(default, deserialize_with = "uppercase_keys")]
    pub flat_fees: BTreeMap<String, u64>,
    pub default_flat_fee: u64,
}

/// Lookups upper-case the key, so configured codes are stored upper-cased.
fn uppercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, u64>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, fee)| (key.to_ascii_uppercase(), fee))
        .collect())
}

impl RateTable {
    fn flat_fee(&self, key: Option<&str>) -> u64 {
        key.and_then(|k| self.flat_fees.get(&k.to_ascii_uppercase()))
            .copied()
            .unwrap_or(self.default_flat_fee)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub bank: RateTable,
    pub mobile_money: RateTable,
    pub crypto: RateTable,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let network_fees = [
            ("BTC", 2500),
            ("ETH", 1500),
            ("BNB", 300),
            ("LTC", 200),
            ("USDT", 100),
            ("USDC", 100),
        ]
        .into_iter()
        .map(|(asset, fee)| (asset.to_string(), fee))
        .collect();

        Self {
            bank: RateTable {
                percentage: dec!(0.015),
                flat_fees: BTreeMap::new(),
                default_flat_fee: 100,
            },
            mobile_money: RateTable {
                percentage: dec!(0.01),
                flat_fees: BTreeMap::new(),
                default_flat_fee: 50,
            },
            crypto: RateTable {
                percentage: dec!(0.01),
                flat_fees: network_fees,
                default_flat_fee: 500,
            },
        }
    }
}

impl FeeSchedule {
    /// Rejects rates outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), String> {
        for (name, table) in [
            ("bank", &self.bank),
            ("mobile_money", &self.mobile_money),
            ("crypto", &self.crypto),
        ] {
            if table.percentage < Decimal::ZERO || table.percentage > Decimal::ONE {
                return Err(format!(
                    "{name} percentage must be between 0 and 1, got {}",
                    table.percentage
                ));
            }
        }
        Ok(())
    }
}

/// Maps (amount, category, currency) to a fee breakdown.
///
/// Pure: no I/O, and the same inputs always give the same breakdown.
#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// `currency` is the account currency for bank/mobile-money and the asset
    /// symbol for crypto. Unknown keys fall back to the table default.
    pub fn compute(
        &self,
        amount: Amount,
        category: FeeCategory,
        currency: Option<&str>,
    ) -> FeeBreakdown {
        let table = match category {
            FeeCategory::Internal => return FeeBreakdown::ZERO,
            FeeCategory::Bank => &self.schedule.bank,
            FeeCategory::Crypto => &self.schedule.crypto,
            FeeCategory::MobileMoney => &self.schedule.mobile_money,
        };

        let percentage_fee = Decimal::from(amount.value())
            .checked_mul(table.percentage)
            .map(|fee| fee.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|fee| fee.to_u64())
            // Rates are validated into [0, 1], so the product always fits.
            .unwrap_or_default();
        let fixed_or_network_fee = table.flat_fee(currency);

        FeeBreakdown {
            percentage_fee,
            fixed_or_network_fee,
            total_fee: percentage_fee.saturating_add(fixed_or_network_fee),
        }
    }
}
