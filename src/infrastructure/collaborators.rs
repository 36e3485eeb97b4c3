//! In-process stand-ins for the external collaborators: code delivery, KYC,
//! the destination directory and payout providers.

use crate::domain::account::{Account, AccountId, OwnerId};
use crate::domain::challenge::ChallengePurpose;
use crate::domain::destination::{DestinationId, PayoutCategory, WithdrawalDestination};
use crate::domain::ports::{
    ChallengeDelivery, ComplianceGate, DestinationDirectory, PayoutOutcome, PayoutProvider,
};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Records every delivered code in memory instead of sending it anywhere.
///
/// Drivers and tests read the code back with [`OutboxDelivery::take`].
#[derive(Default, Clone)]
pub struct OutboxDelivery {
    outbox: Arc<RwLock<HashMap<(AccountId, ChallengePurpose), String>>>,
}

impl OutboxDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the most recent code for (account, purpose).
    pub async fn take(&self, account: AccountId, purpose: ChallengePurpose) -> Option<String> {
        self.outbox.write().await.remove(&(account, purpose))
    }

    /// Returns the most recent code without removing it.
    pub async fn peek(&self, account: AccountId, purpose: ChallengePurpose) -> Option<String> {
        self.outbox.read().await.get(&(account, purpose)).cloned()
    }
}

#[async_trait]
impl ChallengeDelivery for OutboxDelivery {
    async fn deliver(&self, account: AccountId, code: &str, purpose: ChallengePurpose) -> bool {
        debug!(%account, %purpose, "Challenge code placed in outbox");
        self.outbox
            .write()
            .await
            .insert((account, purpose), code.to_string());
        true
    }
}

/// KYC review outcome for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Submitted,
    Rejected,
    Verified,
    Enhanced,
}

impl KycStatus {
    /// Single-transaction ceiling in minor units, `None` when blocked.
    pub fn ceiling(&self) -> Option<u64> {
        match self {
            Self::Pending | Self::Submitted | Self::Rejected => None,
            Self::Verified => Some(1_000_000),
            Self::Enhanced => Some(5_000_000),
        }
    }
}

impl std::str::FromStr for KycStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "submitted" => Ok(Self::Submitted),
            "rejected" => Ok(Self::Rejected),
            "verified" => Ok(Self::Verified),
            "enhanced" => Ok(Self::Enhanced),
            other => Err(format!("unknown KYC status '{other}'")),
        }
    }
}

/// Compliance gate backed by per-owner KYC tiers.
///
/// Owners with no recorded status get `default_status`.
#[derive(Clone)]
pub struct KycTierGate {
    statuses: Arc<RwLock<HashMap<OwnerId, KycStatus>>>,
    default_status: KycStatus,
}

impl KycTierGate {
    pub fn new(default_status: KycStatus) -> Self {
        Self {
            statuses: Arc::new(RwLock::new(HashMap::new())),
            default_status,
        }
    }

    pub async fn set_status(&self, owner: OwnerId, status: KycStatus) {
        self.statuses.write().await.insert(owner, status);
    }

    pub async fn status(&self, owner: OwnerId) -> KycStatus {
        self.statuses
            .read()
            .await
            .get(&owner)
            .copied()
            .unwrap_or(self.default_status)
    }
}

impl Default for KycTierGate {
    fn default() -> Self {
        Self::new(KycStatus::Pending)
    }
}

#[async_trait]
impl ComplianceGate for KycTierGate {
    async fn can_transact(&self, account: &Account) -> bool {
        self.status(account.owner).await.ceiling().is_some()
    }

    async fn transaction_ceiling(&self, account: &Account) -> Option<u64> {
        self.status(account.owner).await.ceiling()
    }
}

#[derive(Default, Clone)]
pub struct InMemoryDestinationDirectory {
    destinations: Arc<RwLock<HashMap<DestinationId, WithdrawalDestination>>>,
}

impl InMemoryDestinationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, destination: WithdrawalDestination) {
        self.destinations
            .write()
            .await
            .insert(destination.id, destination);
    }
}

#[async_trait]
impl DestinationDirectory for InMemoryDestinationDirectory {
    async fn get_destination(&self, id: DestinationId) -> Result<Option<WithdrawalDestination>> {
        Ok(self.destinations.read().await.get(&id).cloned())
    }
}

#[derive(Debug, Clone)]
enum SimulatedBehaviour {
    Succeed,
    Reject(String),
    Unreachable(String),
}

/// A payout provider that answers immediately without contacting anyone.
#[derive(Debug, Clone)]
pub struct SimulatedPayoutProvider {
    category: PayoutCategory,
    behaviour: SimulatedBehaviour,
}

impl SimulatedPayoutProvider {
    pub fn succeeding(category: PayoutCategory) -> Self {
        Self {
            category,
            behaviour: SimulatedBehaviour::Succeed,
        }
    }

    /// Every payout is definitively rejected with `reason`.
    pub fn rejecting(category: PayoutCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            behaviour: SimulatedBehaviour::Reject(reason.into()),
        }
    }

    /// Every call fails as a transport error.
    pub fn unreachable(category: PayoutCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            behaviour: SimulatedBehaviour::Unreachable(reason.into()),
        }
    }
}

#[async_trait]
impl PayoutProvider for SimulatedPayoutProvider {
    fn category(&self) -> PayoutCategory {
        self.category
    }

    async fn submit_payout(
        &self,
        destination: &WithdrawalDestination,
        amount: u64,
        currency: &str,
    ) -> Result<PayoutOutcome> {
        let reference = format!("{}-{}", self.category, Uuid::new_v4().simple());
        match &self.behaviour {
            SimulatedBehaviour::Succeed => Ok(PayoutOutcome {
                reference,
                success: true,
                error: None,
            }),
            SimulatedBehaviour::Reject(reason) => Ok(PayoutOutcome {
                reference,
                success: false,
                error: Some(reason.clone()),
            }),
            SimulatedBehaviour::Unreachable(reason) => {
                warn!(
                    destination = %destination.id,
                    amount,
                    currency,
                    "Simulated payout provider unreachable"
                );
                Err(LedgerError::internal(reason.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::destination::DestinationAddress;

    #[tokio::test]
    async fn test_outbox_take_removes_code() {
        let outbox = OutboxDelivery::new();
        assert!(
            outbox
                .deliver(AccountId(1), "123456", ChallengePurpose::Transfer)
                .await
        );
        assert_eq!(
            outbox.peek(AccountId(1), ChallengePurpose::Transfer).await,
            Some("123456".to_string())
        );
        assert_eq!(
            outbox.take(AccountId(1), ChallengePurpose::Transfer).await,
            Some("123456".to_string())
        );
        assert!(outbox.take(AccountId(1), ChallengePurpose::Transfer).await.is_none());
    }

    #[tokio::test]
    async fn test_kyc_tiers() {
        let gate = KycTierGate::default();
        let account = Account::new(AccountId(1), OwnerId(1), "NGN");
        assert!(!gate.can_transact(&account).await);

        gate.set_status(OwnerId(1), KycStatus::Verified).await;
        assert!(gate.can_transact(&account).await);
        assert_eq!(gate.transaction_ceiling(&account).await, Some(1_000_000));

        gate.set_status(OwnerId(1), KycStatus::Rejected).await;
        assert!(!gate.can_transact(&account).await);
    }

    #[tokio::test]
    async fn test_simulated_provider_outcomes() {
        let dest = WithdrawalDestination {
            id: DestinationId(1),
            owner: OwnerId(1),
            provider: "paystack".to_string(),
            address: DestinationAddress::Bank {
                account_name: "A".to_string(),
                account_number: "0123456789".to_string(),
                bank_code: "058".to_string(),
                bank_name: None,
            },
            verified: true,
            is_default: true,
        };

        let ok = SimulatedPayoutProvider::succeeding(PayoutCategory::Bank)
            .submit_payout(&dest, 100, "NGN")
            .await
            .unwrap();
        assert!(ok.success);
        assert!(ok.reference.starts_with("bank-"));

        let rejected = SimulatedPayoutProvider::rejecting(PayoutCategory::Bank, "closed account")
            .submit_payout(&dest, 100, "NGN")
            .await
            .unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.error.as_deref(), Some("closed account"));

        assert!(
            SimulatedPayoutProvider::unreachable(PayoutCategory::Bank, "timeout")
                .submit_payout(&dest, 100, "NGN")
                .await
                .is_err()
        );
    }
}
