//! Two-phase transfer, withdrawal and deposit protocol.
//!
//! `initiate_*` validates the request, prices it and issues a one-time code
//! bound to the exact request. Nothing is written to the ledger. `confirm_*`
//! re-validates everything, consumes the code and applies the balance change
//! under the account locks, writing the transaction record in the same
//! atomic commit.

use super::challenge_issuer::ChallengeIssuer;
use super::ledger::BalanceLedger;
use super::settlement::SettlementQueue;
use crate::config::DepositConfig;
use crate::domain::account::{Account, AccountId, Amount, OwnerId};
use crate::domain::challenge::ChallengePurpose;
use crate::domain::destination::{DestinationId, WithdrawalDestination};
use crate::domain::fee::{FeeBreakdown, FeeCalculator, FeeCategory};
use crate::domain::ports::{
    ChallengeDeliveryRef, ComplianceGateRef, DestinationDirectoryRef, TransactionStore,
};
use crate::domain::transaction::{Transaction, TransactionKind, TransactionStatus, keys};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an outgoing transfer goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDestination {
    /// Another account inside this ledger.
    Account(AccountId),
    /// A registered external payout destination.
    External(DestinationId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source: AccountId,
    pub destination: TransferDestination,
    pub amount: u64,
    pub description: Option<String>,
}

impl TransferRequest {
    /// Fingerprint the confirmation code is bound to.
    pub fn binding(&self) -> String {
        match self.destination {
            TransferDestination::Account(id) => {
                format!("transfer:{}:account:{}:{}", self.source.0, id.0, self.amount)
            }
            TransferDestination::External(id) => {
                format!("transfer:{}:external:{}:{}", self.source.0, id.0, self.amount)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub source: AccountId,
    pub destination: DestinationId,
    pub amount: u64,
}

impl WithdrawalRequest {
    pub fn binding(&self) -> String {
        format!("withdrawal:{}:{}:{}", self.source.0, self.destination.0, self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub account: AccountId,
    pub amount: u64,
    /// Funding method tag, e.g. "card" or "bank_transfer".
    pub method: String,
    pub external_reference: Option<String>,
}

impl DepositRequest {
    pub fn binding(&self) -> String {
        format!("deposit:{}:{}:{}", self.account.0, self.amount, self.method)
    }
}

/// Returned by every initiate step. Nothing has been debited yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengePreview {
    pub purpose: ChallengePurpose,
    pub amount: u64,
    pub fee: FeeBreakdown,
    /// Amount plus fee. Zero for deposits.
    pub total_debit: u64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DepositOutcome {
    Completed(Transaction),
    /// The deposit is at or above the large-deposit threshold and waits for
    /// `confirm_deposit`.
    ChallengeRequired(ChallengePreview),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account: AccountId,
    pub owner: OwnerId,
    pub currency: String,
    pub balance: u64,
    pub active: bool,
    pub can_transact: bool,
    pub transaction_ceiling: Option<u64>,
}

enum Target {
    Internal(Account),
    External(WithdrawalDestination),
}

/// A request that passed every check outside the lock.
struct OutgoingPlan {
    source: Account,
    target: Target,
    amount: Amount,
    fee: FeeBreakdown,
    total: Amount,
}

impl OutgoingPlan {
    fn preview(&self, purpose: ChallengePurpose, expires_at: DateTime<Utc>) -> ChallengePreview {
        ChallengePreview {
            purpose,
            amount: self.amount.value(),
            fee: self.fee,
            total_debit: self.total.value(),
            currency: self.source.currency.clone(),
            expires_at,
        }
    }
}

pub struct TransferOrchestrator {
    ledger: Arc<BalanceLedger>,
    issuer: Arc<ChallengeIssuer>,
    fees: FeeCalculator,
    compliance: ComplianceGateRef,
    destinations: DestinationDirectoryRef,
    delivery: ChallengeDeliveryRef,
    deposits: DepositConfig,
    settlement: Option<SettlementQueue>,
}

impl TransferOrchestrator {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        issuer: Arc<ChallengeIssuer>,
        fees: FeeCalculator,
        compliance: ComplianceGateRef,
        destinations: DestinationDirectoryRef,
        delivery: ChallengeDeliveryRef,
        deposits: DepositConfig,
    ) -> Self {
        Self {
            ledger,
            issuer,
            fees,
            compliance,
            destinations,
            delivery,
            deposits,
            settlement: None,
        }
    }

    /// Hands `processing` records to a running settlement worker. Without a
    /// queue they wait for the next recovery scan.
    pub fn with_settlement_queue(mut self, queue: SettlementQueue) -> Self {
        self.settlement = Some(queue);
        self
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    pub async fn initiate_transfer(
        &self,
        caller: OwnerId,
        request: &TransferRequest,
    ) -> Result<ChallengePreview> {
        let plan = self
            .plan_outgoing(caller, request.source, request.destination, request.amount)
            .await?;
        self.issue(&plan, ChallengePurpose::Transfer, &request.binding())
            .await
    }

    pub async fn confirm_transfer(
        &self,
        caller: OwnerId,
        request: &TransferRequest,
        code: &str,
    ) -> Result<Transaction> {
        let plan = self
            .plan_outgoing(caller, request.source, request.destination, request.amount)
            .await?;
        self.consume(request.source, ChallengePurpose::Transfer, code, &request.binding())
            .await?;
        self.execute_outgoing(
            caller,
            plan,
            TransactionKind::Transfer,
            request.description.as_deref(),
        )
        .await
    }

    pub async fn initiate_withdrawal(
        &self,
        caller: OwnerId,
        request: &WithdrawalRequest,
    ) -> Result<ChallengePreview> {
        let plan = self
            .plan_outgoing(
                caller,
                request.source,
                TransferDestination::External(request.destination),
                request.amount,
            )
            .await?;
        self.issue(&plan, ChallengePurpose::Withdrawal, &request.binding())
            .await
    }

    pub async fn confirm_withdrawal(
        &self,
        caller: OwnerId,
        request: &WithdrawalRequest,
        code: &str,
    ) -> Result<Transaction> {
        let plan = self
            .plan_outgoing(
                caller,
                request.source,
                TransferDestination::External(request.destination),
                request.amount,
            )
            .await?;
        self.consume(request.source, ChallengePurpose::Withdrawal, code, &request.binding())
            .await?;
        self.execute_outgoing(caller, plan, TransactionKind::Withdrawal, None)
            .await
    }

    /// Credits a deposit immediately, or issues a large-deposit challenge when
    /// the amount reaches the configured threshold.
    pub async fn deposit(&self, caller: OwnerId, request: &DepositRequest) -> Result<DepositOutcome> {
        let (account, amount) = self.validate_deposit(caller, request).await?;
        if amount.value() < self.deposits.large_deposit_threshold {
            return self
                .credit_deposit(caller, request, amount)
                .await
                .map(DepositOutcome::Completed);
        }

        let purpose = ChallengePurpose::LargeDeposit;
        let issued = self
            .issuer
            .issue_bound(account.id, purpose, &request.binding())
            .await?;
        self.deliver(account.id, &issued.code, purpose).await;
        info!(account = %account.id, amount = amount.value(), "Large deposit awaiting confirmation");
        Ok(DepositOutcome::ChallengeRequired(ChallengePreview {
            purpose,
            amount: amount.value(),
            fee: FeeBreakdown::ZERO,
            total_debit: 0,
            currency: account.currency,
            expires_at: issued.expires_at,
        }))
    }

    pub async fn confirm_deposit(
        &self,
        caller: OwnerId,
        request: &DepositRequest,
        code: &str,
    ) -> Result<Transaction> {
        let (account, amount) = self.validate_deposit(caller, request).await?;
        self.consume(account.id, ChallengePurpose::LargeDeposit, code, &request.binding())
            .await?;
        self.credit_deposit(caller, request, amount).await
    }

    /// Records touching `account`, newest first, paginated.
    pub async fn history(
        &self,
        caller: OwnerId,
        account: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.owned_account(caller, account).await?;
        let records = self.ledger.store().transactions_for_account(account).await?;
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn summary(&self, caller: OwnerId, account: AccountId) -> Result<AccountSummary> {
        let account = self.owned_account(caller, account).await?;
        let can_transact = self.compliance.can_transact(&account).await;
        let transaction_ceiling = self.compliance.transaction_ceiling(&account).await;
        Ok(AccountSummary {
            account: account.id,
            owner: account.owner,
            currency: account.currency,
            balance: account.balance,
            active: account.active,
            can_transact,
            transaction_ceiling,
        })
    }

    /// Loads an account the caller owns. Someone else's account is reported
    /// as missing.
    async fn owned_account(&self, caller: OwnerId, id: AccountId) -> Result<Account> {
        let account = self.ledger.account(id).await?;
        if account.owner != caller {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(account)
    }

    async fn active_owned_account(&self, caller: OwnerId, id: AccountId) -> Result<Account> {
        let account = self.owned_account(caller, id).await?;
        if !account.active {
            return Err(LedgerError::AccountInactive(id));
        }
        Ok(account)
    }

    async fn check_compliance(&self, account: &Account, amount: Amount) -> Result<()> {
        if !self.compliance.can_transact(account).await {
            return Err(LedgerError::ComplianceBlocked(format!(
                "{} is not cleared to transact",
                account.owner
            )));
        }
        if let Some(ceiling) = self.compliance.transaction_ceiling(account).await
            && amount.value() > ceiling
        {
            return Err(LedgerError::ComplianceBlocked(format!(
                "amount {amount} exceeds the transaction ceiling of {ceiling}"
            )));
        }
        Ok(())
    }

    async fn plan_outgoing(
        &self,
        caller: OwnerId,
        source: AccountId,
        destination: TransferDestination,
        amount: u64,
    ) -> Result<OutgoingPlan> {
        let amount = Amount::new(amount)?;
        let source = self.active_owned_account(caller, source).await?;
        self.check_compliance(&source, amount).await?;

        let (target, fee) = match destination {
            TransferDestination::Account(id) => {
                let recipient = self.resolve_recipient(&source, id).await?;
                (Target::Internal(recipient), FeeBreakdown::ZERO)
            }
            TransferDestination::External(id) => {
                let destination = self.resolve_external(caller, id).await?;
                let category = destination.category();
                let fee_key = destination.asset().unwrap_or(&source.currency);
                let fee = self
                    .fees
                    .compute(amount, FeeCategory::from(category), Some(fee_key));
                (Target::External(destination), fee)
            }
        };

        let total = amount.checked_add(fee.total_fee)?;
        if source.balance < total.value() {
            return Err(LedgerError::InsufficientFunds {
                needed: total.value(),
                available: source.balance,
            });
        }

        Ok(OutgoingPlan {
            source,
            target,
            amount,
            fee,
            total,
        })
    }

    async fn resolve_recipient(&self, source: &Account, id: AccountId) -> Result<Account> {
        if id == source.id {
            return Err(LedgerError::InvalidDestination(
                "cannot transfer to the source account".to_string(),
            ));
        }
        let recipient = match self.ledger.account(id).await {
            Ok(account) => account,
            Err(LedgerError::AccountNotFound(_)) => {
                return Err(LedgerError::InvalidDestination(format!(
                    "recipient {id} does not exist"
                )));
            }
            Err(e) => return Err(e),
        };
        if recipient.owner == source.owner {
            return Err(LedgerError::InvalidDestination(
                "recipient belongs to the sender".to_string(),
            ));
        }
        if !recipient.active {
            return Err(LedgerError::InvalidDestination(format!(
                "recipient {id} is inactive"
            )));
        }
        if recipient.currency != source.currency {
            return Err(LedgerError::InvalidDestination(format!(
                "recipient {id} holds {}, not {}",
                recipient.currency, source.currency
            )));
        }
        if !self.compliance.can_transact(&recipient).await {
            return Err(LedgerError::InvalidDestination(format!(
                "recipient {id} cannot receive funds"
            )));
        }
        Ok(recipient)
    }

    async fn resolve_external(
        &self,
        caller: OwnerId,
        id: DestinationId,
    ) -> Result<WithdrawalDestination> {
        let Some(destination) = self.destinations.get_destination(id).await? else {
            return Err(LedgerError::InvalidDestination(format!("{id} does not exist")));
        };
        if destination.owner != caller {
            return Err(LedgerError::InvalidDestination(format!("{id} does not exist")));
        }
        if !destination.verified {
            return Err(LedgerError::InvalidDestination(format!("{id} is not verified")));
        }
        if destination.asset().is_some_and(|asset| asset.trim().is_empty()) {
            return Err(LedgerError::InvalidDestination(format!(
                "{id} does not name a crypto asset"
            )));
        }
        Ok(destination)
    }

    async fn issue(
        &self,
        plan: &OutgoingPlan,
        purpose: ChallengePurpose,
        binding: &str,
    ) -> Result<ChallengePreview> {
        let issued = self
            .issuer
            .issue_bound(plan.source.id, purpose, binding)
            .await?;
        self.deliver(plan.source.id, &issued.code, purpose).await;
        info!(
            account = %plan.source.id,
            %purpose,
            amount = plan.amount.value(),
            fee = plan.fee.total_fee,
            "Transfer initiated"
        );
        Ok(plan.preview(purpose, issued.expires_at))
    }

    async fn deliver(&self, account: AccountId, code: &str, purpose: ChallengePurpose) {
        if !self.delivery.deliver(account, code, purpose).await {
            warn!(%account, %purpose, "Challenge delivery failed; caller may request a new code");
        }
    }

    async fn consume(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        code: &str,
        binding: &str,
    ) -> Result<()> {
        if self
            .issuer
            .verify_bound(account, purpose, code, binding)
            .await?
        {
            Ok(())
        } else {
            warn!(%account, %purpose, "Confirmation rejected: invalid or expired code");
            Err(LedgerError::InvalidOrExpiredChallenge)
        }
    }

    async fn execute_outgoing(
        &self,
        caller: OwnerId,
        plan: OutgoingPlan,
        kind: TransactionKind,
        description: Option<&str>,
    ) -> Result<Transaction> {
        let source_id = plan.source.id;
        let recipient_id = match &plan.target {
            Target::Internal(recipient) => Some(recipient.id),
            Target::External(_) => None,
        };

        let mut guard = self
            .ledger
            .lock_accounts(std::iter::once(source_id).chain(recipient_id))
            .await?;
        let debit = guard.debit(source_id, plan.total)?;

        let mut tx = match &plan.target {
            Target::Internal(recipient) => {
                let credit = guard.credit(recipient.id, plan.amount)?;
                let mut tx = Transaction::new(
                    caller,
                    kind,
                    TransactionStatus::Completed,
                    plan.amount.value(),
                    plan.source.currency.as_str(),
                    "internal",
                );
                tx.destination = Some(recipient.id);
                tx.annotate(keys::COUNTERPARTY_BALANCE_BEFORE, credit.before);
                tx.annotate(keys::COUNTERPARTY_BALANCE_AFTER, credit.after);
                tx
            }
            Target::External(destination) => {
                let mut tx = Transaction::new(
                    caller,
                    kind,
                    TransactionStatus::Processing,
                    plan.amount.value(),
                    plan.source.currency.as_str(),
                    destination.category().as_str(),
                );
                tx.annotate(keys::DESTINATION_ID, destination.id.0);
                tx.annotate(keys::DESTINATION_CATEGORY, destination.category().as_str());
                tx
            }
        };
        tx.source = Some(source_id);
        tx.annotate(keys::BALANCE_BEFORE, debit.before);
        tx.annotate(keys::BALANCE_AFTER, debit.after);
        tx.annotate(keys::FEE, serde_json::to_value(plan.fee)?);
        tx.annotate(keys::TOTAL_DEBIT, plan.total.value());
        if let Some(description) = description {
            tx.annotate(keys::DESCRIPTION, description);
        }

        self.ledger.commit(guard, vec![tx.clone()]).await?;
        info!(
            transaction = %tx.id,
            reference = %tx.reference,
            %kind,
            status = %tx.status,
            source = %source_id,
            amount = tx.amount,
            total_debit = plan.total.value(),
            "Transfer confirmed"
        );

        if tx.status == TransactionStatus::Processing {
            match &self.settlement {
                Some(queue) => {
                    queue.schedule(tx.id);
                }
                None => debug!(transaction = %tx.id, "No settlement queue; left for recovery scan"),
            }
        }
        Ok(tx)
    }

    async fn validate_deposit(
        &self,
        caller: OwnerId,
        request: &DepositRequest,
    ) -> Result<(Account, Amount)> {
        let amount = Amount::new(request.amount)?;
        if request.method.trim().is_empty() {
            return Err(LedgerError::ValidationError(
                "deposit method must not be empty".to_string(),
            ));
        }
        let account = self.active_owned_account(caller, request.account).await?;
        self.check_compliance(&account, amount).await?;
        Ok((account, amount))
    }

    async fn credit_deposit(
        &self,
        caller: OwnerId,
        request: &DepositRequest,
        amount: Amount,
    ) -> Result<Transaction> {
        let mut guard = self.ledger.lock_accounts([request.account]).await?;
        let credit = guard.credit(request.account, amount)?;
        let currency = guard.snapshot(request.account)?.currency.clone();

        let mut tx = Transaction::new(
            caller,
            TransactionKind::Deposit,
            TransactionStatus::Completed,
            amount.value(),
            currency,
            request.method.as_str(),
        );
        tx.destination = Some(request.account);
        tx.annotate(keys::BALANCE_BEFORE, credit.before);
        tx.annotate(keys::BALANCE_AFTER, credit.after);
        if let Some(reference) = &request.external_reference {
            tx.annotate(keys::EXTERNAL_REFERENCE, reference.as_str());
        }

        self.ledger.commit(guard, vec![tx.clone()]).await?;
        info!(
            transaction = %tx.id,
            account = %request.account,
            amount = tx.amount,
            method = %request.method,
            "Deposit credited"
        );
        Ok(tx)
    }
}
