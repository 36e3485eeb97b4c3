use super::script_reader::{ScriptCommand, ScriptOp, parse_destination};
use crate::application::orchestrator::{
    DepositOutcome, DepositRequest, TransferDestination, TransferOrchestrator, TransferRequest,
    WithdrawalRequest,
};
use crate::domain::account::{Account, AccountId};
use crate::domain::challenge::ChallengePurpose;
use crate::domain::destination::DestinationId;
use crate::error::{LedgerError, Result};
use crate::infrastructure::collaborators::{
    InMemoryDestinationDirectory, KycStatus, KycTierGate, OutboxDelivery,
};
use std::sync::Arc;
use tracing::debug;

/// Applies script rows to a running engine.
///
/// Stands in for the customer: every money-moving row runs initiate, reads
/// the issued code back from the outbox and confirms.
pub struct ScriptRunner {
    orchestrator: Arc<TransferOrchestrator>,
    outbox: OutboxDelivery,
    kyc: KycTierGate,
    directory: InMemoryDestinationDirectory,
}

impl ScriptRunner {
    pub fn new(
        orchestrator: Arc<TransferOrchestrator>,
        outbox: OutboxDelivery,
        kyc: KycTierGate,
        directory: InMemoryDestinationDirectory,
    ) -> Self {
        Self {
            orchestrator,
            outbox,
            kyc,
            directory,
        }
    }

    pub async fn apply(&self, command: &ScriptCommand) -> Result<()> {
        let caller = command.owner();
        match command.op {
            ScriptOp::Open => {
                let id = AccountId(command.require_account()?);
                let currency = command.require_detail()?.to_ascii_uppercase();
                self.orchestrator
                    .ledger()
                    .open_account(Account::new(id, caller, currency))
                    .await?;
            }
            ScriptOp::Kyc => {
                let status: KycStatus = command
                    .require_detail()?
                    .parse()
                    .map_err(LedgerError::ValidationError)?;
                self.kyc.set_status(caller, status).await;
            }
            ScriptOp::Destination => {
                let destination = parse_destination(
                    command.require_target()?,
                    command.owner,
                    command.require_detail()?,
                )?;
                self.directory.register(destination).await;
            }
            ScriptOp::Deposit => {
                let request = DepositRequest {
                    account: AccountId(command.require_account()?),
                    amount: command.require_amount()?,
                    method: command.detail.clone().unwrap_or_else(|| "card".to_string()),
                    external_reference: None,
                };
                if let DepositOutcome::ChallengeRequired(_) =
                    self.orchestrator.deposit(caller, &request).await?
                {
                    let code = self
                        .code_for(request.account, ChallengePurpose::LargeDeposit)
                        .await?;
                    self.orchestrator
                        .confirm_deposit(caller, &request, &code)
                        .await?;
                }
            }
            ScriptOp::Transfer | ScriptOp::Send => {
                let target = command.require_target()?;
                let destination = if command.op == ScriptOp::Transfer {
                    TransferDestination::Account(AccountId(target))
                } else {
                    TransferDestination::External(DestinationId(target))
                };
                let request = TransferRequest {
                    source: AccountId(command.require_account()?),
                    destination,
                    amount: command.require_amount()?,
                    description: command.detail.clone(),
                };
                self.orchestrator.initiate_transfer(caller, &request).await?;
                let code = self
                    .code_for(request.source, ChallengePurpose::Transfer)
                    .await?;
                self.orchestrator
                    .confirm_transfer(caller, &request, &code)
                    .await?;
            }
            ScriptOp::Withdraw => {
                let request = WithdrawalRequest {
                    source: AccountId(command.require_account()?),
                    destination: DestinationId(command.require_target()?),
                    amount: command.require_amount()?,
                };
                self.orchestrator.initiate_withdrawal(caller, &request).await?;
                let code = self
                    .code_for(request.source, ChallengePurpose::Withdrawal)
                    .await?;
                self.orchestrator
                    .confirm_withdrawal(caller, &request, &code)
                    .await?;
            }
        }
        debug!(op = ?command.op, owner = command.owner, "Script row applied");
        Ok(())
    }

    async fn code_for(&self, account: AccountId, purpose: ChallengePurpose) -> Result<String> {
        self.outbox
            .take(account, purpose)
            .await
            .ok_or(LedgerError::InvalidOrExpiredChallenge)
    }
}
