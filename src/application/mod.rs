//! Application layer containing the ledger engine.
//!
//! `BalanceLedger` owns balances and the ordered account locks,
//! `ChallengeIssuer` the one-time codes, `TransferOrchestrator` the
//! initiate/confirm protocol and `SettlementWorker` the asynchronous payout
//! state machine. `LedgerEngine` wires them together over injected storage
//! and collaborators.

pub mod challenge_issuer;
pub mod engine;
pub mod ledger;
pub mod orchestrator;
pub mod settlement;

pub use challenge_issuer::{ChallengeIssuer, IssuedChallenge};
pub use engine::{Collaborators, LedgerEngine};
pub use ledger::{BalanceLedger, LedgerGuard};
pub use orchestrator::{
    AccountSummary, ChallengePreview, DepositOutcome, DepositRequest, TransferDestination,
    TransferOrchestrator, TransferRequest, WithdrawalRequest,
};
pub use settlement::{PayoutRouter, SettlementQueue, SettlementWorker, settlement_channel};
