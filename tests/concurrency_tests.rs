mod common;

use common::Harness;
use custody_ledger::application::orchestrator::{TransferDestination, TransferRequest};
use custody_ledger::domain::account::{AccountId, Amount, OwnerId};
use custody_ledger::domain::challenge::ChallengePurpose;
use custody_ledger::error::LedgerError;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    let h = Harness::new();
    h.open(1, 1, 1_000_000).await;
    h.open(2, 2, 1_000_000).await;
    let ledger = h.orchestrator().ledger().clone();

    let mut tasks = Vec::new();
    for i in 0..200u64 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            let (from, to) = if i % 2 == 0 {
                (AccountId(1), AccountId(2))
            } else {
                (AccountId(2), AccountId(1))
            };
            // Callers list accounts in whatever order suits them.
            let mut guard = ledger.lock_accounts([from, to]).await.unwrap();
            guard.debit(from, Amount::new(10).unwrap()).unwrap();
            tokio::task::yield_now().await;
            guard.credit(to, Amount::new(10).unwrap()).unwrap();
            ledger.commit(guard, Vec::new()).await.unwrap();
        }));
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        for task in tasks {
            task.await.unwrap();
        }
    })
    .await
    .expect("transfers deadlocked");

    assert_eq!(h.balance(1).await, 1_000_000);
    assert_eq!(h.balance(2).await, 1_000_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirms_of_one_code_apply_once() {
    let h = Arc::new(Harness::new());
    h.open(1, 1, 10_000).await;
    h.open(2, 2, 0).await;

    let request = TransferRequest {
        source: AccountId(1),
        destination: TransferDestination::Account(AccountId(2)),
        amount: 4_000,
        description: None,
    };
    h.orchestrator().initiate_transfer(OwnerId(1), &request).await.unwrap();
    let code = h.code(1, ChallengePurpose::Transfer).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let request = request.clone();
        let code = code.clone();
        tasks.push(tokio::spawn(async move {
            h.orchestrator()
                .confirm_transfer(OwnerId(1), &request, &code)
                .await
        }));
    }

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => applied += 1,
            Err(LedgerError::InvalidOrExpiredChallenge) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(h.balance(1).await, 6_000);
    assert_eq!(h.balance(2).await, 4_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_transfers_never_overdraw() {
    let h = Arc::new(Harness::new());
    h.open(1, 1, 10_000).await;
    for id in 2..=11 {
        h.open(id, id, 0).await;
    }

    // Ten debits of 2000 against a balance of 10000: exactly five fit.
    let ledger = h.orchestrator().ledger().clone();
    let mut tasks = Vec::new();
    for to in 2..=11u64 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            let mut guard = ledger.lock_accounts([AccountId(1), AccountId(to)]).await?;
            guard.debit(AccountId(1), Amount::new(2_000)?)?;
            guard.credit(AccountId(to), Amount::new(2_000)?)?;
            ledger.commit(guard, Vec::new()).await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(succeeded, 5);
    assert_eq!(h.balance(1).await, 0);

    let mut credited = 0;
    for id in 2..=11 {
        credited += h.balance(id).await;
    }
    assert_eq!(credited, 10_000);
}
