mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_malformed_rows_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("robustness.csv");
    common::write_script(
        &script,
        &[
            ["open", "1", "1", "", "", "NGN"],
            ["kyc", "1", "", "", "", "verified"],
            // Unknown op
            ["refund", "1", "1", "", "10", ""],
            // Text in amount field
            ["deposit", "1", "1", "", "ten", "card"],
            // Missing amount
            ["deposit", "1", "1", "", "", "card"],
            ["deposit", "1", "1", "", "300", "card"],
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("custody-ledger"));
    cmd.arg(&script);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading row"))
        .stderr(predicate::str::contains("Error processing Deposit row"))
        .stdout(predicate::str::contains("1,1,NGN,300,true"));
}

#[test]
fn test_rejected_operations_leave_balances() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("rejections.csv");
    common::write_script(
        &script,
        &[
            ["open", "1", "1", "", "", "NGN"],
            ["open", "2", "2", "", "", "NGN"],
            // Duplicate account
            ["open", "3", "1", "", "", "NGN"],
            ["kyc", "1", "", "", "", "verified"],
            ["deposit", "1", "1", "", "1000", "card"],
            // Recipient has no KYC
            ["transfer", "1", "1", "2", "100", ""],
            ["kyc", "2", "", "", "", "verified"],
            // Overdraw
            ["transfer", "1", "1", "2", "5000", ""],
            // Someone else's account
            ["transfer", "2", "1", "2", "100", ""],
            ["transfer", "1", "1", "2", "400", ""],
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("custody-ledger"));
    cmd.arg(&script);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Account already exists"))
        .stderr(predicate::str::contains("Invalid destination"))
        .stderr(predicate::str::contains("Insufficient funds"))
        .stderr(predicate::str::contains("Account not found"))
        .stdout(predicate::str::contains("1,1,NGN,600,true"))
        .stdout(predicate::str::contains("2,2,NGN,400,true"));
}

#[test]
fn test_many_withdrawals_settle_without_queue_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("withdrawals.csv");
    let config = dir.path().join("engine.yaml");
    std::fs::write(&config, "settlement:\n  queue_capacity: 1\n").unwrap();
    common::write_script(
        &script,
        &[
            ["open", "1", "1", "", "", "NGN"],
            ["kyc", "1", "", "", "", "verified"],
            ["deposit", "1", "1", "", "100000", "card"],
            ["destination", "1", "", "7", "", "bank:0123456789:058"],
            ["withdraw", "1", "1", "7", "1000", ""],
            ["withdraw", "1", "1", "7", "1000", ""],
            ["withdraw", "1", "1", "7", "1000", ""],
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("custody-ledger"));
    cmd.arg(&script).arg("--config").arg(&config).arg("--transactions");

    // Each withdrawal costs 1000 + 15 + 100.
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("queue full").not())
        .stdout(predicate::str::contains("1,1,NGN,96655,true"))
        .stdout(predicate::str::contains(",withdrawal,processing").not());
}
