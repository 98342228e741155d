mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{enroll, test_service};
use tabungan::domain::{compute_balance, Cents, TransactionKind};

/// Launch a mix of deposits and withdrawals against one student from many
/// tasks at once. The per-student lock must serialize them so the final
/// balance equals the sequential sum and every call leaves a ledger row.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_on_one_student() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let student = enroll(&service, "2024-001", "Siti Rahma").await?;

    // Seed enough that no withdrawal can outrun the deposits regardless of
    // the order the tasks are admitted in.
    service
        .record_transaction(student.id, TransactionKind::Deposit, 100_000, None)
        .await?;

    let mut expected: Cents = 100_000;
    let mut handles = Vec::new();
    for i in 0..20i64 {
        let kind = if i % 2 == 0 {
            TransactionKind::Deposit
        } else {
            TransactionKind::Withdrawal
        };
        let amount = 1000 + i * 10;
        expected += match kind {
            TransactionKind::Deposit => amount,
            TransactionKind::Withdrawal => -amount,
        };

        let service = Arc::clone(&service);
        let student_id = student.id;
        handles.push(tokio::spawn(async move {
            service
                .record_transaction(student_id, kind, amount, None)
                .await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    let cached = service.get_student(student.id).await?.balance_cents;
    let transactions = service.list_transactions(student.id).await?;

    assert_eq!(cached, expected);
    // Seed plus the 20 concurrent calls.
    assert_eq!(transactions.len(), 21);
    assert_eq!(cached, compute_balance(student.id, &transactions));

    Ok(())
}

/// Transactions for different students run from concurrent tasks must not
/// corrupt either balance.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_on_different_students() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let first = enroll(&service, "2024-002", "Budi Santoso").await?;
    let second = enroll(&service, "2024-003", "Ayu Lestari").await?;

    let mut handles = Vec::new();
    for i in 1..=10i64 {
        for student_id in [first.id, second.id] {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .record_transaction(student_id, TransactionKind::Deposit, i * 100, None)
                    .await
            }));
        }
    }

    for handle in handles {
        handle.await??;
    }

    // Each student received deposits of 100..=1000.
    for student in [&first, &second] {
        let cached = service.get_student(student.id).await?.balance_cents;
        let transactions = service.list_transactions(student.id).await?;

        assert_eq!(cached, 5500);
        assert_eq!(transactions.len(), 10);
        assert_eq!(cached, compute_balance(student.id, &transactions));
    }

    Ok(())
}

/// Concurrent withdrawals that together exceed the balance: some succeed,
/// the rest fail with InsufficientFunds, and the invariant holds throughout.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let student = enroll(&service, "2024-004", "Dewi Anggraini").await?;

    service
        .record_transaction(student.id, TransactionKind::Deposit, 5000, None)
        .await?;

    // Ten withdrawals of 10.00 against a 50.00 balance: exactly five can win.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = Arc::clone(&service);
        let student_id = student.id;
        handles.push(tokio::spawn(async move {
            service
                .record_transaction(student_id, TransactionKind::Withdrawal, 1000, None)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);

    let cached = service.get_student(student.id).await?.balance_cents;
    let transactions = service.list_transactions(student.id).await?;

    assert_eq!(cached, 0);
    // The seed deposit plus the five successful withdrawals.
    assert_eq!(transactions.len(), 6);
    assert_eq!(cached, compute_balance(student.id, &transactions));

    Ok(())
}
