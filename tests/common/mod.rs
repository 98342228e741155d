// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use tabungan::application::LedgerService;
use tabungan::domain::{Cents, Student, TransactionKind};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Enroll a student without a class label.
pub async fn enroll(service: &LedgerService, number: &str, name: &str) -> Result<Student> {
    Ok(service
        .enroll_student(number.to_string(), name.to_string(), None)
        .await?)
}

/// Enroll a student into a class.
pub async fn enroll_in_class(
    service: &LedgerService,
    number: &str,
    name: &str,
    class_label: &str,
) -> Result<Student> {
    Ok(service
        .enroll_student(
            number.to_string(),
            name.to_string(),
            Some(class_label.to_string()),
        )
        .await?)
}

/// Record a deposit for a student.
pub async fn deposit(service: &LedgerService, student: &Student, cents: Cents) -> Result<()> {
    service
        .record_transaction(student.id, TransactionKind::Deposit, cents, None)
        .await?;
    Ok(())
}

/// Record a withdrawal for a student.
pub async fn withdraw(service: &LedgerService, student: &Student, cents: Cents) -> Result<()> {
    service
        .record_transaction(student.id, TransactionKind::Withdrawal, cents, None)
        .await?;
    Ok(())
}
