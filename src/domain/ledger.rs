use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Cents, Student, StudentId, Transaction};

/// Compute a student's balance from their transactions.
/// Balance = sum of signed amounts (deposits positive, withdrawals negative).
pub fn compute_balance(student_id: StudentId, transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .filter(|t| t.student_id == student_id)
        .map(Transaction::signed_amount)
        .sum()
}

/// Compute balances for all students present in a list of transactions.
/// Returns a map of student_id -> balance. Students with no transactions
/// won't be in the map (balance = 0).
pub fn compute_all_balances(transactions: &[Transaction]) -> HashMap<StudentId, Cents> {
    let mut balances: HashMap<StudentId, Cents> = HashMap::new();

    for transaction in transactions {
        *balances.entry(transaction.student_id).or_insert(0) += transaction.signed_amount();
    }

    balances
}

/// A student whose cached balance disagrees with the transaction ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub student_id: StudentId,
    pub number: String,
    pub name: String,
    pub cached_cents: Cents,
    pub ledger_cents: Cents,
}

/// Result of verifying that every cached balance matches the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub student_count: i64,
    pub transaction_count: i64,
    /// Transactions referencing a student that no longer exists.
    pub orphaned_transactions: i64,
    /// Transactions with a non-positive amount.
    pub invalid_amounts: i64,
    pub mismatches: Vec<BalanceMismatch>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
            && self.orphaned_transactions == 0
            && self.invalid_amounts == 0
    }
}

/// Compare every student's cached balance against the signed sum of their
/// ledger rows. `ledger_totals` maps student id to that sum; students absent
/// from the map have an empty ledger and must be at zero.
pub fn build_integrity_report(
    students: &[Student],
    ledger_totals: &HashMap<StudentId, Cents>,
    transaction_count: i64,
    orphaned_transactions: i64,
    invalid_amounts: i64,
) -> IntegrityReport {
    let mismatches = students
        .iter()
        .filter_map(|student| {
            let ledger_cents = ledger_totals.get(&student.id).copied().unwrap_or(0);
            if ledger_cents != student.balance_cents {
                Some(BalanceMismatch {
                    student_id: student.id,
                    number: student.number.clone(),
                    name: student.name.clone(),
                    cached_cents: student.balance_cents,
                    ledger_cents,
                })
            } else {
                None
            }
        })
        .collect();

    IntegrityReport {
        student_count: students.len() as i64,
        transaction_count,
        orphaned_transactions,
        invalid_amounts,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::TransactionKind;

    fn make_transaction(student_id: StudentId, kind: TransactionKind, amount: Cents) -> Transaction {
        Transaction::new(student_id, kind, amount)
    }

    #[test]
    fn test_compute_balance_empty() {
        let student = Uuid::new_v4();
        assert_eq!(compute_balance(student, &[]), 0);
    }

    #[test]
    fn test_compute_balance_mixed() {
        let siti = Uuid::new_v4();
        let budi = Uuid::new_v4();

        let transactions = vec![
            make_transaction(siti, TransactionKind::Deposit, 10000),
            make_transaction(siti, TransactionKind::Withdrawal, 4000),
            make_transaction(budi, TransactionKind::Deposit, 2500),
        ];

        assert_eq!(compute_balance(siti, &transactions), 6000);
        assert_eq!(compute_balance(budi, &transactions), 2500);
    }

    #[test]
    fn test_compute_all_balances() {
        let siti = Uuid::new_v4();
        let budi = Uuid::new_v4();

        let transactions = vec![
            make_transaction(siti, TransactionKind::Deposit, 5000),
            make_transaction(budi, TransactionKind::Deposit, 3000),
            make_transaction(budi, TransactionKind::Withdrawal, 1000),
        ];

        let balances = compute_all_balances(&transactions);

        assert_eq!(balances.get(&siti), Some(&5000));
        assert_eq!(balances.get(&budi), Some(&2000));
    }

    #[test]
    fn test_integrity_report_clean() {
        let mut student = Student::new("2024-001", "Siti Rahma");
        student.balance_cents = 4200;

        let totals = HashMap::from([(student.id, 4200)]);
        let report = build_integrity_report(&[student], &totals, 3, 0, 0);

        assert!(report.is_clean());
        assert_eq!(report.student_count, 1);
        assert_eq!(report.transaction_count, 3);
    }

    #[test]
    fn test_integrity_report_detects_mismatch() {
        let mut student = Student::new("2024-002", "Budi Santoso");
        student.balance_cents = 5000;

        // Ledger says 4000: the cached balance drifted.
        let totals = HashMap::from([(student.id, 4000)]);
        let report = build_integrity_report(&[student], &totals, 2, 0, 0);

        assert!(!report.is_clean());
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].cached_cents, 5000);
        assert_eq!(report.mismatches[0].ledger_cents, 4000);
    }

    #[test]
    fn test_integrity_report_empty_ledger_requires_zero_balance() {
        let mut student = Student::new("2024-003", "Ayu Lestari");
        student.balance_cents = 100;

        let report = build_integrity_report(&[student], &HashMap::new(), 0, 0, 0);

        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].ledger_cents, 0);
    }
}
