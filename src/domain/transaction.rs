use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, StudentId};

pub type TransactionId = Uuid;

/// Whether a transaction puts money into or takes money out of a student's
/// balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionKind::Deposit),
            "withdrawal" => Some(TransactionKind::Withdrawal),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One deposit or withdrawal against a single student's balance.
/// Transactions are immutable once recorded; the ledger is append-only and
/// rows only disappear together with their student, after the deletion
/// guard has verified the balance is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing admission order, assigned by the repository
    /// inside the same atomic unit that moves the balance.
    pub sequence: i64,
    pub student_id: StudentId,
    pub kind: TransactionKind,
    /// Amount in cents, always positive; the kind carries the sign.
    pub amount_cents: Cents,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. The sequence number is assigned by the
    /// repository when the row is persisted.
    pub fn new(student_id: StudentId, kind: TransactionKind, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Transaction amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            student_id,
            kind,
            amount_cents,
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The amount with the kind's sign applied: positive for deposits,
    /// negative for withdrawals. Summing signed amounts yields the balance.
    pub fn signed_amount(&self) -> Cents {
        match self.kind {
            TransactionKind::Deposit => self.amount_cents,
            TransactionKind::Withdrawal => -self.amount_cents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [TransactionKind::Deposit, TransactionKind::Withdrawal] {
            let s = kind.as_str();
            let parsed = TransactionKind::from_str(s).unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_kind_from_str_rejects_unknown() {
        assert_eq!(TransactionKind::from_str("transfer"), None);
    }

    #[test]
    fn test_create_transaction() {
        let student_id = Uuid::new_v4();
        let transaction = Transaction::new(student_id, TransactionKind::Deposit, 5000)
            .with_description("Weekly savings");

        assert_eq!(transaction.student_id, student_id);
        assert_eq!(transaction.amount_cents, 5000);
        assert_eq!(transaction.description, Some("Weekly savings".to_string()));
        assert_eq!(transaction.signed_amount(), 5000);
    }

    #[test]
    fn test_withdrawal_signed_amount_is_negative() {
        let transaction = Transaction::new(Uuid::new_v4(), TransactionKind::Withdrawal, 2500);

        assert_eq!(transaction.signed_amount(), -2500);
    }

    #[test]
    #[should_panic(expected = "Transaction amount must be positive")]
    fn test_transaction_requires_positive_amount() {
        Transaction::new(Uuid::new_v4(), TransactionKind::Deposit, 0);
    }
}
