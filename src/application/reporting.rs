use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Student, Transaction};

/// The figures the dashboard page shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub generated_at: DateTime<Utc>,
    /// Sum of every student's cached balance.
    pub total_balance_cents: Cents,
    pub student_count: i64,
    /// Transactions recorded on `generated_at`'s UTC date.
    pub transactions_today: i64,
    /// Newest first.
    pub recent_transactions: Vec<RecentTransaction>,
}

/// A ledger row joined with its student for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTransaction {
    pub transaction: Transaction,
    pub student_number: String,
    pub student_name: String,
}

/// The public landing-page figures: whole-school totals and top savers.
///
/// `total_balance_cents` comes from the cached balances and the
/// deposited/withdrawn pair from the ledger itself; when the balance
/// invariant holds, `deposited - withdrawn == total_balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolSummary {
    pub total_balance_cents: Cents,
    pub total_deposited_cents: Cents,
    pub total_withdrawn_cents: Cents,
    pub student_count: i64,
    /// Students with the highest balances, highest first.
    pub top_savers: Vec<Student>,
}

impl SchoolSummary {
    /// Net money held according to the ledger alone.
    pub fn net_ledger_cents(&self) -> Cents {
        self.total_deposited_cents - self.total_withdrawn_cents
    }
}
