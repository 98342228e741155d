use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type StudentId = Uuid;

/// A student enrolled in the savings program.
///
/// `balance_cents` is a cached value maintained exclusively by the ledger
/// service: at every transaction boundary it equals the signed sum of the
/// student's transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// External student-facing identifier (registration number), unique.
    pub number: String,
    pub name: String,
    /// Class the student belongs to, e.g. "7A". Used for filtering lists.
    pub class_label: Option<String>,
    /// Cached balance in cents, never negative.
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// Enroll a new student. The balance always starts at zero; money only
    /// enters through recorded deposits so the cached balance stays equal
    /// to the transaction ledger.
    pub fn new(number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: number.into(),
            name: name.into(),
            class_label: None,
            balance_cents: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_class_label(mut self, class_label: impl Into<String>) -> Self {
        self.class_label = Some(class_label.into());
        self
    }

    /// True when the student still holds money and therefore must not be
    /// removed from the directory.
    pub fn holds_funds(&self) -> bool {
        self.balance_cents != 0
    }
}
