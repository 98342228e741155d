use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::{
    build_integrity_report, Cents, IntegrityReport, Student, StudentId, Transaction,
    TransactionKind,
};
use crate::storage::Repository;

use super::reporting::{DashboardReport, RecentTransaction, SchoolSummary};
use super::AppError;

/// How many recent transactions the dashboard shows.
const RECENT_TRANSACTIONS: i64 = 5;

/// How many top savers the school summary shows.
const TOP_SAVERS: i64 = 3;

/// Application service owning the balance invariant: a student's cached
/// balance always equals the signed sum of their transactions. This is the
/// primary interface for any client (CLI, web handler, etc.) and the only
/// writer of balances and ledger rows.
pub struct LedgerService {
    repo: Repository,
    /// One async mutex per student. Holding it admits at most one balance
    /// mutation for that student at a time; mutations for different
    /// students never contend here.
    student_locks: Mutex<HashMap<StudentId, Arc<AsyncMutex<()>>>>,
}

/// Filter for querying the student directory.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    /// Substring match over name and registration number.
    pub search: Option<String>,
    /// Exact class label match.
    pub class_label: Option<String>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            student_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    fn mutation_lock(&self, id: StudentId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .student_locks
            .lock()
            .expect("student lock table poisoned");
        locks.entry(id).or_default().clone()
    }

    fn forget_lock(&self, id: StudentId) {
        let mut locks = self
            .student_locks
            .lock()
            .expect("student lock table poisoned");
        locks.remove(&id);
    }

    // ========================
    // Student directory
    // ========================

    /// Enroll a new student. The balance starts at zero; an opening amount
    /// is recorded as an ordinary deposit so the ledger accounts for every
    /// cent the cache holds.
    pub async fn enroll_student(
        &self,
        number: String,
        name: String,
        class_label: Option<String>,
    ) -> Result<Student, AppError> {
        if self.repo.get_student_by_number(&number).await?.is_some() {
            return Err(AppError::StudentAlreadyExists(number));
        }

        let mut student = Student::new(number, name);
        if let Some(class_label) = class_label {
            student = student.with_class_label(class_label);
        }

        self.repo.save_student(&student).await?;

        tracing::info!(student = %student.number, "enrolled student");
        Ok(student)
    }

    /// Get a student by ID.
    pub async fn get_student(&self, id: StudentId) -> Result<Student, AppError> {
        self.repo
            .get_student(id)
            .await?
            .ok_or_else(|| AppError::StudentNotFound(id.to_string()))
    }

    /// Balance lookup by the external student-facing registration number.
    pub async fn get_student_by_number(&self, number: &str) -> Result<Student, AppError> {
        self.repo
            .get_student_by_number(number)
            .await?
            .ok_or_else(|| AppError::StudentNotFound(number.to_string()))
    }

    /// List students matching `filter`, ordered by name.
    pub async fn list_students(&self, filter: StudentFilter) -> Result<Vec<Student>, AppError> {
        Ok(self
            .repo
            .list_students(filter.search.as_deref(), filter.class_label.as_deref())
            .await?)
    }

    /// Distinct class labels in use.
    pub async fn list_class_labels(&self) -> Result<Vec<String>, AppError> {
        Ok(self.repo.list_class_labels().await?)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Record a deposit or withdrawal for one student.
    ///
    /// Runs as a single atomic unit: the student's row is locked, the
    /// balance is re-read under that lock, and the new balance and the
    /// ledger row are persisted together. On any failure the unit rolls
    /// back whole; a partial write is never observable.
    ///
    /// # Errors
    /// - [AppError::InvalidAmount] for a non-positive amount (checked
    ///   before any mutation is attempted),
    /// - [AppError::StudentNotFound] when the student does not exist,
    /// - [AppError::InsufficientFunds] when a withdrawal exceeds the
    ///   current balance,
    /// - [AppError::Database] for storage failures; the unit has rolled
    ///   back and the identical call may be retried.
    pub async fn record_transaction(
        &self,
        student_id: StudentId,
        kind: TransactionKind,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        // Admission order on this lock is the order balance mutations are
        // applied for the student.
        let lock = self.mutation_lock(student_id);
        let _guard = lock.lock().await;

        let mut unit = self.repo.begin().await?;

        if !self.repo.lock_student_row(&mut unit, student_id).await? {
            return Err(AppError::StudentNotFound(student_id.to_string()));
        }

        let student = self
            .repo
            .get_student_in_unit(&mut unit, student_id)
            .await?
            .ok_or_else(|| AppError::StudentNotFound(student_id.to_string()))?;

        let new_balance = match kind {
            TransactionKind::Deposit => student
                .balance_cents
                .checked_add(amount_cents)
                .ok_or_else(|| {
                    AppError::InvalidAmount("Deposit would overflow the balance".to_string())
                })?,
            TransactionKind::Withdrawal => {
                if amount_cents > student.balance_cents {
                    // Dropping the unit rolls it back; nothing was written.
                    return Err(AppError::InsufficientFunds {
                        number: student.number,
                        balance: student.balance_cents,
                        requested: amount_cents,
                    });
                }
                student.balance_cents - amount_cents
            }
        };

        let mut transaction = Transaction::new(student_id, kind, amount_cents);
        if let Some(description) = description {
            transaction = transaction.with_description(description);
        }

        self.repo
            .update_balance(&mut unit, student_id, new_balance)
            .await?;
        self.repo
            .insert_transaction(&mut unit, &mut transaction)
            .await?;
        self.repo.commit(unit).await?;

        tracing::info!(
            student = %student.number,
            kind = %kind,
            amount_cents,
            balance_cents = new_balance,
            "recorded transaction"
        );

        Ok(transaction)
    }

    /// A student's transactions in the order they were admitted.
    pub async fn list_transactions(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self.repo.list_transactions_for_student(student_id).await?)
    }

    /// The whole ledger in admission order.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        Ok(self.repo.list_all_transactions().await?)
    }

    // ========================
    // Deletion guard
    // ========================

    /// Whether the student may be removed: true only when their balance is
    /// zero. A consistent read; [LedgerService::remove_student] re-checks
    /// under the row lock before actually deleting.
    pub async fn can_delete(&self, student_id: StudentId) -> Result<bool, AppError> {
        let student = self.get_student(student_id).await?;
        Ok(!student.holds_funds())
    }

    /// Remove a student and their ledger rows.
    ///
    /// The balance check and the deletion run as one atomic unit under the
    /// same per-student lock as [LedgerService::record_transaction], so a
    /// deposit admitted concurrently can never be orphaned by the removal.
    pub async fn remove_student(&self, student_id: StudentId) -> Result<Student, AppError> {
        let lock = self.mutation_lock(student_id);
        let _guard = lock.lock().await;

        let mut unit = self.repo.begin().await?;

        if !self.repo.lock_student_row(&mut unit, student_id).await? {
            return Err(AppError::StudentNotFound(student_id.to_string()));
        }

        let student = self
            .repo
            .get_student_in_unit(&mut unit, student_id)
            .await?
            .ok_or_else(|| AppError::StudentNotFound(student_id.to_string()))?;

        if student.holds_funds() {
            return Err(AppError::OutstandingBalance {
                number: student.number,
                balance: student.balance_cents,
            });
        }

        let ledger_rows = self
            .repo
            .delete_student_records(&mut unit, student_id)
            .await?;
        self.repo.commit(unit).await?;

        // Student ids are never reused, so dropping the lock entry is safe
        // even if a late caller still holds a clone of it.
        self.forget_lock(student_id);

        tracing::info!(student = %student.number, ledger_rows, "removed student");
        Ok(student)
    }

    // ========================
    // Reports
    // ========================

    /// The dashboard figures: totals, today's activity and the most recent
    /// transactions. `now` decides which UTC day counts as "today".
    pub async fn dashboard_report(&self, now: DateTime<Utc>) -> Result<DashboardReport, AppError> {
        let total_balance_cents = self.repo.total_balance().await?;
        let student_count = self.repo.count_students().await?;
        let transactions_today = self.repo.count_transactions_on(now.date_naive()).await?;

        let recent_transactions = self
            .repo
            .recent_transactions(RECENT_TRANSACTIONS)
            .await?
            .into_iter()
            .map(|(transaction, student_number, student_name)| RecentTransaction {
                transaction,
                student_number,
                student_name,
            })
            .collect();

        Ok(DashboardReport {
            generated_at: now,
            total_balance_cents,
            student_count,
            transactions_today,
            recent_transactions,
        })
    }

    /// Whole-school totals and the top savers.
    pub async fn school_summary(&self) -> Result<SchoolSummary, AppError> {
        let total_balance_cents = self.repo.total_balance().await?;
        let total_deposited_cents = self
            .repo
            .sum_amount_for_kind(TransactionKind::Deposit)
            .await?;
        let total_withdrawn_cents = self
            .repo
            .sum_amount_for_kind(TransactionKind::Withdrawal)
            .await?;
        let student_count = self.repo.count_students().await?;
        let top_savers = self.repo.top_students(TOP_SAVERS).await?;

        Ok(SchoolSummary {
            total_balance_cents,
            total_deposited_cents,
            total_withdrawn_cents,
            student_count,
            top_savers,
        })
    }

    /// Recompute every student's balance from the ledger and report any
    /// disagreement with the cached values.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.integrity_stats().await?;
        let students = self.repo.list_students(None, None).await?;
        let totals = self.repo.ledger_totals().await?;

        let report = build_integrity_report(
            &students,
            &totals,
            stats.transaction_count,
            stats.orphaned_transactions,
            stats.invalid_amounts,
        );

        if !report.is_clean() {
            tracing::error!(
                mismatches = report.mismatches.len(),
                orphaned = report.orphaned_transactions,
                invalid = report.invalid_amounts,
                "ledger integrity check failed"
            );
        }

        Ok(report)
    }
}
