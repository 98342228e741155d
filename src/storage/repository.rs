use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::{Cents, Student, StudentId, Transaction, TransactionKind};

use super::MIGRATION_001_INITIAL;

/// An in-flight atomic storage unit. Every statement executed against it
/// commits together or not at all; dropping the unit without committing
/// rolls everything back.
pub type StorageUnit<'t> = sqlx::Transaction<'t, Sqlite>;

/// Raw counts for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub transaction_count: i64,
    /// Transactions whose student no longer exists.
    pub orphaned_transactions: i64,
    /// Transactions that slipped in with a non-positive amount.
    pub invalid_amounts: i64,
}

/// Repository for persisting and querying students and their transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Student directory
    // ========================

    /// Save a newly enrolled student.
    pub async fn save_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, number, name, class_label, balance_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(student.id.to_string())
        .bind(&student.number)
        .bind(&student.name)
        .bind(&student.class_label)
        .bind(student.balance_cents)
        .bind(student.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save student")?;
        Ok(())
    }

    /// Get a student by ID.
    pub async fn get_student(&self, id: StudentId) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, name, class_label, balance_cents, created_at
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch student")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_student(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a student by their external registration number.
    pub async fn get_student_by_number(&self, number: &str) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, name, class_label, balance_cents, created_at
            FROM students
            WHERE number = ?
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch student by number")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_student(&row)?)),
            None => Ok(None),
        }
    }

    /// List students, optionally narrowed by a name/number substring and an
    /// exact class label.
    pub async fn list_students(
        &self,
        search: Option<&str>,
        class_label: Option<&str>,
    ) -> Result<Vec<Student>> {
        let mut query = String::from(
            "SELECT id, number, name, class_label, balance_cents, created_at FROM students WHERE 1=1",
        );

        let pattern = search.map(|s| format!("%{s}%"));

        if pattern.is_some() {
            query.push_str(" AND (name LIKE ? OR number LIKE ?)");
        }
        if class_label.is_some() {
            query.push_str(" AND class_label = ?");
        }
        query.push_str(" ORDER BY name");

        let mut sql_query = sqlx::query(&query);
        if let Some(ref pattern) = pattern {
            sql_query = sql_query.bind(pattern).bind(pattern);
        }
        if let Some(class_label) = class_label {
            sql_query = sql_query.bind(class_label);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list students")?;

        rows.iter().map(Self::row_to_student).collect()
    }

    /// Distinct class labels in use, for list filtering.
    pub async fn list_class_labels(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT class_label
            FROM students
            WHERE class_label IS NOT NULL AND class_label != ''
            ORDER BY class_label
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list class labels")?;

        Ok(rows.iter().map(|row| row.get("class_label")).collect())
    }

    // ========================
    // Atomic balance mutation
    // ========================

    /// Open a new atomic storage unit.
    pub async fn begin(&self) -> Result<StorageUnit<'static>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin storage unit")
    }

    /// Commit an atomic storage unit.
    pub async fn commit(&self, unit: StorageUnit<'_>) -> Result<()> {
        unit.commit()
            .await
            .context("Failed to commit storage unit")
    }

    /// Take the write lock on one student's row inside `unit` before
    /// anything is read, the SQLite rendition of `SELECT ... FOR UPDATE`.
    /// The self-assignment upgrades the unit to a writer immediately, so
    /// the balance read that follows cannot be stale and later writes
    /// cannot fail a snapshot upgrade. Returns false when no such student
    /// exists.
    pub async fn lock_student_row(
        &self,
        unit: &mut StorageUnit<'_>,
        id: StudentId,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE students SET balance_cents = balance_cents WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut **unit)
            .await
            .context("Failed to lock student row")?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-read a student inside an open unit (i.e. under the row lock).
    pub async fn get_student_in_unit(
        &self,
        unit: &mut StorageUnit<'_>,
        id: StudentId,
    ) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, name, class_label, balance_cents, created_at
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut **unit)
        .await
        .context("Failed to fetch student in unit")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_student(&row)?)),
            None => Ok(None),
        }
    }

    /// Persist a new cached balance for a student inside an open unit.
    pub async fn update_balance(
        &self,
        unit: &mut StorageUnit<'_>,
        id: StudentId,
        balance_cents: Cents,
    ) -> Result<()> {
        sqlx::query("UPDATE students SET balance_cents = ? WHERE id = ?")
            .bind(balance_cents)
            .bind(id.to_string())
            .execute(&mut **unit)
            .await
            .context("Failed to update balance")?;
        Ok(())
    }

    /// Append a transaction row inside an open unit.
    /// Assigns the next sequence number from the counter table so admission
    /// order is recorded by the same unit that moves the balance.
    pub async fn insert_transaction(
        &self,
        unit: &mut StorageUnit<'_>,
        transaction: &mut Transaction,
    ) -> Result<()> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut **unit)
        .await
        .context("Failed to assign transaction sequence")?;
        transaction.sequence = row.get("value");

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, student_id, kind, amount_cents, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.student_id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(&transaction.description)
        .bind(transaction.created_at.to_rfc3339())
        .execute(&mut **unit)
        .await
        .context("Failed to append transaction")?;

        Ok(())
    }

    /// Remove a student and their ledger rows inside an open unit. Callers
    /// must have verified the balance is zero under the row lock first.
    pub async fn delete_student_records(
        &self,
        unit: &mut StorageUnit<'_>,
        id: StudentId,
    ) -> Result<u64> {
        let transactions = sqlx::query("DELETE FROM transactions WHERE student_id = ?")
            .bind(id.to_string())
            .execute(&mut **unit)
            .await
            .context("Failed to delete student transactions")?;

        sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut **unit)
            .await
            .context("Failed to delete student")?;

        Ok(transactions.rows_affected())
    }

    // ========================
    // Ledger reads
    // ========================

    /// List a student's transactions in admission (sequence) order.
    pub async fn list_transactions_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, student_id, kind, amount_cents, description, created_at
            FROM transactions
            WHERE student_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(student_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for student")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List the whole ledger in admission order.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, student_id, kind, amount_cents, description, created_at
            FROM transactions
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// The most recent transactions with the owning student's number and
    /// name, newest first.
    pub async fn recent_transactions(
        &self,
        limit: i64,
    ) -> Result<Vec<(Transaction, String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.sequence, t.student_id, t.kind, t.amount_cents, t.description,
                   t.created_at, s.number, s.name
            FROM transactions t
            JOIN students s ON s.id = t.student_id
            ORDER BY t.sequence DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent transactions")?;

        rows.iter()
            .map(|row| {
                let transaction = Self::row_to_transaction(row)?;
                Ok((transaction, row.get("number"), row.get("name")))
            })
            .collect()
    }

    // ========================
    // Aggregates for reports
    // ========================

    /// Sum of all cached balances.
    pub async fn total_balance(&self) -> Result<Cents> {
        let row = sqlx::query("SELECT COALESCE(SUM(balance_cents), 0) as total FROM students")
            .fetch_one(&self.pool)
            .await
            .context("Failed to sum balances")?;

        Ok(row.get("total"))
    }

    pub async fn count_students(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM students")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count students")?;

        Ok(row.get("count"))
    }

    pub async fn count_transactions(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM transactions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;

        Ok(row.get("count"))
    }

    /// Count transactions created on one calendar day (UTC). Timestamps are
    /// stored as RFC 3339 text, so a date prefix match selects the day.
    pub async fn count_transactions_on(&self, date: NaiveDate) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM transactions WHERE created_at LIKE ?")
            .bind(format!("{date}%"))
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions for day")?;

        Ok(row.get("count"))
    }

    /// Lifetime sum of amounts for one transaction kind.
    pub async fn sum_amount_for_kind(&self, kind: TransactionKind) -> Result<Cents> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount_cents), 0) as total FROM transactions WHERE kind = ?",
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum transaction amounts")?;

        Ok(row.get("total"))
    }

    /// The top savers: students ordered by cached balance, highest first.
    pub async fn top_students(&self, limit: i64) -> Result<Vec<Student>> {
        let rows = sqlx::query(
            r#"
            SELECT id, number, name, class_label, balance_cents, created_at
            FROM students
            ORDER BY balance_cents DESC, name
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list top students")?;

        rows.iter().map(Self::row_to_student).collect()
    }

    // ========================
    // Integrity
    // ========================

    /// Per-student signed sums over the whole ledger, computed in SQL.
    pub async fn ledger_totals(&self) -> Result<HashMap<StudentId, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT student_id,
                   SUM(CASE WHEN kind = 'deposit' THEN amount_cents ELSE -amount_cents END) as total
            FROM transactions
            GROUP BY student_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute ledger totals")?;

        let mut totals = HashMap::new();
        for row in rows {
            let student_id_str: String = row.get("student_id");
            let student_id =
                Uuid::parse_str(&student_id_str).context("Invalid student ID in ledger")?;
            totals.insert(student_id, row.get::<Cents, _>("total"));
        }

        Ok(totals)
    }

    pub async fn integrity_stats(&self) -> Result<IntegrityStats> {
        let transaction_count = self.count_transactions().await?;

        let orphaned_transactions: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions t
            LEFT JOIN students s ON s.id = t.student_id
            WHERE s.id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count orphaned transactions")?
        .get("count");

        let invalid_amounts: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM transactions WHERE amount_cents <= 0")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count invalid amounts")?
                .get("count");

        Ok(IntegrityStats {
            transaction_count,
            orphaned_transactions,
            invalid_amounts,
        })
    }

    // ========================
    // Row mapping
    // ========================

    fn row_to_student(row: &sqlx::sqlite::SqliteRow) -> Result<Student> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Student {
            id: Uuid::parse_str(&id_str).context("Invalid student ID")?,
            number: row.get("number"),
            name: row.get("name"),
            class_label: row.get("class_label"),
            balance_cents: row.get("balance_cents"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let student_id_str: String = row.get("student_id");
        let kind_str: String = row.get("kind");
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            student_id: Uuid::parse_str(&student_id_str).context("Invalid student ID")?,
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            amount_cents: row.get("amount_cents"),
            description: row.get("description"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}
