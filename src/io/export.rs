use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::{LedgerService, StudentFilter};
use crate::domain::{format_cents, Student, StudentId, Transaction};

/// Database snapshot for full export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub students: Vec<Student>,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to CSV or JSON.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the student directory with balances to CSV.
    pub async fn export_students_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let students = self.service.list_students(StudentFilter::default()).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["number", "name", "class", "balance", "enrolled_at"])?;

        let mut count = 0;
        for student in &students {
            csv_writer.write_record([
                student.number.clone(),
                student.name.clone(),
                student.class_label.clone().unwrap_or_default(),
                format_cents(student.balance_cents),
                student.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the whole ledger to CSV in admission order.
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self.service.list_all_transactions().await?;
        let numbers = self.student_numbers().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "sequence",
            "created_at",
            "student",
            "kind",
            "amount",
            "description",
        ])?;

        let mut count = 0;
        for transaction in &transactions {
            let student_number = numbers
                .get(&transaction.student_id)
                .cloned()
                .unwrap_or_default();

            csv_writer.write_record([
                transaction.sequence.to_string(),
                transaction.created_at.to_rfc3339(),
                student_number,
                transaction.kind.as_str().to_string(),
                format_cents(transaction.amount_cents),
                transaction.description.clone().unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export everything as a JSON snapshot.
    pub async fn export_full_json<W: Write>(&self, writer: W) -> Result<()> {
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            students: self.service.list_students(StudentFilter::default()).await?,
            transactions: self.service.list_all_transactions().await?,
        };

        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(())
    }

    async fn student_numbers(&self) -> Result<HashMap<StudentId, String>> {
        let students = self.service.list_students(StudentFilter::default()).await?;
        Ok(students
            .into_iter()
            .map(|student| (student.id, student.number))
            .collect())
    }
}
