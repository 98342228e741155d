use std::collections::HashMap;
use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::application::{LedgerService, StudentFilter};
use crate::domain::{format_cents, parse_amount, Student, Transaction, TransactionKind};
use crate::io::Exporter;

/// Tabungan - School Savings Ledger
#[derive(Parser)]
#[command(name = "tabungan")]
#[command(about = "A savings ledger tracking student deposits and withdrawals")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "tabungan.db")]
    pub database: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Student directory commands
    #[command(subcommand)]
    Student(StudentCommands),

    /// Record a deposit for a student
    Deposit {
        /// Student registration number
        number: String,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        /// Description of the deposit
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// Record a withdrawal for a student
    Withdraw {
        /// Student registration number
        number: String,

        /// Amount to withdraw (e.g., "50.00" or "50")
        amount: String,

        /// Description of the withdrawal
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// Look up a student's balance by registration number
    Balance {
        /// Student registration number
        number: String,
    },

    /// List transactions, newest first
    Transactions {
        /// Filter by student registration number
        #[arg(long)]
        student: Option<String>,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show totals, today's activity and recent transactions
    Dashboard,

    /// Show whole-school totals and top savers
    Summary,

    /// Verify that cached balances match the transaction ledger
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: students, transactions, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum StudentCommands {
    /// Enroll a new student
    Enroll {
        /// Registration number, unique across the school
        number: String,

        /// Student's display name
        name: String,

        /// Class label, e.g. "7A"
        #[arg(long = "class")]
        class_label: Option<String>,
    },

    /// List students
    List {
        /// Match a substring of name or registration number
        #[arg(long)]
        search: Option<String>,

        /// Filter by exact class label
        #[arg(long = "class")]
        class_label: Option<String>,
    },

    /// Show a student with their transaction history
    Show {
        /// Student registration number
        number: String,
    },

    /// Remove a student (only allowed once their balance is zero)
    Remove {
        /// Student registration number
        number: String,
    },

    /// List class labels in use
    Classes,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Student(student_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_student_command(&service, student_cmd).await?;
            }

            Commands::Deposit {
                number,
                amount,
                description,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                record_command(
                    &service,
                    &number,
                    &amount,
                    TransactionKind::Deposit,
                    description,
                )
                .await?;
            }

            Commands::Withdraw {
                number,
                amount,
                description,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                record_command(
                    &service,
                    &number,
                    &amount,
                    TransactionKind::Withdrawal,
                    description,
                )
                .await?;
            }

            Commands::Balance { number } => {
                let service = LedgerService::connect(&self.database).await?;
                let student = service.get_student_by_number(&number).await?;
                println!(
                    "{} ({}): {}",
                    student.name,
                    student.number,
                    format_cents(student.balance_cents)
                );
            }

            Commands::Transactions { student, limit } => {
                let service = LedgerService::connect(&self.database).await?;
                run_transactions_command(&service, student.as_deref(), limit).await?;
            }

            Commands::Dashboard => {
                let service = LedgerService::connect(&self.database).await?;
                run_dashboard_command(&service).await?;
            }

            Commands::Summary => {
                let service = LedgerService::connect(&self.database).await?;
                run_summary_command(&service).await?;
            }

            Commands::Check => {
                let service = LedgerService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(&service, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn record_command(
    service: &LedgerService,
    number: &str,
    amount: &str,
    kind: TransactionKind,
    description: Option<String>,
) -> Result<()> {
    let amount_cents =
        parse_amount(amount).context("Invalid amount format. Use '50.00' or '50'")?;

    let student = service.get_student_by_number(number).await?;
    let transaction = service
        .record_transaction(student.id, kind, amount_cents, description)
        .await?;
    let updated = service.get_student(student.id).await?;

    println!(
        "Recorded {}: {} for {} ({}), balance now {}",
        transaction.kind,
        format_cents(transaction.amount_cents),
        updated.name,
        updated.number,
        format_cents(updated.balance_cents)
    );

    Ok(())
}

async fn run_student_command(service: &LedgerService, cmd: StudentCommands) -> Result<()> {
    match cmd {
        StudentCommands::Enroll {
            number,
            name,
            class_label,
        } => {
            let student = service.enroll_student(number, name, class_label).await?;
            println!("Enrolled student: {} ({})", student.name, student.number);
        }

        StudentCommands::List {
            search,
            class_label,
        } => {
            let students = service
                .list_students(StudentFilter {
                    search,
                    class_label,
                })
                .await?;

            if students.is_empty() {
                println!("No students found.");
            } else {
                print_student_table(&students);
            }
        }

        StudentCommands::Show { number } => {
            let student = service.get_student_by_number(&number).await?;
            let transactions = service.list_transactions(student.id).await?;

            println!("Student: {}", student.name);
            println!("  Number:    {}", student.number);
            if let Some(class_label) = &student.class_label {
                println!("  Class:     {}", class_label);
            }
            println!(
                "  Enrolled:  {}",
                student.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Balance:   {}", format_cents(student.balance_cents));
            println!();

            if transactions.is_empty() {
                println!("No transactions recorded.");
            } else {
                println!(
                    "{:<6} {:<20} {:<12} {:>12}  {}",
                    "SEQ", "DATE", "KIND", "AMOUNT", "DESCRIPTION"
                );
                println!("{}", "-".repeat(72));
                for transaction in &transactions {
                    print_transaction_row(transaction, None);
                }
            }
        }

        StudentCommands::Remove { number } => {
            let student = service.get_student_by_number(&number).await?;
            let removed = service.remove_student(student.id).await?;
            println!("Removed student: {} ({})", removed.name, removed.number);
        }

        StudentCommands::Classes => {
            let class_labels = service.list_class_labels().await?;
            if class_labels.is_empty() {
                println!("No class labels in use.");
            } else {
                for class_label in class_labels {
                    println!("{class_label}");
                }
            }
        }
    }

    Ok(())
}

async fn run_transactions_command(
    service: &LedgerService,
    student_number: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let mut transactions = match student_number {
        Some(number) => {
            let student = service.get_student_by_number(number).await?;
            service.list_transactions(student.id).await?
        }
        None => service.list_all_transactions().await?,
    };

    // Admission order comes back oldest first; display newest first.
    transactions.reverse();
    if let Some(limit) = limit {
        transactions.truncate(limit);
    }

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let numbers = student_numbers(service).await?;

    println!(
        "{:<6} {:<20} {:<10} {:<12} {:>12}  {}",
        "SEQ", "DATE", "STUDENT", "KIND", "AMOUNT", "DESCRIPTION"
    );
    println!("{}", "-".repeat(82));
    for transaction in &transactions {
        print_transaction_row(
            transaction,
            Some(
                numbers
                    .get(&transaction.student_id)
                    .map(String::as_str)
                    .unwrap_or("?"),
            ),
        );
    }

    Ok(())
}

async fn run_dashboard_command(service: &LedgerService) -> Result<()> {
    let report = service.dashboard_report(Utc::now()).await?;

    println!("Dashboard");
    println!(
        "  Total balance:       {}",
        format_cents(report.total_balance_cents)
    );
    println!("  Students:            {}", report.student_count);
    println!("  Transactions today:  {}", report.transactions_today);
    println!();

    if report.recent_transactions.is_empty() {
        println!("No transactions recorded yet.");
    } else {
        println!("Recent transactions:");
        for recent in &report.recent_transactions {
            println!(
                "  {} {} {} ({}) {}",
                recent.transaction.created_at.format("%Y-%m-%d %H:%M"),
                recent.transaction.kind,
                format_cents(recent.transaction.amount_cents),
                recent.student_number,
                recent.student_name
            );
        }
    }

    Ok(())
}

async fn run_summary_command(service: &LedgerService) -> Result<()> {
    let summary = service.school_summary().await?;

    println!("School summary");
    println!(
        "  Total balance:    {}",
        format_cents(summary.total_balance_cents)
    );
    println!(
        "  Total deposited:  {}",
        format_cents(summary.total_deposited_cents)
    );
    println!(
        "  Total withdrawn:  {}",
        format_cents(summary.total_withdrawn_cents)
    );
    println!(
        "  Net ledger:       {}",
        format_cents(summary.net_ledger_cents())
    );
    println!("  Students:         {}", summary.student_count);
    println!();

    if summary.top_savers.is_empty() {
        println!("No students enrolled yet.");
    } else {
        println!("Top savers:");
        for student in &summary.top_savers {
            println!(
                "  {:<10} {:<24} {:>12}",
                student.number,
                student.name,
                format_cents(student.balance_cents)
            );
        }
    }

    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    let report = service.verify_integrity().await?;

    println!("Ledger integrity check");
    println!("  Students:             {}", report.student_count);
    println!("  Transactions:         {}", report.transaction_count);
    println!("  Orphaned rows:        {}", report.orphaned_transactions);
    println!("  Invalid amounts:      {}", report.invalid_amounts);
    println!("  Balance mismatches:   {}", report.mismatches.len());

    if report.is_clean() {
        println!();
        println!("OK: every cached balance matches the ledger.");
        return Ok(());
    }

    for mismatch in &report.mismatches {
        println!(
            "  MISMATCH {} ({}): cached {} but ledger says {}",
            mismatch.number,
            mismatch.name,
            format_cents(mismatch.cached_cents),
            format_cents(mismatch.ledger_cents)
        );
    }

    anyhow::bail!("Ledger integrity check failed")
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Could not create file '{path}'"))?,
        ),
        None => Box::new(std::io::stdout()),
    };

    match export_type {
        "students" => {
            let count = exporter.export_students_csv(writer).await?;
            eprintln!("Exported {count} students");
        }
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            eprintln!("Exported {count} transactions");
        }
        "full" => {
            exporter.export_full_json(writer).await?;
            eprintln!("Exported full snapshot");
        }
        other => anyhow::bail!(
            "Unknown export type '{}'. Valid types: students, transactions, full",
            other
        ),
    }

    Ok(())
}

async fn student_numbers(service: &LedgerService) -> Result<HashMap<uuid::Uuid, String>> {
    let students = service.list_students(StudentFilter::default()).await?;
    Ok(students
        .into_iter()
        .map(|student| (student.id, student.number))
        .collect())
}

fn print_student_table(students: &[Student]) {
    println!(
        "{:<10} {:<24} {:<8} {:>12}",
        "NUMBER", "NAME", "CLASS", "BALANCE"
    );
    println!("{}", "-".repeat(58));
    for student in students {
        println!(
            "{:<10} {:<24} {:<8} {:>12}",
            student.number,
            student.name,
            student.class_label.as_deref().unwrap_or("-"),
            format_cents(student.balance_cents)
        );
    }
}

fn print_transaction_row(transaction: &Transaction, student_number: Option<&str>) {
    match student_number {
        Some(number) => println!(
            "{:<6} {:<20} {:<10} {:<12} {:>12}  {}",
            transaction.sequence,
            transaction.created_at.format("%Y-%m-%d %H:%M:%S"),
            number,
            transaction.kind.as_str(),
            format_cents(transaction.amount_cents),
            transaction.description.as_deref().unwrap_or("")
        ),
        None => println!(
            "{:<6} {:<20} {:<12} {:>12}  {}",
            transaction.sequence,
            transaction.created_at.format("%Y-%m-%d %H:%M:%S"),
            transaction.kind.as_str(),
            format_cents(transaction.amount_cents),
            transaction.description.as_deref().unwrap_or("")
        ),
    }
}
