use thiserror::Error;

use crate::domain::Cents;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("Student already enrolled: {0}")]
    StudentAlreadyExists(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds for student {number}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        number: String,
        balance: Cents,
        requested: Cents,
    },

    #[error("Student {number} still holds a balance of {balance}; withdraw it before removal")]
    OutstandingBalance { number: String, balance: Cents },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
