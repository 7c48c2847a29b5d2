use thiserror::Error;

use crate::contract::error::MembershipError;

/// Domain-specific errors using thiserror
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Invoice not found: {invoice_number}")]
    InvoiceNotFound { invoice_number: String },

    #[error("Contract for user {user_id} is already finalized")]
    AlreadyFinalized { user_id: String },

    #[error("Invoice dates for user {user_id} are already saved")]
    DatesLocked { user_id: String },

    #[error("Invoice for user {user_id} and month {billing_month} already exists")]
    InvoiceExists {
        user_id: String,
        billing_month: String,
    },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },
}

impl DomainError {
    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::UserNotFound { id: id.into() }
    }

    pub fn invoice_not_found(invoice_number: impl Into<String>) -> Self {
        Self::InvoiceNotFound {
            invoice_number: invoice_number.into(),
        }
    }

    pub fn already_finalized(user_id: impl Into<String>) -> Self {
        Self::AlreadyFinalized {
            user_id: user_id.into(),
        }
    }

    pub fn dates_locked(user_id: impl Into<String>) -> Self {
        Self::DatesLocked {
            user_id: user_id.into(),
        }
    }

    pub fn invoice_exists(user_id: impl Into<String>, billing_month: impl ToString) -> Self {
        Self::InvoiceExists {
            user_id: user_id.into(),
            billing_month: billing_month.to_string(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for MembershipError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::UserNotFound { id } => MembershipError::not_found(format!("user {id}")),
            DomainError::InvoiceNotFound { invoice_number } => {
                MembershipError::not_found(format!("invoice {invoice_number}"))
            }
            DomainError::AlreadyFinalized { .. }
            | DomainError::DatesLocked { .. }
            | DomainError::InvoiceExists { .. } => MembershipError::locked(e.to_string()),
            DomainError::Validation { .. } => MembershipError::validation(e.to_string()),
            DomainError::Database { .. } => MembershipError::internal(),
        }
    }
}
