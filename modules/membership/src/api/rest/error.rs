use http_errors::ApiError;

use crate::domain::error::DomainError;
use crate::errors;

/// Map a domain error to the JSON error body with the catalog status.
pub fn map_domain_error(e: &DomainError, request_id: Option<&str>) -> ApiError {
    let err = match e {
        DomainError::UserNotFound { id } => {
            errors::USER_NOT_FOUND.to_error(format!("User with id {id} was not found"))
        }
        DomainError::InvoiceNotFound { invoice_number } => errors::INVOICE_NOT_FOUND
            .to_error(format!("Invoice {invoice_number} was not found")),
        DomainError::AlreadyFinalized { .. } => errors::CONTRACT_FINALIZED
            .to_error("The contract has already been agreed in full and can no longer change"),
        DomainError::DatesLocked { .. } => errors::DATES_LOCKED
            .to_error("Invoice and due dates were already saved and can no longer change"),
        DomainError::InvoiceExists { billing_month, .. } => errors::INVOICE_EXISTS
            .to_error(format!("An invoice for {billing_month} already exists")),
        DomainError::Validation { .. } => errors::VALIDATION.to_error(e.to_string()),
        DomainError::Database { .. } => {
            // Log the internal error details but don't expose them to the client
            tracing::error!(error = ?e, "Database error occurred");
            errors::INTERNAL.to_error("An internal database error occurred")
        }
    };
    tag_request(err, request_id)
}

/// Attach the request id when the request carried one.
pub fn tag_request(err: ApiError, request_id: Option<&str>) -> ApiError {
    match request_id {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}
