use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::contract::model::{
    AgreementHistoryEntry, BillingMonth, ConsentRecord, Invoice, InvoiceDates, Member, NewMember,
};

#[derive(Debug, Error)]
pub enum RepoError {
    /// A uniqueness constraint or a lock-flag condition rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write was computed from state another writer has since replaced.
    #[error("stale write: {0}")]
    Stale(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Conditional user-row update written in the same transaction as a consent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockGuard {
    /// Requires `contract_finalized = false`; `finalize` flips it.
    /// `seen_records` is the number of contract records the merge was built
    /// from; any other count at write time is `Stale`.
    Contract { finalize: bool, seen_records: usize },
    /// Requires `dates_saved = false`; stores the dates and flips it.
    InvoiceDates(InvoiceDates),
}

/// Port for the domain layer: persistence operations the domain needs.
/// Object-safe and async-friendly via `async_trait`.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn get_member(&self, id: &str) -> Result<Option<Member>, RepoError>;

    /// Insert or replace a billing profile. Lock flags and saved dates are
    /// left untouched on existing rows.
    async fn upsert_member(&self, member: &NewMember, now: DateTime<Utc>) -> Result<Member, RepoError>;

    /// Members billed by invoice (card payers are excluded).
    async fn list_invoice_billed_members(&self) -> Result<Vec<Member>, RepoError>;

    async fn list_consent_records(&self, user_id: &str) -> Result<Vec<ConsentRecord>, RepoError>;

    /// Append a record; with a guard, the conditional user update and the
    /// insert commit together or not at all. A failed lock flag is
    /// `Conflict`, a moved contract record count is `Stale`.
    async fn append_consent_record(
        &self,
        record: &ConsentRecord,
        guard: Option<&LockGuard>,
    ) -> Result<(), RepoError>;

    async fn append_audit_entry(&self, entry: &AgreementHistoryEntry) -> Result<(), RepoError>;

    async fn list_audit_entries(&self, user_id: &str) -> Result<Vec<AgreementHistoryEntry>, RepoError>;

    async fn find_invoices_by_user_and_month(
        &self,
        user_id: &str,
        month: BillingMonth,
    ) -> Result<Vec<Invoice>, RepoError>;

    /// Duplicate (user, month) or invoice number is `Conflict`.
    async fn create_invoice(&self, invoice: &Invoice) -> Result<(), RepoError>;

    /// Newest billing month first.
    async fn list_invoices_by_user(&self, user_id: &str) -> Result<Vec<Invoice>, RepoError>;

    async fn find_invoice(&self, invoice_number: &str) -> Result<Option<Invoice>, RepoError>;

    /// Set `paid`/`paid_at` unless already paid. Returns the stored invoice.
    async fn mark_invoice_paid(
        &self,
        invoice_number: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Invoice>, RepoError>;

    /// Flip every pending invoice with `due_date < today` to overdue.
    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, RepoError>;
}
