use async_trait::async_trait;
use chrono::NaiveDate;

use crate::contract::error::MembershipError;
use crate::contract::model::{
    BillingRunReport, ConsentOverview, ConsentReceipt, ConsentSubmission, Invoice,
};

/// Public API trait for the membership module that other modules (and the
/// server's batch command) can use.
#[async_trait]
pub trait MembershipApi: Send + Sync {
    /// Submit one agreement through the consent gate.
    async fn submit_consent(&self, submission: ConsentSubmission) -> Result<ConsentReceipt, MembershipError>;

    /// Gate status of a member's ordered agreements.
    async fn consent_overview(&self, user_id: &str) -> Result<ConsentOverview, MembershipError>;

    /// Current date on the member-facing calendar; the default batch run date.
    fn today(&self) -> NaiveDate;

    /// Run monthly invoicing for every invoice-billed member as of `today`.
    async fn run_monthly_billing(&self, today: NaiveDate) -> Result<BillingRunReport, MembershipError>;

    /// A member's invoices, newest billing month first.
    async fn list_invoices(&self, user_id: &str) -> Result<Vec<Invoice>, MembershipError>;
}
