use async_trait::async_trait;
use chrono::NaiveDate;

use crate::contract::{
    client::MembershipApi,
    error::MembershipError,
    model::{BillingRunReport, ConsentOverview, ConsentReceipt, ConsentSubmission, Invoice},
};
use crate::domain::service::Services;

/// Local implementation of the MembershipApi trait that delegates to the domain services
pub struct MembershipLocalClient {
    services: Services,
}

impl MembershipLocalClient {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl MembershipApi for MembershipLocalClient {
    async fn submit_consent(
        &self,
        submission: ConsentSubmission,
    ) -> Result<ConsentReceipt, MembershipError> {
        self.services
            .consent
            .submit(submission)
            .await
            .map_err(Into::into)
    }

    async fn consent_overview(&self, user_id: &str) -> Result<ConsentOverview, MembershipError> {
        self.services
            .consent
            .overview(user_id)
            .await
            .map_err(Into::into)
    }

    fn today(&self) -> NaiveDate {
        self.services.billing.today()
    }

    async fn run_monthly_billing(
        &self,
        today: NaiveDate,
    ) -> Result<BillingRunReport, MembershipError> {
        self.services
            .billing
            .run_monthly(today)
            .await
            .map_err(Into::into)
    }

    async fn list_invoices(&self, user_id: &str) -> Result<Vec<Invoice>, MembershipError> {
        self.services
            .billing
            .list_invoices(user_id)
            .await
            .map_err(Into::into)
    }
}
