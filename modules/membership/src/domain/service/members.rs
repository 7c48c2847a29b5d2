use std::sync::Arc;

use tracing::{info, instrument};

use crate::contract::model::{Member, NewMember};
use crate::domain::billing::MAX_MONTHLY_FEE;
use crate::domain::error::DomainError;
use crate::domain::ports::Clock;
use crate::domain::repo::MembershipRepository;
use crate::domain::service::storage;

/// Billing-profile registration and lookup.
#[derive(Clone)]
pub struct MemberService {
    repo: Arc<dyn MembershipRepository>,
    clock: Arc<dyn Clock>,
}

impl MemberService {
    pub fn new(repo: Arc<dyn MembershipRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    #[instrument(name = "membership.members.get", skip(self), fields(user_id = %id))]
    pub async fn get(&self, id: &str) -> Result<Member, DomainError> {
        self.repo
            .get_member(id)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::user_not_found(id))
    }

    #[instrument(name = "membership.members.register", skip(self, member), fields(user_id = %member.id))]
    pub async fn register(&self, member: NewMember) -> Result<Member, DomainError> {
        self.validate(&member)?;
        let stored = self
            .repo
            .upsert_member(&member, self.clock.now())
            .await
            .map_err(storage)?;
        info!("Member profile saved");
        Ok(stored)
    }

    fn validate(&self, member: &NewMember) -> Result<(), DomainError> {
        if member.id.trim().is_empty() {
            return Err(DomainError::validation("id", "must not be empty"));
        }
        if !member.email.contains('@') {
            return Err(DomainError::validation("email", "invalid email format"));
        }
        if member.monthly_fee.is_some_and(|fee| fee < 0) {
            return Err(DomainError::validation("monthlyFee", "must not be negative"));
        }
        if member.monthly_fee.is_some_and(|fee| fee > MAX_MONTHLY_FEE) {
            return Err(DomainError::validation(
                "monthlyFee",
                format!("must not exceed {MAX_MONTHLY_FEE}"),
            ));
        }
        Ok(())
    }
}
