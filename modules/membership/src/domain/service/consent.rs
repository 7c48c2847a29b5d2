use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::contract::model::{
    Actor, AgreementHistoryEntry, AgreementKind, ConsentOverview, ConsentReceipt, ConsentRecord,
    ConsentSubmission,
};
use crate::domain::error::DomainError;
use crate::domain::gate::{
    agreement_state, consent_checksum, contract_complete, format_display_date, latest_record,
    merge_contract_items, next_outstanding,
};
use crate::domain::ports::Clock;
use crate::domain::repo::{LockGuard, MembershipRepository, RepoError};
use crate::domain::service::{storage, ServiceConfig};

const CONTRACT_MERGE_ATTEMPTS: usize = 3;

/// Consent gate: records agreements, enforces the contract and invoice-date
/// locks, and keeps the agreement history.
#[derive(Clone)]
pub struct ConsentService {
    repo: Arc<dyn MembershipRepository>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl ConsentService {
    pub fn new(repo: Arc<dyn MembershipRepository>, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        Self {
            repo,
            clock,
            config,
        }
    }

    #[instrument(
        name = "membership.consent.submit",
        skip(self, submission),
        fields(user_id = %submission.user_id, kind = %submission.kind, agreed = submission.agreed)
    )]
    pub async fn submit(&self, submission: ConsentSubmission) -> Result<ConsentReceipt, DomainError> {
        if submission.user_id.trim().is_empty() {
            return Err(DomainError::validation("userId", "must not be empty"));
        }

        let member = self
            .repo
            .get_member(&submission.user_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::user_not_found(&submission.user_id))?;

        let now = self.clock.now();
        let date_display = format_display_date(now, self.config.display_offset);

        if !submission.agreed {
            debug!("Declined agreement, nothing persisted");
            return Ok(ConsentReceipt {
                kind: submission.kind,
                agreed: false,
                date_display,
                timestamp: now,
                persisted: false,
                audit_logged: false,
            });
        }

        let version = self.config.agreement_version(submission.kind).to_string();
        let mut record = ConsentRecord {
            id: Uuid::new_v4(),
            user_id: member.id.clone(),
            kind: submission.kind,
            checksum: consent_checksum(&version, &date_display),
            version,
            agreed: true,
            agreed_at: now,
            actor: Actor {
                user_id: member.id.clone(),
                email: member.email.clone(),
                role: member.role.clone(),
            },
            environment: submission.environment.clone(),
            items: Default::default(),
            dates: None,
        };

        let guard = match submission.kind {
            AgreementKind::Contract => {
                if submission.contract_items.is_empty() {
                    return Err(DomainError::validation(
                        "contractData",
                        "at least one contract item is required",
                    ));
                }
                // early exit; the conditional update in storage is authoritative
                if member.contract_finalized {
                    return Err(DomainError::already_finalized(&member.id));
                }
                Some(self.append_contract(&mut record, &submission.contract_items).await?)
            }
            AgreementKind::InitialInvoiceDates => {
                if member.dates_saved {
                    return Err(DomainError::dates_locked(&member.id));
                }
                let dates = submission.invoice_dates.ok_or_else(|| {
                    DomainError::validation("invoiceData", "invoice date and due date are required")
                })?;
                if dates.due_date < dates.invoice_date {
                    return Err(DomainError::validation(
                        "invoiceData",
                        "due date must not be before the invoice date",
                    ));
                }
                record.dates = Some(dates);
                let guard = LockGuard::InvoiceDates(dates);
                self.repo
                    .append_consent_record(&record, Some(&guard))
                    .await
                    .map_err(|e| lock_error(e, || DomainError::dates_locked(&member.id)))?;
                Some(guard)
            }
            AgreementKind::PrivacyPolicy | AgreementKind::MemberSiteTerms | AgreementKind::ToolTerms => {
                self.repo
                    .append_consent_record(&record, None)
                    .await
                    .map_err(storage)?;
                None
            }
        };

        let entry = AgreementHistoryEntry {
            id: Uuid::new_v4(),
            kind: record.kind,
            agreed: true,
            date_display: date_display.clone(),
            timestamp: now,
            ip_address: record.environment.ip.clone(),
            user_agent: record.environment.user_agent.clone(),
            user_id: member.id.clone(),
        };
        let audit_logged = self.write_audit(&entry).await;

        if matches!(guard, Some(LockGuard::Contract { finalize: true, .. })) {
            info!("Contract finalized");
        }
        info!(record_id = %record.id, "Consent recorded");

        Ok(ConsentReceipt {
            kind: record.kind,
            agreed: true,
            date_display,
            timestamp: now,
            persisted: true,
            audit_logged,
        })
    }

    /// Merge the submitted items onto the latest contract record and append
    /// the result. When another merge commits in between, the write is stale
    /// and the merge is redone on the fresh records.
    async fn append_contract(
        &self,
        record: &mut ConsentRecord,
        submitted: &BTreeMap<String, bool>,
    ) -> Result<LockGuard, DomainError> {
        let required = &self.config.contract_required_items;
        for attempt in 1..=CONTRACT_MERGE_ATTEMPTS {
            let records = self
                .repo
                .list_consent_records(&record.user_id)
                .await
                .map_err(storage)?;
            let previous = latest_record(&records, AgreementKind::Contract);
            if previous.is_some_and(|r| contract_complete(&r.items, required)) {
                return Err(DomainError::already_finalized(&record.user_id));
            }
            record.items = merge_contract_items(
                previous.map(|r| &r.items),
                submitted,
                required,
                record.agreed_at,
            );
            let guard = LockGuard::Contract {
                finalize: contract_complete(&record.items, required),
                seen_records: records
                    .iter()
                    .filter(|r| r.kind == AgreementKind::Contract)
                    .count(),
            };

            match self.repo.append_consent_record(record, Some(&guard)).await {
                Ok(()) => return Ok(guard),
                Err(RepoError::Stale(reason)) => {
                    debug!(%reason, attempt, "Contract changed while merging, retrying");
                }
                Err(e) => {
                    return Err(lock_error(e, || DomainError::already_finalized(&record.user_id)));
                }
            }
        }
        warn!("Contract merge kept losing to concurrent submissions");
        Err(DomainError::database("contract changed concurrently, retry the submission"))
    }

    /// The consent record is authoritative; a failed history write is
    /// retried once and then only reported.
    async fn write_audit(&self, entry: &AgreementHistoryEntry) -> bool {
        for attempt in 1..=2 {
            match self.repo.append_audit_entry(entry).await {
                Ok(()) => return true,
                Err(e) if attempt == 1 => {
                    warn!(error = %e, "Agreement history write failed, retrying");
                }
                Err(e) => {
                    error!(error = %e, entry_id = %entry.id, "Agreement history write failed");
                }
            }
        }
        false
    }

    #[instrument(name = "membership.consent.overview", skip(self), fields(user_id = %user_id))]
    pub async fn overview(&self, user_id: &str) -> Result<ConsentOverview, DomainError> {
        let member = self
            .repo
            .get_member(user_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;
        let records = self
            .repo
            .list_consent_records(user_id)
            .await
            .map_err(storage)?;
        let offset = self.config.display_offset;

        Ok(ConsentOverview {
            privacy_policy: agreement_state(&records, AgreementKind::PrivacyPolicy, offset),
            member_site_terms: agreement_state(&records, AgreementKind::MemberSiteTerms, offset),
            tool_terms: agreement_state(&records, AgreementKind::ToolTerms, offset),
            next_outstanding: next_outstanding(&records),
            contract_finalized: member.contract_finalized,
            dates_saved: member.dates_saved,
        })
    }

    #[instrument(name = "membership.consent.history", skip(self), fields(user_id = %user_id))]
    pub async fn history(&self, user_id: &str) -> Result<Vec<AgreementHistoryEntry>, DomainError> {
        if self.repo.get_member(user_id).await.map_err(storage)?.is_none() {
            return Err(DomainError::user_not_found(user_id));
        }
        self.repo.list_audit_entries(user_id).await.map_err(storage)
    }
}

/// A lost lock guard surfaces as the matching domain error.
fn lock_error(e: RepoError, locked: impl FnOnce() -> DomainError) -> DomainError {
    match e {
        RepoError::Conflict(reason) => {
            info!(%reason, "Lock guard rejected the write");
            locked()
        }
        other => storage(other),
    }
}
