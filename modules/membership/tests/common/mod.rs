#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;

use membership::contract::model::*;
use membership::domain::error::DomainError;
use membership::domain::ports::{Clock, NotificationPort};
use membership::domain::repo::{LockGuard, MembershipRepository, RepoError};
use membership::domain::service::{ServiceConfig, Services};

/// In-memory repository with switchable faults.
#[derive(Default)]
pub struct FakeRepo {
    pub state: Mutex<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub members: Vec<Member>,
    pub consents: Vec<ConsentRecord>,
    pub history: Vec<AgreementHistoryEntry>,
    pub invoices: Vec<Invoice>,
    /// Number of upcoming audit writes that fail.
    pub audit_failures: usize,
    /// Members whose invoice insert fails with a storage error.
    pub failing_invoice_users: HashSet<String>,
    /// Members whose duplicate lookup misses, as if another run raced us.
    pub stale_lookup_users: HashSet<String>,
    /// Fail every lock-guarded consent write as if the flag flipped concurrently.
    pub lose_lock_race: bool,
    /// Contract record committed by a concurrent submission right before the
    /// next contract write lands.
    pub interleaved_contract: Option<ConsentRecord>,
    pub audit_attempts: usize,
}

fn other(msg: &str) -> RepoError {
    RepoError::Other(anyhow::anyhow!(msg.to_string()))
}

#[async_trait]
impl MembershipRepository for FakeRepo {
    async fn get_member(&self, id: &str) -> Result<Option<Member>, RepoError> {
        Ok(self.state.lock().members.iter().find(|m| m.id == id).cloned())
    }

    async fn upsert_member(&self, m: &NewMember, now: DateTime<Utc>) -> Result<Member, RepoError> {
        let mut st = self.state.lock();
        let existing = st.members.iter().position(|x| x.id == m.id);
        let base = existing.map(|i| st.members[i].clone());
        let member = Member {
            id: m.id.clone(),
            email: m.email.clone(),
            role: m.role.clone(),
            payment_method: m.payment_method,
            contract_date_text: m.contract_date_text.clone(),
            plan_tier: m.plan_tier.clone(),
            monthly_fee: m.monthly_fee,
            legacy_plan_name: m.legacy_plan_name.clone(),
            selected_plan_id: m.selected_plan_id.clone(),
            contract_finalized: base.as_ref().is_some_and(|b| b.contract_finalized),
            dates_saved: base.as_ref().is_some_and(|b| b.dates_saved),
            invoice_date: base.as_ref().and_then(|b| b.invoice_date),
            confirmed_due_date: base.as_ref().and_then(|b| b.confirmed_due_date),
            created_at: base.as_ref().map(|b| b.created_at).unwrap_or(now),
            updated_at: now,
        };
        match existing {
            Some(i) => st.members[i] = member.clone(),
            None => st.members.push(member.clone()),
        }
        Ok(member)
    }

    async fn list_invoice_billed_members(&self) -> Result<Vec<Member>, RepoError> {
        let mut out: Vec<Member> = self
            .state
            .lock()
            .members
            .iter()
            .filter(|m| m.payment_method == PaymentMethod::Invoice)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn list_consent_records(&self, user_id: &str) -> Result<Vec<ConsentRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .consents
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_consent_record(
        &self,
        record: &ConsentRecord,
        guard: Option<&LockGuard>,
    ) -> Result<(), RepoError> {
        let mut st = self.state.lock();
        if guard.is_some() && st.lose_lock_race {
            return Err(RepoError::Conflict("lock condition not met".into()));
        }
        if let Some(LockGuard::Contract { seen_records, .. }) = guard {
            if let Some(concurrent) = st.interleaved_contract.take() {
                st.consents.push(concurrent);
            }
            let current = st
                .consents
                .iter()
                .filter(|r| r.user_id == record.user_id && r.kind == AgreementKind::Contract)
                .count();
            if current != *seen_records {
                return Err(RepoError::Stale(format!("expected {seen_records} contract records, found {current}")));
            }
        }
        if let Some(guard) = guard {
            let member = st
                .members
                .iter_mut()
                .find(|m| m.id == record.user_id)
                .ok_or_else(|| other("no such user"))?;
            match guard {
                LockGuard::Contract { finalize, .. } => {
                    if member.contract_finalized {
                        return Err(RepoError::Conflict("contract finalized".into()));
                    }
                    member.contract_finalized = *finalize;
                }
                LockGuard::InvoiceDates(dates) => {
                    if member.dates_saved {
                        return Err(RepoError::Conflict("dates saved".into()));
                    }
                    member.dates_saved = true;
                    member.invoice_date = Some(dates.invoice_date);
                    member.confirmed_due_date = Some(dates.due_date);
                }
            }
        }
        st.consents.push(record.clone());
        Ok(())
    }

    async fn append_audit_entry(&self, entry: &AgreementHistoryEntry) -> Result<(), RepoError> {
        let mut st = self.state.lock();
        st.audit_attempts += 1;
        if st.audit_failures > 0 {
            st.audit_failures -= 1;
            return Err(other("audit store unavailable"));
        }
        st.history.push(entry.clone());
        Ok(())
    }

    async fn list_audit_entries(&self, user_id: &str) -> Result<Vec<AgreementHistoryEntry>, RepoError> {
        let mut out: Vec<_> = self
            .state
            .lock()
            .history
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn find_invoices_by_user_and_month(
        &self,
        user_id: &str,
        month: BillingMonth,
    ) -> Result<Vec<Invoice>, RepoError> {
        let mut st = self.state.lock();
        // a stale lookup misses exactly once
        if st.stale_lookup_users.remove(user_id) {
            return Ok(vec![]);
        }
        Ok(st
            .invoices
            .iter()
            .filter(|i| i.user_id == user_id && i.billing_month == month)
            .cloned()
            .collect())
    }

    async fn create_invoice(&self, invoice: &Invoice) -> Result<(), RepoError> {
        let mut st = self.state.lock();
        if st.failing_invoice_users.contains(&invoice.user_id) {
            return Err(other("database is locked"));
        }
        if st.invoices.iter().any(|i| {
            (i.user_id == invoice.user_id && i.billing_month == invoice.billing_month)
                || i.invoice_number == invoice.invoice_number
        }) {
            return Err(RepoError::Conflict("UNIQUE constraint failed".into()));
        }
        st.invoices.push(invoice.clone());
        Ok(())
    }

    async fn list_invoices_by_user(&self, user_id: &str) -> Result<Vec<Invoice>, RepoError> {
        let mut out: Vec<Invoice> = self
            .state
            .lock()
            .invoices
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.billing_month.cmp(&a.billing_month));
        Ok(out)
    }

    async fn find_invoice(&self, invoice_number: &str) -> Result<Option<Invoice>, RepoError> {
        Ok(self
            .state
            .lock()
            .invoices
            .iter()
            .find(|i| i.invoice_number == invoice_number)
            .cloned())
    }

    async fn mark_invoice_paid(
        &self,
        invoice_number: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Invoice>, RepoError> {
        let mut st = self.state.lock();
        Ok(st
            .invoices
            .iter_mut()
            .find(|i| i.invoice_number == invoice_number)
            .map(|i| {
                if i.status != InvoiceStatus::Paid {
                    i.status = InvoiceStatus::Paid;
                    i.paid_at = Some(at);
                }
                i.clone()
            }))
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, RepoError> {
        let mut st = self.state.lock();
        let mut n = 0;
        for i in st.invoices.iter_mut() {
            if i.status == InvoiceStatus::Pending && i.due_date < today {
                i.status = InvoiceStatus::Overdue;
                n += 1;
            }
        }
        Ok(n)
    }
}

/// Records every published notification; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), DomainError> {
        if *self.fail.lock() {
            return Err(DomainError::database("notification store unavailable"));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock(pub Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(y: i32, m: u32, d: u32, h: u32) -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }

    pub fn now_plus(&self, by: chrono::Duration) -> DateTime<Utc> {
        *self.0.lock() + by
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

pub struct Harness {
    pub repo: Arc<FakeRepo>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub services: Services,
}

impl Harness {
    /// Clock at 2026-01-20 03:00Z (noon in Tokyo).
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let repo = Arc::new(FakeRepo::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(FixedClock::at(2026, 1, 20, 3));
        let services = Services::new(repo.clone(), notifier.clone(), clock.clone(), config);
        Self {
            repo,
            notifier,
            clock,
            services,
        }
    }

    pub fn add_member(&self, member: Member) {
        self.repo.state.lock().members.push(member);
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn member(id: &str) -> Member {
    let now = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
    Member {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        role: "member".into(),
        payment_method: PaymentMethod::Invoice,
        contract_date_text: Some("2025年12月15日".into()),
        plan_tier: Some("premium".into()),
        monthly_fee: Some(60_000),
        legacy_plan_name: None,
        selected_plan_id: None,
        contract_finalized: false,
        dates_saved: false,
        invoice_date: None,
        confirmed_due_date: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn submission(user_id: &str, kind: AgreementKind) -> ConsentSubmission {
    ConsentSubmission {
        kind,
        agreed: true,
        user_id: user_id.to_string(),
        environment: ClientEnvironment {
            ip: "203.0.113.7".into(),
            user_agent: "test-agent".into(),
        },
        contract_items: Default::default(),
        invoice_dates: None,
    }
}
