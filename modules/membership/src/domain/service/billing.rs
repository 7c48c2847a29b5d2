use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, instrument, warn};

use crate::contract::model::{
    Audience, BillingMonth, BillingRunReport, Invoice, InvoiceKind, InvoiceStatus, Member,
    MemberRunResult, Notification, NotificationPriority, RunOutcome, SkipReason,
};
use crate::domain::billing::{compute_amounts, generate_invoice_number, schedule_for};
use crate::domain::error::DomainError;
use crate::domain::plan::ResolvedPlan;
use crate::domain::ports::{Clock, NotificationPort};
use crate::domain::repo::{MembershipRepository, RepoError};
use crate::domain::service::{storage, ServiceConfig};

/// Billing cycle engine: monthly invoice run, initial invoice, payments.
#[derive(Clone)]
pub struct BillingService {
    repo: Arc<dyn MembershipRepository>,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl BillingService {
    pub fn new(
        repo: Arc<dyn MembershipRepository>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            clock,
            config,
        }
    }

    /// Today on the member-facing calendar.
    pub fn today(&self) -> NaiveDate {
        self.clock.today(self.config.display_offset)
    }

    /// One batch pass over every invoice-billed member. Individual members
    /// never abort the run; only failing to list members does.
    #[instrument(name = "membership.billing.run_monthly", skip(self), fields(today = %today))]
    pub async fn run_monthly(&self, today: NaiveDate) -> Result<BillingRunReport, DomainError> {
        let members = self
            .repo
            .list_invoice_billed_members()
            .await
            .map_err(storage)?;
        info!(members = members.len(), "Starting monthly invoice run");

        let mut results = Vec::with_capacity(members.len());
        for member in &members {
            let outcome = self.process_member(member, today).await;
            results.push(MemberRunResult {
                user_id: member.id.clone(),
                outcome,
            });
        }

        let overdue_marked = match self.repo.mark_overdue(today).await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Overdue sweep failed");
                0
            }
        };

        let created = results
            .iter()
            .filter(|r| matches!(r.outcome, RunOutcome::Created { .. }))
            .count();
        info!(created, total = results.len(), overdue_marked, "Monthly invoice run finished");

        Ok(BillingRunReport {
            run_date: today,
            results,
            overdue_marked,
        })
    }

    #[instrument(name = "membership.billing.member", skip(self, member, today), fields(user_id = %member.id))]
    async fn process_member(&self, member: &Member, today: NaiveDate) -> RunOutcome {
        let schedule = match schedule_for(member.contract_date_text.as_deref(), today) {
            Ok(s) => s,
            Err(reason) => return skipped(reason),
        };

        match self
            .repo
            .find_invoices_by_user_and_month(&member.id, schedule.billing_month)
            .await
        {
            Ok(existing) if !existing.is_empty() => return skipped(SkipReason::AlreadyExists),
            Ok(_) => {}
            Err(e) => return failed(e),
        }

        let plan = match self.config.plans.resolve(member) {
            Ok(p) => p,
            Err(reason) => return skipped(reason),
        };

        let Some(invoice) = self.build_invoice(
            member,
            InvoiceKind::Recurring,
            schedule.billing_month,
            schedule.invoice_date,
            schedule.due_date,
            &plan,
            0,
        ) else {
            error!(monthly_fee = plan.monthly_fee, "Invoice amount out of range");
            return RunOutcome::Failed {
                error: format!("invoice amount out of range for monthly fee {}", plan.monthly_fee),
            };
        };

        match self.repo.create_invoice(&invoice).await {
            Ok(()) => {}
            Err(RepoError::Conflict(reason)) => {
                return self
                    .resolve_create_conflict(&member.id, schedule.billing_month, &reason)
                    .await;
            }
            Err(e) => return failed(e),
        }

        info!(invoice_number = %invoice.invoice_number, total = invoice.total, "Invoice created");
        self.notify_created(&invoice).await;
        RunOutcome::Created {
            invoice_number: invoice.invoice_number,
        }
    }

    /// A lost race on (user, month) is a skip. Any other conflict means the
    /// invoice number is taken by another member.
    async fn resolve_create_conflict(
        &self,
        user_id: &str,
        month: BillingMonth,
        reason: &str,
    ) -> RunOutcome {
        match self.repo.find_invoices_by_user_and_month(user_id, month).await {
            Ok(existing) if !existing.is_empty() => skipped(SkipReason::AlreadyExists),
            Ok(_) => {
                error!(%reason, "Invoice number collision");
                RunOutcome::Failed {
                    error: format!("invoice number collision: {reason}"),
                }
            }
            Err(e) => failed(e),
        }
    }

    /// First invoice, dated from the saved onboarding dates and carrying the
    /// initial fee on top of the monthly fee.
    #[instrument(name = "membership.billing.create_initial", skip(self), fields(user_id = %user_id))]
    pub async fn create_initial_invoice(&self, user_id: &str) -> Result<Invoice, DomainError> {
        let member = self
            .repo
            .get_member(user_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::user_not_found(user_id))?;

        let (invoice_date, due_date) = match (member.dates_saved, member.invoice_date, member.confirmed_due_date) {
            (true, Some(invoice_date), Some(due_date)) => (invoice_date, due_date),
            _ => {
                return Err(DomainError::validation(
                    "invoiceDates",
                    "initial invoice dates have not been saved",
                ))
            }
        };

        let plan = self
            .config
            .plans
            .resolve(&member)
            .map_err(|_| DomainError::validation("plan", "member has no billable plan"))?;

        let billing_month = BillingMonth::of(invoice_date);
        let invoice = self
            .build_invoice(
                &member,
                InvoiceKind::Initial,
                billing_month,
                invoice_date,
                due_date,
                &plan,
                self.config.initial_fee,
            )
            .ok_or_else(|| DomainError::validation("monthlyFee", "invoice amount out of range"))?;

        match self.repo.create_invoice(&invoice).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => {
                return Err(DomainError::invoice_exists(&member.id, billing_month));
            }
            Err(e) => return Err(storage(e)),
        }

        info!(invoice_number = %invoice.invoice_number, total = invoice.total, "Initial invoice created");
        self.notify_created(&invoice).await;
        Ok(invoice)
    }

    #[instrument(name = "membership.billing.list", skip(self), fields(user_id = %user_id))]
    pub async fn list_invoices(&self, user_id: &str) -> Result<Vec<Invoice>, DomainError> {
        if self.repo.get_member(user_id).await.map_err(storage)?.is_none() {
            return Err(DomainError::user_not_found(user_id));
        }
        let invoices = self
            .repo
            .list_invoices_by_user(user_id)
            .await
            .map_err(storage)?;
        debug!(count = invoices.len(), "Listed invoices");
        Ok(invoices)
    }

    /// Marking a paid invoice again is a no-op.
    #[instrument(name = "membership.billing.mark_paid", skip(self), fields(invoice_number = %invoice_number))]
    pub async fn mark_paid(&self, invoice_number: &str) -> Result<Invoice, DomainError> {
        let invoice = self
            .repo
            .mark_invoice_paid(invoice_number, self.clock.now())
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::invoice_not_found(invoice_number))?;
        info!(status = invoice.status.as_str(), "Invoice payment recorded");
        Ok(invoice)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_invoice(
        &self,
        member: &Member,
        kind: InvoiceKind,
        billing_month: BillingMonth,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        plan: &ResolvedPlan,
        initial_fee: i64,
    ) -> Option<Invoice> {
        let subtotal = plan.monthly_fee.checked_add(initial_fee)?;
        let amounts = compute_amounts(subtotal, self.config.tax_rate_percent)?;
        Some(Invoice {
            invoice_number: generate_invoice_number(billing_month, &member.id),
            user_id: member.id.clone(),
            kind,
            billing_month,
            invoice_date,
            due_date,
            plan_id: plan.plan_id.clone(),
            monthly_fee: plan.monthly_fee,
            initial_fee,
            subtotal: amounts.subtotal,
            tax: amounts.tax,
            total: amounts.total,
            status: InvoiceStatus::Pending,
            created_at: self.clock.now(),
            paid_at: None,
        })
    }

    /// Exactly one notification per created invoice; failures never undo it.
    async fn notify_created(&self, invoice: &Invoice) {
        let notification = Notification {
            title: format!("Invoice {} issued", invoice.invoice_number),
            content: format!(
                "Invoice {}: total {} JPY (tax {} JPY), due {}",
                invoice.invoice_number, invoice.total, invoice.tax, invoice.due_date
            ),
            priority: NotificationPriority::High,
            audience: Audience::All,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.notifier.publish(&notification).await {
            warn!(error = %e, invoice_number = %invoice.invoice_number, "Invoice notification failed");
        }
    }
}

fn skipped(reason: SkipReason) -> RunOutcome {
    info!(%reason, "Member skipped");
    RunOutcome::Skipped(reason)
}

fn failed(e: RepoError) -> RunOutcome {
    error!(error = %e, "Storage failure while invoicing member");
    RunOutcome::Failed {
        error: e.to_string(),
    }
}
