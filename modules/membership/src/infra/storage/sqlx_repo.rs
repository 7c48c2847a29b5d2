//! SQLite-backed repository implementing the domain ports.
//!
//! Uniqueness of invoices and the one-way lock flags are enforced here by the
//! schema and by conditional updates, never by read-then-write in the service.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use db::DbHandle;
use sqlx::SqlitePool;

use crate::contract::model::{
    AgreementHistoryEntry, AgreementKind, Audience, BillingMonth, ConsentRecord, Invoice, InvoiceStatus, Member,
    NewMember, Notification, NotificationPriority, PaymentMethod,
};
use crate::domain::error::DomainError;
use crate::domain::ports::NotificationPort;
use crate::domain::repo::{LockGuard, MembershipRepository, RepoError};
use crate::infra::storage::entity::{ConsentRow, HistoryRow, InvoiceRow, MemberRow};
use crate::infra::storage::mapper::{
    consent_from_row, history_from_row, invoice_from_row, items_to_json, member_from_row,
};

const MEMBER_COLUMNS: &str = "id, email, role, payment_method, contract_date_text, plan_tier, \
     monthly_fee, legacy_plan_name, selected_plan_id, contract_finalized, dates_saved, \
     invoice_date, confirmed_due_date, created_at, updated_at";

const INVOICE_COLUMNS: &str = "invoice_number, user_id, kind, billing_month, invoice_date, \
     due_date, plan_id, monthly_fee, initial_fee, subtotal, tax, total, status, created_at, paid_at";

/// Apply the embedded schema migrations.
pub async fn migrate(db: &DbHandle) -> Result<(), db::DbError> {
    sqlx::migrate!("./migrations").run(db.pool()).await?;
    Ok(())
}

#[derive(Clone)]
pub struct SqlxMembershipRepository {
    pool: SqlitePool,
}

impl SqlxMembershipRepository {
    pub fn new(db: &DbHandle) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

fn other(e: sqlx::Error) -> RepoError {
    RepoError::Other(anyhow::Error::new(e))
}

/// Unique violations become `Conflict`.
fn classify(e: sqlx::Error) -> RepoError {
    if db::errors::is_unique_violation(&e) {
        RepoError::Conflict(e.to_string())
    } else {
        other(e)
    }
}

#[async_trait]
impl MembershipRepository for SqlxMembershipRepository {
    async fn get_member(&self, id: &str) -> Result<Option<Member>, RepoError> {
        let row: Option<MemberRow> =
            sqlx::query_as(&format!("SELECT {MEMBER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(other)?;
        Ok(row.map(member_from_row).transpose()?)
    }

    async fn upsert_member(&self, member: &NewMember, now: DateTime<Utc>) -> Result<Member, RepoError> {
        sqlx::query(
            "INSERT INTO users (id, email, role, payment_method, contract_date_text, plan_tier, \
                 monthly_fee, legacy_plan_name, selected_plan_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
                 email = excluded.email, \
                 role = excluded.role, \
                 payment_method = excluded.payment_method, \
                 contract_date_text = excluded.contract_date_text, \
                 plan_tier = excluded.plan_tier, \
                 monthly_fee = excluded.monthly_fee, \
                 legacy_plan_name = excluded.legacy_plan_name, \
                 selected_plan_id = excluded.selected_plan_id, \
                 updated_at = excluded.updated_at",
        )
        .bind(&member.id)
        .bind(&member.email)
        .bind(&member.role)
        .bind(member.payment_method.as_str())
        .bind(&member.contract_date_text)
        .bind(&member.plan_tier)
        .bind(member.monthly_fee)
        .bind(&member.legacy_plan_name)
        .bind(&member.selected_plan_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(other)?;

        self.get_member(&member.id)
            .await?
            .context("member row missing after upsert")
            .map_err(RepoError::Other)
    }

    async fn list_invoice_billed_members(&self) -> Result<Vec<Member>, RepoError> {
        let rows: Vec<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM users WHERE payment_method = ? ORDER BY id"
        ))
        .bind(PaymentMethod::Invoice.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(other)?;
        Ok(rows
            .into_iter()
            .map(member_from_row)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn list_consent_records(&self, user_id: &str) -> Result<Vec<ConsentRecord>, RepoError> {
        let rows: Vec<ConsentRow> = sqlx::query_as(
            "SELECT id, user_id, kind, version, agreed, agreed_at, actor_user_id, actor_email, \
                 actor_role, ip_address, user_agent, checksum, items, invoice_date, due_date \
             FROM consent_records WHERE user_id = ? ORDER BY agreed_at, rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(other)?;
        Ok(rows
            .into_iter()
            .map(consent_from_row)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn append_consent_record(
        &self,
        record: &ConsentRecord,
        guard: Option<&LockGuard>,
    ) -> Result<(), RepoError> {
        let items = items_to_json(&record.items)?;
        let mut tx = self.pool.begin().await.map_err(other)?;

        if let Some(guard) = guard {
            let result = match guard {
                LockGuard::Contract { finalize, .. } => sqlx::query(
                    "UPDATE users SET contract_finalized = ?, updated_at = ? \
                     WHERE id = ? AND contract_finalized = 0",
                )
                .bind(*finalize)
                .bind(record.agreed_at)
                .bind(&record.user_id)
                .execute(&mut *tx)
                .await,
                LockGuard::InvoiceDates(dates) => sqlx::query(
                    "UPDATE users SET dates_saved = 1, invoice_date = ?, confirmed_due_date = ?, \
                         updated_at = ? \
                     WHERE id = ? AND dates_saved = 0",
                )
                .bind(dates.invoice_date)
                .bind(dates.due_date)
                .bind(record.agreed_at)
                .bind(&record.user_id)
                .execute(&mut *tx)
                .await,
            }
            .map_err(other)?;

            if result.rows_affected() == 0 {
                // dropping the transaction rolls it back
                return Err(RepoError::Conflict(format!(
                    "lock condition not met for user {}",
                    record.user_id
                )));
            }

            // the update above holds the write lock, so the count cannot move
            // again before commit
            if let LockGuard::Contract { seen_records, .. } = guard {
                let (count,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM consent_records WHERE user_id = ? AND kind = ?",
                )
                .bind(&record.user_id)
                .bind(AgreementKind::Contract.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(other)?;
                if usize::try_from(count).ok() != Some(*seen_records) {
                    return Err(RepoError::Stale(format!(
                        "contract for user {} has {} records, merge saw {}",
                        record.user_id, count, seen_records
                    )));
                }
            }
        }

        sqlx::query(
            "INSERT INTO consent_records (id, user_id, kind, version, agreed, agreed_at, \
                 actor_user_id, actor_email, actor_role, ip_address, user_agent, checksum, items, \
                 invoice_date, due_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(record.kind.as_str())
        .bind(&record.version)
        .bind(record.agreed)
        .bind(record.agreed_at)
        .bind(&record.actor.user_id)
        .bind(&record.actor.email)
        .bind(&record.actor.role)
        .bind(&record.environment.ip)
        .bind(&record.environment.user_agent)
        .bind(&record.checksum)
        .bind(items)
        .bind(record.dates.map(|d| d.invoice_date))
        .bind(record.dates.map(|d| d.due_date))
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(other)?;
        Ok(())
    }

    async fn append_audit_entry(&self, entry: &AgreementHistoryEntry) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO agreement_history (id, user_id, kind, agreed, date_display, timestamp, \
                 ip_address, user_agent) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.agreed)
        .bind(&entry.date_display)
        .bind(entry.timestamp)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn list_audit_entries(&self, user_id: &str) -> Result<Vec<AgreementHistoryEntry>, RepoError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, user_id, kind, agreed, date_display, timestamp, ip_address, user_agent \
             FROM agreement_history WHERE user_id = ? ORDER BY timestamp DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(other)?;
        Ok(rows
            .into_iter()
            .map(history_from_row)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn find_invoices_by_user_and_month(
        &self,
        user_id: &str,
        month: BillingMonth,
    ) -> Result<Vec<Invoice>, RepoError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE user_id = ? AND billing_month = ?"
        ))
        .bind(user_id)
        .bind(month.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(other)?;
        Ok(rows
            .into_iter()
            .map(invoice_from_row)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn create_invoice(&self, invoice: &Invoice) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO invoices ({INVOICE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&invoice.invoice_number)
        .bind(&invoice.user_id)
        .bind(invoice.kind.as_str())
        .bind(invoice.billing_month.to_string())
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(&invoice.plan_id)
        .bind(invoice.monthly_fee)
        .bind(invoice.initial_fee)
        .bind(invoice.subtotal)
        .bind(invoice.tax)
        .bind(invoice.total)
        .bind(invoice.status.as_str())
        .bind(invoice.created_at)
        .bind(invoice.paid_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn list_invoices_by_user(&self, user_id: &str) -> Result<Vec<Invoice>, RepoError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE user_id = ? \
             ORDER BY billing_month DESC, invoice_date DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(other)?;
        Ok(rows
            .into_iter()
            .map(invoice_from_row)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn find_invoice(&self, invoice_number: &str) -> Result<Option<Invoice>, RepoError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_number = ?"
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(other)?;
        Ok(row.map(invoice_from_row).transpose()?)
    }

    async fn mark_invoice_paid(
        &self,
        invoice_number: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Invoice>, RepoError> {
        sqlx::query("UPDATE invoices SET status = ?, paid_at = ? WHERE invoice_number = ? AND status <> ?")
            .bind(InvoiceStatus::Paid.as_str())
            .bind(at)
            .bind(invoice_number)
            .bind(InvoiceStatus::Paid.as_str())
            .execute(&self.pool)
            .await
            .map_err(other)?;
        self.find_invoice(invoice_number).await
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, RepoError> {
        let result = sqlx::query("UPDATE invoices SET status = ? WHERE status = ? AND due_date < ?")
            .bind(InvoiceStatus::Overdue.as_str())
            .bind(InvoiceStatus::Pending.as_str())
            .bind(today)
            .execute(&self.pool)
            .await
            .map_err(other)?;
        Ok(result.rows_affected())
    }
}

/// Notifications land in the `notifications` table read by the member site.
#[derive(Clone)]
pub struct SqlxNotificationSink {
    pool: SqlitePool,
}

impl SqlxNotificationSink {
    pub fn new(db: &DbHandle) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl NotificationPort for SqlxNotificationSink {
    async fn publish(&self, notification: &Notification) -> Result<(), DomainError> {
        let priority = match notification.priority {
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        };
        let audience = match notification.audience {
            Audience::All => "all",
        };
        sqlx::query(
            "INSERT INTO notifications (title, content, priority, audience, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(priority)
        .bind(audience)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;
        Ok(())
    }
}
