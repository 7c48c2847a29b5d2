use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use uuid::Uuid;

use crate::contract::model::{
    Actor, AgreementHistoryEntry, AgreementKind, BillingMonth, ClientEnvironment, ConsentItem,
    ConsentRecord, Invoice, InvoiceDates, InvoiceKind, InvoiceStatus, Member, PaymentMethod,
};
use crate::infra::storage::entity::{ConsentRow, HistoryRow, InvoiceRow, ItemJson, MemberRow};

fn kind(raw: &str) -> anyhow::Result<AgreementKind> {
    AgreementKind::parse(raw).ok_or_else(|| anyhow!("unknown agreement kind '{raw}'"))
}

/// Convert a `users` row to a contract model
pub fn member_from_row(row: MemberRow) -> anyhow::Result<Member> {
    let payment_method = PaymentMethod::parse(&row.payment_method)
        .ok_or_else(|| anyhow!("unknown payment method '{}'", row.payment_method))?;
    Ok(Member {
        id: row.id,
        email: row.email,
        role: row.role,
        payment_method,
        contract_date_text: row.contract_date_text,
        plan_tier: row.plan_tier,
        monthly_fee: row.monthly_fee,
        legacy_plan_name: row.legacy_plan_name,
        selected_plan_id: row.selected_plan_id,
        contract_finalized: row.contract_finalized,
        dates_saved: row.dates_saved,
        invoice_date: row.invoice_date,
        confirmed_due_date: row.confirmed_due_date,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub fn consent_from_row(row: ConsentRow) -> anyhow::Result<ConsentRecord> {
    let items: BTreeMap<String, ItemJson> =
        serde_json::from_str(&row.items).context("malformed consent items")?;
    let dates = match (row.invoice_date, row.due_date) {
        (Some(invoice_date), Some(due_date)) => Some(InvoiceDates {
            invoice_date,
            due_date,
        }),
        _ => None,
    };
    Ok(ConsentRecord {
        id: Uuid::parse_str(&row.id).context("malformed consent id")?,
        user_id: row.user_id,
        kind: kind(&row.kind)?,
        version: row.version,
        agreed: row.agreed,
        agreed_at: row.agreed_at,
        actor: Actor {
            user_id: row.actor_user_id,
            email: row.actor_email,
            role: row.actor_role,
        },
        environment: ClientEnvironment {
            ip: row.ip_address,
            user_agent: row.user_agent,
        },
        checksum: row.checksum,
        items: items
            .into_iter()
            .map(|(name, i)| {
                (
                    name,
                    ConsentItem {
                        agreed: i.agreed,
                        agreed_at: i.agreed_at,
                    },
                )
            })
            .collect(),
        dates,
    })
}

pub fn items_to_json(items: &BTreeMap<String, ConsentItem>) -> anyhow::Result<String> {
    let json: BTreeMap<&str, ItemJson> = items
        .iter()
        .map(|(name, i)| {
            (
                name.as_str(),
                ItemJson {
                    agreed: i.agreed,
                    agreed_at: i.agreed_at,
                },
            )
        })
        .collect();
    Ok(serde_json::to_string(&json)?)
}

pub fn history_from_row(row: HistoryRow) -> anyhow::Result<AgreementHistoryEntry> {
    Ok(AgreementHistoryEntry {
        id: Uuid::parse_str(&row.id).context("malformed history id")?,
        kind: kind(&row.kind)?,
        agreed: row.agreed,
        date_display: row.date_display,
        timestamp: row.timestamp,
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        user_id: row.user_id,
    })
}

pub fn invoice_from_row(row: InvoiceRow) -> anyhow::Result<Invoice> {
    Ok(Invoice {
        kind: InvoiceKind::parse(&row.kind)
            .ok_or_else(|| anyhow!("unknown invoice kind '{}'", row.kind))?,
        billing_month: BillingMonth::parse(&row.billing_month)
            .ok_or_else(|| anyhow!("malformed billing month '{}'", row.billing_month))?,
        status: InvoiceStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("unknown invoice status '{}'", row.status))?,
        invoice_number: row.invoice_number,
        user_id: row.user_id,
        invoice_date: row.invoice_date,
        due_date: row.due_date,
        plan_id: row.plan_id,
        monthly_fee: row.monthly_fee,
        initial_fee: row.initial_fee,
        subtotal: row.subtotal,
        tax: row.tax,
        total: row.total,
        created_at: row.created_at,
        paid_at: row.paid_at,
    })
}
