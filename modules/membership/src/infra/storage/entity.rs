use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// `users` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRow {
    pub id: String,
    pub email: String,
    pub role: String,
    pub payment_method: String,
    pub contract_date_text: Option<String>,
    pub plan_tier: Option<String>,
    pub monthly_fee: Option<i64>,
    pub legacy_plan_name: Option<String>,
    pub selected_plan_id: Option<String>,
    pub contract_finalized: bool,
    pub dates_saved: bool,
    pub invoice_date: Option<NaiveDate>,
    pub confirmed_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `consent_records` row. `items` holds a JSON object of [`ItemJson`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConsentRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub version: String,
    pub agreed: bool,
    pub agreed_at: DateTime<Utc>,
    pub actor_user_id: String,
    pub actor_email: String,
    pub actor_role: String,
    pub ip_address: String,
    pub user_agent: String,
    pub checksum: String,
    pub items: String,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemJson {
    pub agreed: bool,
    pub agreed_at: Option<DateTime<Utc>>,
}

/// `agreement_history` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub agreed: bool,
    pub date_display: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
}

/// `invoices` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub invoice_number: String,
    pub user_id: String,
    pub kind: String,
    pub billing_month: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub plan_id: String,
    pub monthly_fee: i64,
    pub initial_fee: i64,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}
