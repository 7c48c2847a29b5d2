use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use uuid::Uuid;

/// Pure models for inter-module communication (no serde; REST has its own DTOs).

/// The five legal-agreement categories a member must or may acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgreementKind {
    PrivacyPolicy,
    MemberSiteTerms,
    ToolTerms,
    Contract,
    InitialInvoiceDates,
}

impl AgreementKind {
    pub const ALL: [AgreementKind; 5] = [
        AgreementKind::PrivacyPolicy,
        AgreementKind::MemberSiteTerms,
        AgreementKind::ToolTerms,
        AgreementKind::Contract,
        AgreementKind::InitialInvoiceDates,
    ];

    /// Wire name used by the REST surface and the persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementKind::PrivacyPolicy => "privacyPolicy",
            AgreementKind::MemberSiteTerms => "termsAgreement",
            AgreementKind::ToolTerms => "toolTermsAgreement",
            AgreementKind::Contract => "contract",
            AgreementKind::InitialInvoiceDates => "initialInvoiceDates",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw)
    }
}

impl fmt::Display for AgreementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Invoice,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Invoice => "invoice",
            PaymentMethod::Card => "card",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "invoice" => Some(PaymentMethod::Invoice),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

/// Who agreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

/// Where the agreement was submitted from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientEnvironment {
    pub ip: String,
    pub user_agent: String,
}

/// One contract sub-clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentItem {
    pub agreed: bool,
    pub agreed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceDates {
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// One persisted acceptance of an agreement. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub kind: AgreementKind,
    pub version: String,
    pub agreed: bool,
    pub agreed_at: DateTime<Utc>,
    pub actor: Actor,
    pub environment: ClientEnvironment,
    pub checksum: String,
    /// Contract sub-clauses; empty for the other kinds.
    pub items: BTreeMap<String, ConsentItem>,
    /// Saved dates; only for `InitialInvoiceDates`.
    pub dates: Option<InvoiceDates>,
}

/// Global append-only audit log entry, one per accepted consent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementHistoryEntry {
    pub id: Uuid,
    pub kind: AgreementKind,
    pub agreed: bool,
    pub date_display: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub user_id: String,
}

/// Member record as the consent gate and the billing engine see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub email: String,
    pub role: String,
    pub payment_method: PaymentMethod,
    /// Free-text contract date, e.g. "2026年1月15日".
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

/// Billing profile supplied when registering a member. Lock flags are not
/// part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    pub id: String,
    pub email: String,
    pub role: String,
    pub payment_method: PaymentMethod,
    pub contract_date_text: Option<String>,
    pub plan_tier: Option<String>,
    pub monthly_fee: Option<i64>,
    pub legacy_plan_name: Option<String>,
    pub selected_plan_id: Option<String>,
}

/// `"YYYY-MM"` invoicing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BillingMonth {
    first_day: NaiveDate,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        // the following month must exist too, so last_day() is always defined
        first_day.checked_add_months(Months::new(1))?;
        Some(Self { first_day })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            first_day: date.with_day(1).unwrap_or(date),
        }
    }

    /// Parse the `"YYYY-MM"` key.
    pub fn parse(raw: &str) -> Option<Self> {
        let (y, m) = raw.split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first_day
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(self.first_day)
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    /// `day` is 1-based and must not exceed `days_in_month()`.
    pub fn day(&self, day: u32) -> NaiveDate {
        self.first_day
            .checked_add_days(Days::new(u64::from(day.saturating_sub(1))))
            .unwrap_or(self.first_day)
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(InvoiceStatus::Pending),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceKind {
    /// First invoice, built from the dates saved during onboarding.
    Initial,
    /// Produced by the monthly run.
    Recurring,
}

impl InvoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::Initial => "initial",
            InvoiceKind::Recurring => "recurring",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initial" => Some(InvoiceKind::Initial),
            "recurring" => Some(InvoiceKind::Recurring),
            _ => None,
        }
    }
}

/// One invoice per (user, billing month). Only `status`/`paid_at` change
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub invoice_number: String,
    pub user_id: String,
    pub kind: InvoiceKind,
    pub billing_month: BillingMonth,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub plan_id: String,
    pub monthly_fee: i64,
    pub initial_fee: i64,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
}

/// Outbound notification emitted for each created invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub content: String,
    pub priority: NotificationPriority,
    pub audience: Audience,
    pub created_at: DateTime<Utc>,
}

/// Why a member was not invoiced in a run. Informational, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAnchor,
    AnchorNotReached,
    AlreadyExists,
    NoPlan,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoAnchor => "NoAnchor",
            SkipReason::AnchorNotReached => "AnchorNotReached",
            SkipReason::AlreadyExists => "AlreadyExists",
            SkipReason::NoPlan => "NoPlan",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Created { invoice_number: String },
    Skipped(SkipReason),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRunResult {
    pub user_id: String,
    pub outcome: RunOutcome,
}

/// Result of one monthly billing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingRunReport {
    pub run_date: NaiveDate,
    pub results: Vec<MemberRunResult>,
    pub overdue_marked: u64,
}

/// A consent submission as received from a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentSubmission {
    pub kind: AgreementKind,
    pub agreed: bool,
    pub user_id: String,
    pub environment: ClientEnvironment,
    /// Contract sub-clauses being agreed in this call.
    pub contract_items: BTreeMap<String, bool>,
    /// Required for `InitialInvoiceDates`.
    pub invoice_dates: Option<InvoiceDates>,
}

/// Result of an accepted (or no-op) submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentReceipt {
    pub kind: AgreementKind,
    pub agreed: bool,
    pub date_display: String,
    pub timestamp: DateTime<Utc>,
    /// False for `agreed=false` submissions, which persist nothing.
    pub persisted: bool,
    /// False when the agreement history write failed after the record was stored.
    pub audit_logged: bool,
}

/// Gate state of one ordered agreement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgreementState {
    pub agreed: bool,
    pub agreed_at: Option<DateTime<Utc>>,
    pub agreed_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentOverview {
    pub privacy_policy: AgreementState,
    pub member_site_terms: AgreementState,
    pub tool_terms: AgreementState,
    pub next_outstanding: Option<AgreementKind>,
    pub contract_finalized: bool,
    pub dates_saved: bool,
}
