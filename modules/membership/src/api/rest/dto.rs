use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::contract::model::{
    AgreementHistoryEntry, AgreementState, BillingRunReport, ConsentOverview,
    ConsentReceipt, Invoice, InvoiceDates, Member, MemberRunResult, NewMember, PaymentMethod,
    RunOutcome,
};
use crate::domain::billing::display_payment_date;

/// REST DTO for `POST /agreements/save`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveAgreementReq {
    /// privacyPolicy | termsAgreement | toolTermsAgreement | contract | initialInvoiceDates
    #[serde(rename = "type")]
    pub kind: String,
    pub agreed: bool,
    pub user_id: String,
    /// Contract sub-items being agreed, e.g. `{"contractTerms": true}`
    #[serde(default)]
    pub contract_data: Option<BTreeMap<String, bool>>,
    #[serde(default)]
    pub invoice_data: Option<InvoiceDataReq>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDataReq {
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl From<InvoiceDataReq> for InvoiceDates {
    fn from(req: InvoiceDataReq) -> Self {
        Self {
            invoice_date: req.invoice_date,
            due_date: req.due_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveAgreementResp {
    pub success: bool,
    pub data: SavedAgreementDto,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedAgreementDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub agreed: bool,
    /// Member-facing date of the agreement
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub persisted: bool,
    pub audit_logged: bool,
}

impl From<ConsentReceipt> for SaveAgreementResp {
    fn from(r: ConsentReceipt) -> Self {
        Self {
            success: true,
            data: SavedAgreementDto {
                kind: r.kind.as_str().to_string(),
                agreed: r.agreed,
                date: r.date_display,
                timestamp: r.timestamp,
                persisted: r.persisted,
                audit_logged: r.audit_logged,
            },
        }
    }
}

/// `?userId=` query
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementStateDto {
    pub agreed: bool,
    pub agreed_at: Option<DateTime<Utc>>,
    pub agreed_date: Option<String>,
}

impl From<AgreementState> for AgreementStateDto {
    fn from(s: AgreementState) -> Self {
        Self {
            agreed: s.agreed,
            agreed_at: s.agreed_at,
            agreed_date: s.agreed_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementStatusResp {
    pub privacy_policy: AgreementStateDto,
    pub terms_agreement: AgreementStateDto,
    pub tool_terms_agreement: AgreementStateDto,
    /// First agreement still to accept, or null when the gate is open
    pub next_outstanding: Option<String>,
    pub contract_finalized: bool,
    pub dates_saved: bool,
}

impl From<ConsentOverview> for AgreementStatusResp {
    fn from(o: ConsentOverview) -> Self {
        Self {
            privacy_policy: o.privacy_policy.into(),
            terms_agreement: o.member_site_terms.into(),
            tool_terms_agreement: o.tool_terms.into(),
            next_outstanding: o.next_outstanding.map(|k| k.as_str().to_string()),
            contract_finalized: o.contract_finalized,
            dates_saved: o.dates_saved,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementHistoryDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub agreed: bool,
    pub date_display: String,
    pub iso_timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub user_id: String,
}

impl From<AgreementHistoryEntry> for AgreementHistoryDto {
    fn from(e: AgreementHistoryEntry) -> Self {
        Self {
            id: e.id.to_string(),
            kind: e.kind.as_str().to_string(),
            agreed: e.agreed,
            date_display: e.date_display,
            iso_timestamp: e.timestamp,
            ip_address: e.ip_address,
            user_agent: e.user_agent,
            user_id: e.user_id,
        }
    }
}

/// `?date=YYYY-MM-DD` override for the batch run
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GenerateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunResultDto {
    pub user_id: String,
    /// created | skipped | failed
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<MemberRunResult> for RunResultDto {
    fn from(r: MemberRunResult) -> Self {
        let mut dto = Self {
            user_id: r.user_id,
            status: String::new(),
            reason: None,
            invoice_number: None,
            error: None,
        };
        match r.outcome {
            RunOutcome::Created { invoice_number } => {
                dto.status = "created".into();
                dto.invoice_number = Some(invoice_number);
            }
            RunOutcome::Skipped(reason) => {
                dto.status = "skipped".into();
                dto.reason = Some(reason.as_str().to_string());
            }
            RunOutcome::Failed { error } => {
                dto.status = "failed".into();
                dto.error = Some(error);
            }
        }
        dto
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResp {
    pub success: bool,
    pub run_date: NaiveDate,
    pub results: Vec<RunResultDto>,
    pub overdue_marked: u64,
}

impl From<BillingRunReport> for GenerateResp {
    fn from(r: BillingRunReport) -> Self {
        Self {
            success: true,
            run_date: r.run_date,
            results: r.results.into_iter().map(RunResultDto::from).collect(),
            overdue_marked: r.overdue_marked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDto {
    pub invoice_number: String,
    pub user_id: String,
    /// initial | recurring
    pub kind: String,
    pub billing_month: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Due date moved off weekends; display only
    pub payment_date_display: NaiveDate,
    pub plan_id: String,
    pub monthly_fee: i64,
    pub initial_fee: i64,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    /// pending | paid | overdue
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Invoice> for InvoiceDto {
    fn from(i: Invoice) -> Self {
        Self {
            payment_date_display: display_payment_date(i.due_date),
            kind: i.kind.as_str().to_string(),
            billing_month: i.billing_month.to_string(),
            status: i.status.as_str().to_string(),
            invoice_number: i.invoice_number,
            user_id: i.user_id,
            invoice_date: i.invoice_date,
            due_date: i.due_date,
            plan_id: i.plan_id,
            monthly_fee: i.monthly_fee,
            initial_fee: i.initial_fee,
            subtotal: i.subtotal,
            tax: i.tax,
            total: i.total,
            created_at: i.created_at,
            paid_at: i.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceListDto {
    pub invoices: Vec<InvoiceDto>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitialInvoiceReq {
    pub user_id: String,
}

/// REST DTO for registering a member's billing profile
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMemberReq {
    pub id: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    /// invoice | card
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    pub contract_date: Option<String>,
    pub plan_tier: Option<String>,
    pub monthly_fee: Option<i64>,
    pub plan_name: Option<String>,
    pub selected_plan_id: Option<String>,
}

fn default_role() -> String {
    "member".to_string()
}

fn default_payment_method() -> String {
    PaymentMethod::Invoice.as_str().to_string()
}

impl RegisterMemberReq {
    /// `None` when the payment method is unknown.
    pub fn into_new_member(self) -> Option<NewMember> {
        let payment_method = PaymentMethod::parse(&self.payment_method)?;
        Some(NewMember {
            id: self.id,
            email: self.email,
            role: self.role,
            payment_method,
            contract_date_text: self.contract_date,
            plan_tier: self.plan_tier,
            monthly_fee: self.monthly_fee,
            legacy_plan_name: self.plan_name,
            selected_plan_id: self.selected_plan_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: String,
    pub email: String,
    pub role: String,
    pub payment_method: String,
    pub contract_date: Option<String>,
    pub plan_tier: Option<String>,
    pub monthly_fee: Option<i64>,
    pub plan_name: Option<String>,
    pub selected_plan_id: Option<String>,
    pub contract_finalized: bool,
    pub dates_saved: bool,
    pub invoice_date: Option<NaiveDate>,
    pub confirmed_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Member> for MemberDto {
    fn from(m: Member) -> Self {
        Self {
            payment_method: m.payment_method.as_str().to_string(),
            id: m.id,
            email: m.email,
            role: m.role,
            contract_date: m.contract_date_text,
            plan_tier: m.plan_tier,
            monthly_fee: m.monthly_fee,
            plan_name: m.legacy_plan_name,
            selected_plan_id: m.selected_plan_id,
            contract_finalized: m.contract_finalized,
            dates_saved: m.dates_saved,
            invoice_date: m.invoice_date,
            confirmed_due_date: m.confirmed_due_date,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

