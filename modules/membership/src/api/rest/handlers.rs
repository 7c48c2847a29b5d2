use std::sync::Arc;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::Json,
    Extension,
};
use http_errors::ApiError;
use tracing::{error, info, Span};

use crate::api::rest::dto::{
    AgreementHistoryDto, AgreementStatusResp, GenerateQuery, GenerateResp, InitialInvoiceReq,
    InvoiceDto, InvoiceListDto, MemberDto, RegisterMemberReq, SaveAgreementReq, SaveAgreementResp,
    UserQuery,
};
use crate::api::rest::error::{map_domain_error, tag_request};
use crate::api::rest::extract::{client_environment, request_id, ApiJson, ApiQuery, BatchAuth};
use crate::contract::model::{AgreementKind, ConsentSubmission};
use crate::domain::service::{BillingService, ConsentService, MemberService};
use crate::errors;

/// Record one agreement
#[utoipa::path(
    post,
    path = "/agreements/save",
    tag = "agreements",
    request_body = SaveAgreementReq,
    responses(
        (status = 200, description = "Agreement recorded", body = SaveAgreementResp),
        (status = 400, description = "Bad Request", body = http_errors::ErrorResponse),
        (status = 404, description = "User not found", body = http_errors::ErrorResponse),
        (status = 409, description = "Contract finalized or dates locked", body = http_errors::ErrorResponse),
        (status = 500, description = "Internal Server Error", body = http_errors::ErrorResponse)
    )
)]
pub async fn save_agreement(
    Extension(svc): Extension<Arc<ConsentService>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<SaveAgreementReq>,
) -> Result<Json<SaveAgreementResp>, ApiError> {
    let rid = request_id(&headers);
    Span::current().record("user_id", req.user_id.as_str());
    let kind = AgreementKind::parse(&req.kind).ok_or_else(|| {
        let err = errors::VALIDATION.to_error(format!("Unknown agreement type '{}'", req.kind));
        tag_request(err, rid)
    })?;
    info!(user_id = %req.user_id, kind = %kind, agreed = req.agreed, "Saving agreement");

    let submission = ConsentSubmission {
        kind,
        agreed: req.agreed,
        user_id: req.user_id,
        environment: client_environment(&headers),
        contract_items: req.contract_data.unwrap_or_default(),
        invoice_dates: req.invoice_data.map(Into::into),
    };

    match svc.submit(submission).await {
        Ok(receipt) => Ok(Json(receipt.into())),
        Err(e) => {
            error!("Failed to save agreement: {}", e);
            Err(map_domain_error(&e, rid))
        }
    }
}

/// Gate status of the ordered agreements
#[utoipa::path(
    get,
    path = "/agreements/status",
    tag = "agreements",
    params(UserQuery),
    responses(
        (status = 200, description = "Agreement status", body = AgreementStatusResp),
        (status = 404, description = "User not found", body = http_errors::ErrorResponse),
        (status = 500, description = "Internal Server Error", body = http_errors::ErrorResponse)
    )
)]
pub async fn agreement_status(
    Extension(svc): Extension<Arc<ConsentService>>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<AgreementStatusResp>, ApiError> {
    match svc.overview(&query.user_id).await {
        Ok(overview) => Ok(Json(overview.into())),
        Err(e) => {
            error!("Failed to load agreement status for {}: {}", query.user_id, e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}

/// Agreement history of a member, newest first
#[utoipa::path(
    get,
    path = "/agreements/history",
    tag = "agreements",
    params(UserQuery),
    responses(
        (status = 200, description = "Agreement history", body = [AgreementHistoryDto]),
        (status = 404, description = "User not found", body = http_errors::ErrorResponse),
        (status = 500, description = "Internal Server Error", body = http_errors::ErrorResponse)
    )
)]
pub async fn agreement_history(
    Extension(svc): Extension<Arc<ConsentService>>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<Vec<AgreementHistoryDto>>, ApiError> {
    match svc.history(&query.user_id).await {
        Ok(entries) => Ok(Json(entries.into_iter().map(Into::into).collect())),
        Err(e) => {
            error!("Failed to load agreement history for {}: {}", query.user_id, e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}

/// Run monthly invoicing
#[utoipa::path(
    post,
    path = "/invoices/generate-monthly",
    tag = "invoices",
    params(GenerateQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Per-member results", body = GenerateResp),
        (status = 401, description = "Unauthorized", body = http_errors::ErrorResponse),
        (status = 403, description = "Batch endpoints disabled", body = http_errors::ErrorResponse),
        (status = 500, description = "Internal Server Error", body = http_errors::ErrorResponse)
    )
)]
pub async fn generate_monthly(
    _auth: BatchAuth,
    Extension(svc): Extension<Arc<BillingService>>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<GenerateQuery>,
) -> Result<Json<GenerateResp>, ApiError> {
    let today = query.date.unwrap_or_else(|| svc.today());
    info!(%today, "Monthly invoice generation requested");

    match svc.run_monthly(today).await {
        Ok(report) => Ok(Json(report.into())),
        Err(e) => {
            error!("Monthly invoice run failed: {}", e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}

/// Create the initial invoice from saved onboarding dates
#[utoipa::path(
    post,
    path = "/invoices/initial",
    tag = "invoices",
    request_body = InitialInvoiceReq,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Initial invoice created", body = InvoiceDto),
        (status = 400, description = "Dates not saved or no billable plan", body = http_errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = http_errors::ErrorResponse),
        (status = 404, description = "User not found", body = http_errors::ErrorResponse),
        (status = 409, description = "Invoice already exists", body = http_errors::ErrorResponse)
    )
)]
pub async fn create_initial_invoice(
    _auth: BatchAuth,
    Extension(svc): Extension<Arc<BillingService>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<InitialInvoiceReq>,
) -> Result<(StatusCode, Json<InvoiceDto>), ApiError> {
    Span::current().record("user_id", req.user_id.as_str());
    match svc.create_initial_invoice(&req.user_id).await {
        Ok(invoice) => Ok((StatusCode::CREATED, Json(invoice.into()))),
        Err(e) => {
            error!("Failed to create initial invoice for {}: {}", req.user_id, e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}

/// List a member's invoices
#[utoipa::path(
    get,
    path = "/invoices",
    tag = "invoices",
    params(UserQuery),
    responses(
        (status = 200, description = "Invoices, newest billing month first", body = InvoiceListDto),
        (status = 404, description = "User not found", body = http_errors::ErrorResponse)
    )
)]
pub async fn list_invoices(
    Extension(svc): Extension<Arc<BillingService>>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<InvoiceListDto>, ApiError> {
    match svc.list_invoices(&query.user_id).await {
        Ok(invoices) => {
            let invoices: Vec<InvoiceDto> = invoices.into_iter().map(InvoiceDto::from).collect();
            Ok(Json(InvoiceListDto {
                total: invoices.len(),
                invoices,
            }))
        }
        Err(e) => {
            error!("Failed to list invoices for {}: {}", query.user_id, e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}

/// Record payment of an invoice
#[utoipa::path(
    post,
    path = "/invoices/{invoice_number}/paid",
    tag = "invoices",
    params(("invoice_number" = String, Path, description = "Invoice number")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Invoice marked paid", body = InvoiceDto),
        (status = 401, description = "Unauthorized", body = http_errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = http_errors::ErrorResponse)
    )
)]
pub async fn mark_invoice_paid(
    _auth: BatchAuth,
    Extension(svc): Extension<Arc<BillingService>>,
    headers: HeaderMap,
    Path(invoice_number): Path<String>,
) -> Result<Json<InvoiceDto>, ApiError> {
    match svc.mark_paid(&invoice_number).await {
        Ok(invoice) => Ok(Json(invoice.into())),
        Err(e) => {
            error!("Failed to mark invoice {} paid: {}", invoice_number, e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}

/// Register or replace a member's billing profile
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    request_body = RegisterMemberReq,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Stored member", body = MemberDto),
        (status = 400, description = "Bad Request", body = http_errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = http_errors::ErrorResponse)
    )
)]
pub async fn register_member(
    _auth: BatchAuth,
    Extension(svc): Extension<Arc<MemberService>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<RegisterMemberReq>,
) -> Result<Json<MemberDto>, ApiError> {
    let rid = request_id(&headers);
    let payment_method = req.payment_method.clone();
    let member = req.into_new_member().ok_or_else(|| {
        let err =
            errors::VALIDATION.to_error(format!("Unknown payment method '{payment_method}'"));
        tag_request(err, rid)
    })?;

    match svc.register(member).await {
        Ok(member) => Ok(Json(member.into())),
        Err(e) => {
            error!("Failed to register member: {}", e);
            Err(map_domain_error(&e, rid))
        }
    }
}

/// Get a member profile with its lock flags
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    params(("id" = String, Path, description = "Member id")),
    responses(
        (status = 200, description = "Member found", body = MemberDto),
        (status = 404, description = "User not found", body = http_errors::ErrorResponse)
    )
)]
pub async fn get_member(
    Extension(svc): Extension<Arc<MemberService>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MemberDto>, ApiError> {
    match svc.get(&id).await {
        Ok(member) => Ok(Json(member.into())),
        Err(e) => {
            error!("Failed to get member {}: {}", id, e);
            Err(map_domain_error(&e, request_id(&headers)))
        }
    }
}
