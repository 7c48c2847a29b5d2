use axum::{
    routing::{get, post},
    Extension, Router,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::rest::{dto, extract::BatchToken, handlers};
use crate::domain::service::Services;

/// OpenAPI document of the membership REST surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::save_agreement,
        handlers::agreement_status,
        handlers::agreement_history,
        handlers::generate_monthly,
        handlers::create_initial_invoice,
        handlers::list_invoices,
        handlers::mark_invoice_paid,
        handlers::register_member,
        handlers::get_member,
    ),
    components(schemas(
        dto::SaveAgreementReq,
        dto::InvoiceDataReq,
        dto::SaveAgreementResp,
        dto::SavedAgreementDto,
        dto::AgreementStateDto,
        dto::AgreementStatusResp,
        dto::AgreementHistoryDto,
        dto::RunResultDto,
        dto::GenerateResp,
        dto::InvoiceDto,
        dto::InvoiceListDto,
        dto::InitialInvoiceReq,
        dto::RegisterMemberReq,
        dto::MemberDto,
        http_errors::ErrorResponse,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "agreements", description = "Consent gate"),
        (name = "invoices", description = "Billing cycle"),
        (name = "members", description = "Billing profiles"),
    )
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Mount the membership routes onto `router`.
pub fn register_routes(router: Router, services: &Services, batch_token: Option<String>) -> Router {
    let routes = Router::new()
        .route("/agreements/save", post(handlers::save_agreement))
        .route("/agreements/status", get(handlers::agreement_status))
        .route("/agreements/history", get(handlers::agreement_history))
        .route("/invoices", get(handlers::list_invoices))
        .route("/invoices/generate-monthly", post(handlers::generate_monthly))
        .route("/invoices/initial", post(handlers::create_initial_invoice))
        .route("/invoices/{invoice_number}/paid", post(handlers::mark_invoice_paid))
        .route("/members", post(handlers::register_member))
        .route("/members/{id}", get(handlers::get_member))
        .layer(Extension(services.consent.clone()))
        .layer(Extension(services.billing.clone()))
        .layer(Extension(services.members.clone()))
        .layer(Extension(BatchToken(batch_token)));

    router.merge(routes)
}
