use std::collections::HashMap;
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};

use crate::config::MembershipConfig;
use crate::contract::model::AgreementKind;
use crate::domain::error::DomainError;
use crate::domain::plan::PlanCatalog;
use crate::domain::ports::{Clock, NotificationPort};
use crate::domain::repo::{MembershipRepository, RepoError};

pub mod billing;
pub mod consent;
pub mod members;

pub use billing::BillingService;
pub use consent::ConsentService;
pub use members::MemberService;

/// The services one membership instance exposes, shared by REST and the
/// local client.
#[derive(Clone)]
pub struct Services {
    pub consent: Arc<ConsentService>,
    pub billing: Arc<BillingService>,
    pub members: Arc<MemberService>,
}

impl Services {
    pub fn new(
        repo: Arc<dyn MembershipRepository>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            consent: Arc::new(ConsentService::new(repo.clone(), clock.clone(), config.clone())),
            billing: Arc::new(BillingService::new(
                repo.clone(),
                notifier,
                clock.clone(),
                config,
            )),
            members: Arc::new(MemberService::new(repo, clock)),
        }
    }
}

/// Configuration for the domain services
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub display_offset: FixedOffset,
    pub tax_rate_percent: u32,
    pub initial_fee: i64,
    pub contract_required_items: Vec<String>,
    pub agreement_versions: HashMap<String, String>,
    pub default_agreement_version: String,
    pub plans: PlanCatalog,
}

impl ServiceConfig {
    pub fn from_config(cfg: &MembershipConfig) -> Result<Self, DomainError> {
        let display_offset = cfg
            .display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                DomainError::validation(
                    "display_utc_offset_hours",
                    format!("{} is out of range", cfg.display_utc_offset_hours),
                )
            })?;
        if cfg.initial_fee < 0 {
            return Err(DomainError::validation("initial_fee", "must not be negative"));
        }
        Ok(Self {
            display_offset,
            tax_rate_percent: cfg.tax_rate_percent,
            initial_fee: cfg.initial_fee,
            contract_required_items: cfg.contract_required_items.clone(),
            agreement_versions: cfg.agreement_versions.clone(),
            default_agreement_version: cfg.default_agreement_version.clone(),
            plans: PlanCatalog::from_config(cfg),
        })
    }

    pub fn agreement_version(&self, kind: AgreementKind) -> &str {
        self.agreement_versions
            .get(kind.as_str())
            .map(String::as_str)
            .unwrap_or(&self.default_agreement_version)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let cfg = MembershipConfig::default();
        Self {
            display_offset: cfg
                .display_utc_offset_hours
                .checked_mul(3600)
                .and_then(FixedOffset::east_opt)
                .unwrap_or_else(|| Utc.fix()),
            tax_rate_percent: cfg.tax_rate_percent,
            initial_fee: cfg.initial_fee,
            contract_required_items: cfg.contract_required_items.clone(),
            agreement_versions: cfg.agreement_versions.clone(),
            default_agreement_version: cfg.default_agreement_version.clone(),
            plans: PlanCatalog::from_config(&cfg),
        }
    }
}

/// Storage failures surface as `Database`; conflicts are mapped by callers
/// that know what the conflict means.
pub(crate) fn storage(e: RepoError) -> DomainError {
    DomainError::database(e.to_string())
}
