//! Plan resolution.
//!
//! A member's plan has been recorded in several shapes over time (tier plus
//! fee, bare fee, legacy display name, raw plan id). Resolution tries an
//! ordered list of resolvers and the first hit wins.

use std::collections::HashMap;

use crate::config::{MembershipConfig, PlanConfig};
use crate::contract::model::{Member, SkipReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    pub plan_id: String,
    pub monthly_fee: i64,
}

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanConfig>,
    legacy_names: HashMap<String, String>,
    default_plan: String,
}

type Resolver = fn(&PlanCatalog, &Member) -> Option<String>;

/// Priority order matters; do not sort.
const RESOLVERS: [(&str, Resolver); 5] = [
    ("tier_and_fee", by_tier_and_fee),
    ("fee", by_fee),
    ("legacy_name", by_legacy_name),
    ("selected_plan_id", by_selected_plan_id),
    ("default", by_default),
];

impl PlanCatalog {
    pub fn new(
        plans: Vec<PlanConfig>,
        legacy_names: HashMap<String, String>,
        default_plan: impl Into<String>,
    ) -> Self {
        Self {
            plans,
            legacy_names,
            default_plan: default_plan.into(),
        }
    }

    pub fn from_config(cfg: &MembershipConfig) -> Self {
        Self::new(
            cfg.plans.clone(),
            cfg.legacy_plan_names.clone(),
            cfg.default_plan.clone(),
        )
    }

    pub fn price_of(&self, plan_id: &str) -> Option<i64> {
        self.plans
            .iter()
            .find(|p| p.id == plan_id)
            .map(|p| p.monthly_fee)
    }

    /// First resolver hit, together with the resolver's name (for logs).
    pub fn resolve_plan_id(&self, member: &Member) -> Option<(&'static str, String)> {
        RESOLVERS
            .iter()
            .find_map(|(name, resolver)| resolver(self, member).map(|id| (*name, id)))
    }

    /// Plan id plus the fee to bill. The catalog price wins over the fee on
    /// the member record; a zero or unknown fee means there is nothing to bill.
    pub fn resolve(&self, member: &Member) -> Result<ResolvedPlan, SkipReason> {
        if member.monthly_fee == Some(0) {
            return Err(SkipReason::NoPlan);
        }
        let (source, plan_id) = self.resolve_plan_id(member).ok_or(SkipReason::NoPlan)?;
        let monthly_fee = self
            .price_of(&plan_id)
            .or(member.monthly_fee)
            .filter(|fee| *fee > 0)
            .ok_or(SkipReason::NoPlan)?;
        tracing::debug!(user_id = %member.id, %plan_id, source, "plan resolved");
        Ok(ResolvedPlan {
            plan_id,
            monthly_fee,
        })
    }
}

fn by_tier_and_fee(catalog: &PlanCatalog, member: &Member) -> Option<String> {
    let tier = member.plan_tier.as_deref()?;
    let fee = member.monthly_fee?;
    catalog
        .plans
        .iter()
        .find(|p| p.tier == tier && p.monthly_fee == fee)
        .map(|p| p.id.clone())
}

fn by_fee(catalog: &PlanCatalog, member: &Member) -> Option<String> {
    let fee = member.monthly_fee?;
    catalog
        .plans
        .iter()
        .find(|p| p.monthly_fee == fee)
        .map(|p| p.id.clone())
}

fn by_legacy_name(catalog: &PlanCatalog, member: &Member) -> Option<String> {
    let name = member.legacy_plan_name.as_deref()?;
    catalog.legacy_names.get(name.trim()).cloned()
}

fn by_selected_plan_id(_catalog: &PlanCatalog, member: &Member) -> Option<String> {
    member
        .selected_plan_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn by_default(catalog: &PlanCatalog, _member: &Member) -> Option<String> {
    (!catalog.default_plan.is_empty()).then(|| catalog.default_plan.clone())
}
