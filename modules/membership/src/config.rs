use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Configuration for the membership module (`modules.membership`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MembershipConfig {
    /// Shared secret for the batch and admin routes. Unset disables them.
    #[serde(default)]
    pub batch_token: Option<String>,
    #[serde(default = "default_tax_rate_percent")]
    pub tax_rate_percent: u32,
    /// One-off fee added to the initial invoice.
    #[serde(default = "default_initial_fee")]
    pub initial_fee: i64,
    /// Price table.
    #[serde(default = "default_plans")]
    pub plans: Vec<PlanConfig>,
    /// Old plan display names mapped to plan ids.
    #[serde(default = "default_legacy_plan_names")]
    pub legacy_plan_names: HashMap<String, String>,
    #[serde(default = "default_plan")]
    pub default_plan: String,
    /// Contract sub-clauses that must all be agreed before the contract locks.
    #[serde(default = "default_contract_required_items")]
    pub contract_required_items: Vec<String>,
    /// Version in force per agreement wire name; missing entries use `default_agreement_version`.
    #[serde(default)]
    pub agreement_versions: HashMap<String, String>,
    #[serde(default = "default_agreement_version")]
    pub default_agreement_version: String,
    /// Offset of the member-facing calendar (display dates, batch "today").
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    pub id: String,
    pub tier: String,
    pub monthly_fee: i64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            batch_token: None,
            tax_rate_percent: default_tax_rate_percent(),
            initial_fee: default_initial_fee(),
            plans: default_plans(),
            legacy_plan_names: default_legacy_plan_names(),
            default_plan: default_plan(),
            contract_required_items: default_contract_required_items(),
            agreement_versions: HashMap::new(),
            default_agreement_version: default_agreement_version(),
            display_utc_offset_hours: default_display_utc_offset_hours(),
        }
    }
}

fn default_tax_rate_percent() -> u32 {
    10
}

fn default_initial_fee() -> i64 {
    30_000
}

fn default_plans() -> Vec<PlanConfig> {
    [("basic", 15_000), ("standard", 30_000), ("premium", 60_000)]
        .into_iter()
        .map(|(id, fee)| PlanConfig {
            id: id.to_string(),
            tier: id.to_string(),
            monthly_fee: fee,
        })
        .collect()
}

fn default_legacy_plan_names() -> HashMap<String, String> {
    [
        ("ライトプラン", "basic"),
        ("スタンダードプラン", "standard"),
        ("プレミアムプラン", "premium"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_plan() -> String {
    "basic".to_string()
}

fn default_contract_required_items() -> Vec<String> {
    vec![
        "contractTerms".to_string(),
        "paymentTerms".to_string(),
        "cancellationPolicy".to_string(),
    ]
}

fn default_agreement_version() -> String {
    "1.0".to_string()
}

fn default_display_utc_offset_hours() -> i32 {
    9
}
