//! Typed rule documents.
//!
//! Each kind keeps the fields the sync engine understands as typed members and
//! carries everything else in a flattened `extra` map so a load/save cycle
//! never drops data.
use super::PeriodPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Redemption terms of a card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Redemption {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fee: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ratio: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bank: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcf: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redemption: Option<Redemption>,
    #[serde(
        rename = "rewardModules",
        alias = "reward_modules",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub reward_modules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trackers: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reward module ("offer" in its editor-facing flat form).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardModule {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_per_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_mode: Option<String>,
    /// Stacking mode relative to other modules (`add`/`replace`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_cap_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_cap_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_spend: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_single_spend: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_mission_spend: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_mission_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retroactive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_policy: Option<PeriodPolicy>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RewardModule {
    /// True when the module is gated on a spend mission.
    pub fn has_mission(&self) -> bool {
        self.req_mission_spend.is_some()
            || self
                .req_mission_key
                .as_deref()
                .is_some_and(|key| !key.is_empty())
    }
}

/// Usage-key increment applied when a tracker matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerEffect {
    pub key: String,
    pub amount: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_mission_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retroactive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_end: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects_on_match: Vec<TrackerEffect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects_on_eligible: Vec<TrackerEffect>,
    /// Only its presence is meaningful to the sync engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_check: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ordered display section of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub theme: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub promo_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<String>,
    #[serde(rename = "capKeys", default, skip_serializing_if = "Vec::is_empty")]
    pub cap_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_policy: Option<PeriodPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Registration metadata keyed by campaign id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub setting_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning_title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning_desc: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
