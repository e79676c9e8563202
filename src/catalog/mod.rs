//! Rule documents: the local, durable source of truth.
//!
//! The catalogue is a single JSON file holding every document kind. Flat
//! records are projections of it; pulls merge patches back into it.
mod patch;
mod policy;
mod types;

pub use patch::{apply_patches, ApplyOutcome, Patch, PatchSet, REWARD_MODULES_ADD, TRACKERS_ADD};
pub use policy::{PeriodPolicy, PeriodSpec, Recurrence, Window};
pub use types::{Campaign, Card, Category, RegistryEntry, RewardModule, Section, Tracker};

use crate::diagnostics::Diagnostics;
use crate::util::{read_json, write_json};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Current schema version for the catalogue file.
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

fn default_version() -> u32 {
    CATALOG_SCHEMA_VERSION
}

/// Every rule document, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub categories: BTreeMap<String, Category>,
    #[serde(default)]
    pub modules: BTreeMap<String, RewardModule>,
    #[serde(default)]
    pub trackers: BTreeMap<String, Tracker>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(
        rename = "campaignRegistry",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub campaign_registry: BTreeMap<String, RegistryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Catalog {
    /// Report empty or duplicate natural keys in list-shaped kinds.
    pub fn check_keys(&self, diagnostics: &mut Diagnostics) {
        check_unique("cards", self.cards.iter().map(|card| card.id.as_str()), diagnostics);
        check_unique(
            "campaigns",
            self.campaigns.iter().map(|campaign| campaign.id.as_str()),
            diagnostics,
        );
        for key in self.categories.keys().chain(self.modules.keys()) {
            if key.trim().is_empty() {
                diagnostics.warn("catalog", None, "document with an empty key");
            }
        }
    }
}

fn check_unique<'a, I>(table: &str, ids: I, diagnostics: &mut Diagnostics)
where
    I: Iterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    for id in ids {
        if id.trim().is_empty() {
            diagnostics.warn(table, None, "document without an id");
        } else if !seen.insert(id) {
            diagnostics.warn(table, Some(id), "duplicate id; later entries shadow earlier ones");
        }
    }
}

/// Load the catalogue from disk.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    read_json(path)
}

/// Persist the catalogue in a stable, pretty JSON form.
pub fn write_catalog(path: &Path, catalog: &Catalog) -> Result<()> {
    write_json(path, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_round_trip_keeps_unknown_fields() {
        let raw = json!({
            "cards": [{
                "id": "hsbc_everymile",
                "name": "HSBC EveryMile",
                "rewardModules": ["em_base"],
                "last_verified_at": "2026-02-12",
                "redemption": {"unit": "RC", "min": 40, "fee": "free", "ratio": "1 RC = 20 miles"}
            }],
            "modules": {
                "em_base": {"type": "always", "rate": 0.01, "desc": "Base", "source_url": "https://x"}
            },
            "campaigns": [{
                "id": "em_promo",
                "period_policy": {"mode": "fixed", "period": {"type": "promo", "startDate": "2026-01-01"}},
                "sections": [{"type": "mission", "label": "Progress", "missionModule": "em_bonus"}]
            }]
        });
        let catalog: Catalog = serde_json::from_value(raw).expect("parse catalog");
        assert_eq!(catalog.version, CATALOG_SCHEMA_VERSION);
        let card = catalog.cards.first().expect("card");
        assert_eq!(card.reward_modules, vec!["em_base"]);
        assert_eq!(card.extra["last_verified_at"], json!("2026-02-12"));

        let back = serde_json::to_value(&catalog).expect("serialize catalog");
        assert_eq!(back["modules"]["em_base"]["source_url"], json!("https://x"));
        assert_eq!(
            back["campaigns"][0]["sections"][0]["missionModule"],
            json!("em_bonus")
        );
        assert_eq!(
            back["campaigns"][0]["period_policy"]["period"]["startDate"],
            json!("2026-01-01")
        );
    }

    #[test]
    fn check_keys_flags_duplicates() {
        let mut catalog = Catalog::default();
        for _ in 0..2 {
            catalog.cards.push(Card {
                id: "dup".to_string(),
                ..Default::default()
            });
        }
        let mut diagnostics = Diagnostics::new();
        catalog.check_keys(&mut diagnostics);
        assert!(diagnostics.mentions("cards", "duplicate id"));
    }
}
