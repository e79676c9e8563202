//! Sparse document patches and their application to a catalogue.
//!
//! A patch carries only fields the editor actually supplied. Applying one
//! merges into the stored document; it never replaces it.
use super::{Campaign, Card, Catalog};
use crate::diagnostics::Diagnostics;
use crate::util::push_unique;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Sparse field map for one document.
pub type Patch = Map<String, Value>;

pub const REWARD_MODULES_ADD: &str = "reward_modules_add";
pub const TRACKERS_ADD: &str = "trackers_add";

const CARD_FIELDS: &[&str] = &[
    "name",
    "currency",
    "type",
    "fcf",
    "bank",
    "status",
    "hidden",
    "redemption",
    REWARD_MODULES_ADD,
    TRACKERS_ADD,
];
const CATEGORY_FIELDS: &[&str] = &["label", "parent", "hidden", "order"];
const MODULE_FIELDS: &[&str] = &[
    "type",
    "desc",
    "rate",
    "rate_per_x",
    "multiplier",
    "apply_mode",
    "mode",
    "match",
    "retroactive",
    "promo_end",
    "valid_from",
    "valid_to",
    "cap_mode",
    "cap_limit",
    "cap_key",
    "secondary_cap_limit",
    "secondary_cap_key",
    "min_spend",
    "min_single_spend",
    "req_mission_spend",
    "req_mission_key",
    "period_policy",
];
const TRACKER_FIELDS: &[&str] = &[
    "type",
    "desc",
    "match",
    "req_mission_key",
    "mission_id",
    "promo_end",
    "valid_from",
    "valid_to",
    "effects_on_match",
    "effects_on_eligible",
    "counter",
    "retroactive",
];
const CAMPAIGN_FIELDS: &[&str] = &[
    "name",
    "period_policy",
    "promo_type",
    "icon",
    "theme",
    "cards",
    "sections",
    "capKeys",
];

/// Patches for one document kind, in first-seen id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchBucket {
    entries: Vec<(String, Patch)>,
}

impl PatchBucket {
    pub fn get(&self, id: &str) -> Option<&Patch> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, patch)| patch)
    }

    /// Patch for `id`, created empty on first use.
    pub fn patch_mut(&mut self, id: &str) -> &mut Patch {
        let pos = match self.entries.iter().position(|(entry_id, _)| entry_id == id) {
            Some(pos) => pos,
            None => {
                self.entries.push((id.to_string(), Patch::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos].1
    }

    /// Merge `patch` into the entry for `id`; `*_add` lists are unioned.
    pub fn merge(&mut self, id: &str, patch: Patch) {
        let target = self.patch_mut(id);
        for (field, value) in patch {
            if field.ends_with("_add") {
                append_unique_values(target, &field, &value);
            } else {
                target.insert(field, value);
            }
        }
    }

    /// Append `item` to the list-valued field of `id`, skipping duplicates.
    pub fn append_to_list(&mut self, id: &str, field: &str, item: &str) {
        let target = self.patch_mut(id);
        append_unique_values(target, field, &Value::Array(vec![Value::from(item)]));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Patch)> {
        self.entries.iter().map(|(id, patch)| (id.as_str(), patch))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn append_unique_values(target: &mut Patch, field: &str, incoming: &Value) {
    let mut list: Vec<String> = target
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if let Some(items) = incoming.as_array() {
        for item in items.iter().filter_map(Value::as_str) {
            push_unique(&mut list, item);
        }
    }
    target.insert(
        field.to_string(),
        Value::Array(list.into_iter().map(Value::from).collect()),
    );
}

impl Serialize for PatchBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, patch) in &self.entries {
            map.serialize_entry(id, patch)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PatchBucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .filter_map(|(id, value)| match value {
                Value::Object(patch) => Some((id, patch)),
                _ => None,
            })
            .collect();
        Ok(PatchBucket { entries })
    }
}

/// Patches for every document kind produced by one pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSet {
    pub cards: PatchBucket,
    pub categories: PatchBucket,
    pub modules: PatchBucket,
    pub trackers: PatchBucket,
    pub campaigns: PatchBucket,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
            && self.categories.is_empty()
            && self.modules.is_empty()
            && self.trackers.is_empty()
            && self.campaigns.is_empty()
    }

    pub fn total(&self) -> usize {
        self.cards.len()
            + self.categories.len()
            + self.modules.len()
            + self.trackers.len()
            + self.campaigns.len()
    }
}

/// Count of documents changed by [`apply_patches`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub updated: usize,
    pub created: usize,
}

/// Merge every patch into the catalogue.
///
/// Fields outside the per-kind allow-list are skipped with a warning; `null`
/// removes a field; `reward_modules_add`/`trackers_add` extend the card's
/// lists without duplicates.
pub fn apply_patches(
    catalog: &mut Catalog,
    patches: &PatchSet,
    diagnostics: &mut Diagnostics,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();

    for (id, patch) in patches.cards.iter() {
        let pos = catalog.cards.iter().position(|card| card.id == id);
        let current = pos.map(|pos| catalog.cards[pos].clone()).unwrap_or(Card {
            id: id.to_string(),
            ..Default::default()
        });
        let Some(mut merged) = merge_document(&current, patch, CARD_FIELDS, "cards", id, diagnostics)
        else {
            continue;
        };
        for module_id in string_list(patch.get(REWARD_MODULES_ADD)) {
            push_unique(&mut merged.reward_modules, &module_id);
        }
        for tracker_id in string_list(patch.get(TRACKERS_ADD)) {
            push_unique(&mut merged.trackers, &tracker_id);
        }
        merged.id = id.to_string();
        match pos {
            Some(pos) => {
                catalog.cards[pos] = merged;
                outcome.updated += 1;
            }
            None => {
                catalog.cards.push(merged);
                outcome.created += 1;
            }
        }
    }

    apply_keyed(
        &mut catalog.categories,
        &patches.categories,
        CATEGORY_FIELDS,
        "categories",
        diagnostics,
        &mut outcome,
    );
    apply_keyed(
        &mut catalog.modules,
        &patches.modules,
        MODULE_FIELDS,
        "modules",
        diagnostics,
        &mut outcome,
    );
    apply_keyed(
        &mut catalog.trackers,
        &patches.trackers,
        TRACKER_FIELDS,
        "trackers",
        diagnostics,
        &mut outcome,
    );

    for (id, patch) in patches.campaigns.iter() {
        let pos = catalog.campaigns.iter().position(|c| c.id == id);
        let current = pos
            .map(|pos| catalog.campaigns[pos].clone())
            .unwrap_or(Campaign {
                id: id.to_string(),
                ..Default::default()
            });
        let Some(mut merged) =
            merge_document(&current, patch, CAMPAIGN_FIELDS, "campaigns", id, diagnostics)
        else {
            continue;
        };
        merged.id = id.to_string();
        match pos {
            Some(pos) => {
                catalog.campaigns[pos] = merged;
                outcome.updated += 1;
            }
            None => {
                catalog.campaigns.push(merged);
                outcome.created += 1;
            }
        }
    }

    outcome
}

fn apply_keyed<T>(
    docs: &mut std::collections::BTreeMap<String, T>,
    bucket: &PatchBucket,
    allowed: &[&str],
    table: &str,
    diagnostics: &mut Diagnostics,
    outcome: &mut ApplyOutcome,
) where
    T: Serialize + DeserializeOwned + Default,
{
    for (id, patch) in bucket.iter() {
        let existed = docs.contains_key(id);
        let current = docs.remove(id).unwrap_or_default();
        match merge_document(&current, patch, allowed, table, id, diagnostics) {
            Some(merged) => {
                docs.insert(id.to_string(), merged);
                if existed {
                    outcome.updated += 1;
                } else {
                    outcome.created += 1;
                }
            }
            None if existed => {
                docs.insert(id.to_string(), current);
            }
            None => {}
        }
    }
}

fn merge_document<T>(
    current: &T,
    patch: &Patch,
    allowed: &[&str],
    table: &str,
    id: &str,
    diagnostics: &mut Diagnostics,
) -> Option<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut doc = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(err) => {
            diagnostics.error(table, Some(id), format!("serialize document: {err}"));
            return None;
        }
    };
    for (field, value) in patch {
        if !allowed.contains(&field.as_str()) {
            diagnostics.warn(
                table,
                Some(id),
                format!("field '{field}' is not editable and was skipped"),
            );
            continue;
        }
        if field.ends_with("_add") {
            continue;
        }
        if value.is_null() {
            doc.remove(field);
        } else {
            doc.insert(field.clone(), value.clone());
        }
    }
    match serde_json::from_value(Value::Object(doc)) {
        Ok(merged) => Some(merged),
        Err(err) => {
            diagnostics.warn(
                table,
                Some(id),
                format!("patch produced an invalid document and was skipped: {err}"),
            );
            None
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RewardModule;
    use serde_json::json;

    fn object(value: Value) -> Patch {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn bucket_merge_unions_add_lists_in_first_seen_order() {
        let mut bucket = PatchBucket::default();
        bucket.merge("cardA", object(json!({"trackers_add": ["t1", "t2"]})));
        bucket.merge("cardA", object(json!({"trackers_add": ["t2", "t3"], "name": "A"})));
        bucket.append_to_list("cardA", TRACKERS_ADD, "t1");

        let patch = bucket.get("cardA").expect("card patch");
        assert_eq!(patch["trackers_add"], json!(["t1", "t2", "t3"]));
        assert_eq!(patch["name"], json!("A"));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn apply_merges_without_replacing_documents() {
        let mut catalog = Catalog::default();
        catalog.cards.push(Card {
            id: "cardA".to_string(),
            name: "Card A".to_string(),
            reward_modules: vec!["base".to_string()],
            ..Default::default()
        });
        catalog.modules.insert(
            "offerX".to_string(),
            RewardModule {
                kind: "category".to_string(),
                desc: "Dining".to_string(),
                rate: Some(0.02),
                ..Default::default()
            },
        );

        let mut patches = PatchSet::default();
        patches.cards.merge(
            "cardA",
            object(json!({"reward_modules_add": ["offerX", "base"], "currency": "RC"})),
        );
        patches.modules.merge(
            "offerX",
            object(json!({"rate": 0.05, "desc": null, "source_url": "https://x"})),
        );

        let mut diagnostics = Diagnostics::new();
        let outcome = apply_patches(&mut catalog, &patches, &mut diagnostics);

        assert_eq!(outcome, ApplyOutcome { updated: 2, created: 0 });
        let card = &catalog.cards[0];
        assert_eq!(card.name, "Card A");
        assert_eq!(card.currency, "RC");
        assert_eq!(card.reward_modules, vec!["base", "offerX"]);

        let module = &catalog.modules["offerX"];
        assert_eq!(module.kind, "category");
        assert_eq!(module.rate, Some(0.05));
        assert!(module.desc.is_empty());
        assert!(diagnostics.mentions("modules", "source_url"));
    }

    #[test]
    fn apply_creates_missing_documents() {
        let mut catalog = Catalog::default();
        let mut patches = PatchSet::default();
        patches.trackers.merge(
            "offerX_tracker",
            object(json!({"type": "mission_tracker", "mission_id": "offerX"})),
        );
        patches
            .campaigns
            .merge("spring", object(json!({"name": "Spring"})));

        let mut diagnostics = Diagnostics::new();
        let outcome = apply_patches(&mut catalog, &patches, &mut diagnostics);

        assert_eq!(outcome.created, 2);
        assert_eq!(
            catalog.trackers["offerX_tracker"].mission_id.as_deref(),
            Some("offerX")
        );
        assert_eq!(catalog.campaigns[0].id, "spring");
        assert!(diagnostics.is_empty());
    }
}
