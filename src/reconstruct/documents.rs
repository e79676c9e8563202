//! Cards, categories and trackers: near one-to-one column mappings.
use super::{json_blob, row_key};
use crate::catalog::{Patch, PatchSet, REWARD_MODULES_ADD, TRACKERS_ADD};
use crate::diagnostics::Diagnostics;
use crate::flat::{codec, field, FlatRecord, Table};
use crate::util::{number_value, prune_blank};
use crate::vocab::MissionCreditMode;
use serde_json::{json, Map, Value};

pub fn reconstruct_card(record: &FlatRecord, patches: &mut PatchSet, diagnostics: &mut Diagnostics) {
    let table = Table::Cards;
    let Some(key) = row_key(record, table, diagnostics) else {
        return;
    };
    let mut patch = Patch::new();
    patch.insert("name".to_string(), Value::String(codec::text(record, field::NAME)));
    for (name, target) in [
        (field::CURRENCY, "currency"),
        (field::BANK, "bank"),
        (field::TYPE, "type"),
        (field::STATUS, "status"),
    ] {
        patch.insert(target.to_string(), Value::String(codec::choice_or_text(record, name)));
    }
    if let Some(fcf) = codec::number(record, field::FCF) {
        patch.insert("fcf".to_string(), number_value(fcf));
    }
    if record.contains(field::HIDDEN) {
        patch.insert("hidden".to_string(), Value::Bool(codec::boolean(record, field::HIDDEN)));
    }

    // Redemption blob, then its columns on top.
    let mut redemption = match json_blob(record, field::REDEMPTION, table, &key, diagnostics) {
        Some(Value::Object(map)) => map,
        Some(_) => {
            diagnostics.warn(table.name(), Some(&key), "redemption is not a JSON object; ignored");
            Map::new()
        }
        None => Map::new(),
    };
    for (name, target) in [
        (field::REDEMPTION_UNIT, "unit"),
        (field::REDEMPTION_FEE, "fee"),
        (field::REDEMPTION_RATIO, "ratio"),
    ] {
        let value = codec::text(record, name);
        if !value.is_empty() {
            redemption.insert(target.to_string(), Value::String(value));
        }
    }
    if let Some(min) = codec::number(record, field::REDEMPTION_MIN) {
        redemption.insert("min".to_string(), number_value(min));
    }
    prune_blank(&mut redemption);
    if !redemption.is_empty() {
        patch.insert("redemption".to_string(), Value::Object(redemption));
    }

    prune_blank(&mut patch);
    patches.cards.merge(&key, patch);
    for module in codec::multi_or_single(record, &[field::REWARD_MODULE_IDS]) {
        patches.cards.append_to_list(&key, REWARD_MODULES_ADD, &module);
    }
    for tracker in codec::multi_or_single(record, &[field::TRACKER_IDS]) {
        patches.cards.append_to_list(&key, TRACKERS_ADD, &tracker);
    }
}

pub fn reconstruct_category(
    record: &FlatRecord,
    patches: &mut PatchSet,
    diagnostics: &mut Diagnostics,
) {
    let Some(key) = row_key(record, Table::Categories, diagnostics) else {
        return;
    };
    let mut patch = Patch::new();
    patch.insert("label".to_string(), Value::String(codec::text(record, field::LABEL)));
    patch.insert(
        "parent".to_string(),
        Value::String(codec::choice_or_text(record, field::PARENT)),
    );
    if let Some(order) = codec::number(record, field::ORDER) {
        patch.insert("order".to_string(), number_value(order));
    }
    if record.contains(field::HIDDEN) {
        patch.insert("hidden".to_string(), Value::Bool(codec::boolean(record, field::HIDDEN)));
    }
    prune_blank(&mut patch);
    patches.categories.merge(&key, patch);
}

pub fn reconstruct_tracker(
    record: &FlatRecord,
    patches: &mut PatchSet,
    diagnostics: &mut Diagnostics,
) {
    let table = Table::Trackers;
    let Some(key) = row_key(record, table, diagnostics) else {
        return;
    };
    let mut patch = Patch::new();
    patch.insert("type".to_string(), Value::String(codec::choice_or_text(record, field::TYPE)));
    patch.insert("desc".to_string(), Value::String(codec::text(record, field::DESCRIPTION)));
    let categories = codec::multi_or_single(record, &[field::MATCH]);
    if !categories.is_empty() {
        patch.insert("match".to_string(), json!(categories));
    }
    for (name, target) in [
        (field::REQ_MISSION_KEY, "req_mission_key"),
        (field::MISSION_ID, "mission_id"),
    ] {
        patch.insert(target.to_string(), Value::String(codec::text(record, name)));
    }

    let credit_mode = codec::choice_or_text(record, field::MISSION_CREDIT_MODE);
    if !credit_mode.is_empty() {
        match MissionCreditMode::parse(&credit_mode) {
            Some(mode) => {
                patch.insert("retroactive".to_string(), Value::Bool(mode.retroactive()));
            }
            None => diagnostics.warn(
                table.name(),
                Some(&key),
                format!("unknown mission_credit_mode '{credit_mode}'; field dropped"),
            ),
        }
    }

    let valid_from = codec::date_or_text(record, field::VALID_FROM);
    let mut valid_to = codec::date_or_text(record, field::VALID_TO);
    if valid_to.is_empty() {
        valid_to = codec::date_or_text(record, field::PROMO_END);
    }
    patch.insert("valid_from".to_string(), Value::String(valid_from));
    patch.insert("valid_to".to_string(), Value::String(valid_to.clone()));
    patch.insert("promo_end".to_string(), Value::String(valid_to));

    if let Some(counter) = json_blob(record, field::COUNTER, table, &key, diagnostics) {
        patch.insert("counter".to_string(), counter);
    }

    prune_blank(&mut patch);
    patches.trackers.merge(&key, patch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::FieldValue;

    #[test]
    fn card_columns_override_redemption_blob() {
        let mut record = FlatRecord::new();
        record.put_title(field::CARD_ID, "cardA");
        record.put_text(field::NAME, Some("Card A"));
        record.put_select(field::CURRENCY, Some("RC"));
        record.put_json(
            field::REDEMPTION,
            &json!({"unit": "RC", "min": 40, "fee": "free"}),
        );
        record.put_number(field::REDEMPTION_MIN, Some(100.0));
        record.put_multi(field::REWARD_MODULE_IDS, &["base".to_string(), "bonus".to_string()]);
        record.put_bool(field::HIDDEN, false);

        let mut patches = PatchSet::default();
        let mut diagnostics = Diagnostics::new();
        reconstruct_card(&record, &mut patches, &mut diagnostics);

        let patch = patches.cards.get("cardA").expect("card patch");
        assert_eq!(patch["name"], json!("Card A"));
        assert_eq!(patch["currency"], json!("RC"));
        assert_eq!(patch["hidden"], json!(false));
        assert_eq!(
            patch["redemption"],
            json!({"unit": "RC", "min": 100, "fee": "free"})
        );
        assert_eq!(patch[REWARD_MODULES_ADD], json!(["base", "bonus"]));
        assert!(!patch.contains_key("bank"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn category_keeps_zero_order() {
        let mut record = FlatRecord::new();
        record.put_title(field::CATEGORY_KEY, "dining");
        record.put_text(field::LABEL, Some("Dining"));
        record.put_number(field::ORDER, Some(0.0));

        let mut patches = PatchSet::default();
        reconstruct_category(&record, &mut patches, &mut Diagnostics::new());
        let patch = patches.categories.get("dining").expect("category patch");
        assert_eq!(patch["order"], json!(0));
        assert!(!patch.contains_key("parent"));
        assert!(!patch.contains_key("hidden"));
    }

    #[test]
    fn tracker_with_bad_counter_blob_keeps_other_fields() {
        let mut record = FlatRecord::new();
        record.put_title(field::TRACKER_KEY, "spend_tracker");
        record.put_select(field::TYPE, Some("mission_tracker"));
        record.insert(field::COUNTER, FieldValue::Text("{not json".to_string()));
        record.put_select(field::MISSION_CREDIT_MODE, Some("from_unlock_only"));
        record.put_date(field::PROMO_END, Some("2026-05-31"));

        let mut patches = PatchSet::default();
        let mut diagnostics = Diagnostics::new();
        reconstruct_tracker(&record, &mut patches, &mut diagnostics);

        let patch = patches.trackers.get("spend_tracker").expect("tracker patch");
        assert_eq!(patch["type"], json!("mission_tracker"));
        assert_eq!(patch["retroactive"], json!(false));
        assert_eq!(patch["valid_to"], json!("2026-05-31"));
        assert_eq!(patch["promo_end"], json!("2026-05-31"));
        assert!(!patch.contains_key("counter"));
        assert!(diagnostics.mentions("trackers", "counter"));
    }
}
