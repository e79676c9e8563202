//! Campaign rows: blob policy merged with flat columns and window rows.
use super::{json_blob, policy_fragment, row_key, WindowIndex};
use crate::catalog::{Patch, PatchSet};
use crate::diagnostics::Diagnostics;
use crate::flat::{codec, field, FlatRecord, PolicyRef, Table};
use crate::util::prune_blank;
use crate::window::{
    effective_windows, infer_mode, merge_policy, policy_from_value, policy_to_map, sort_windows,
    window_from_value, IMPLICIT_WINDOW_ID,
};
use serde_json::{json, Map, Value};

pub fn reconstruct_campaign(
    record: &FlatRecord,
    windows: &WindowIndex,
    patches: &mut PatchSet,
    diagnostics: &mut Diagnostics,
) {
    let table = Table::Campaigns;
    let Some(key) = row_key(record, table, diagnostics) else {
        return;
    };
    let mut patch = Patch::new();
    patch.insert("name".to_string(), Value::String(codec::text(record, field::NAME)));
    patch.insert("theme".to_string(), Value::String(codec::choice_or_text(record, field::THEME)));
    patch.insert("icon".to_string(), Value::String(codec::text(record, field::ICON)));
    patch.insert(
        "promo_type".to_string(),
        Value::String(codec::choice_or_text(record, field::PROMO_TYPE)),
    );
    let cards = codec::multi_or_single(record, &[field::CARD_IDS, field::CARDS]);
    if !cards.is_empty() {
        patch.insert("cards".to_string(), json!(cards));
    }
    let cap_keys = codec::multi_or_single(record, &[field::CAP_KEYS]);
    if !cap_keys.is_empty() {
        patch.insert("capKeys".to_string(), json!(cap_keys));
    }

    if let Some(policy) = campaign_policy(record, &key, windows, diagnostics) {
        patch.insert("period_policy".to_string(), Value::Object(policy));
    }

    prune_blank(&mut patch);
    patches.campaigns.merge(&key, patch);
}

/// Merged period policy for a campaign row, or `None` when the row carries
/// no policy information at all.
fn campaign_policy(
    record: &FlatRecord,
    key: &str,
    windows: &WindowIndex,
    diagnostics: &mut Diagnostics,
) -> Option<Map<String, Value>> {
    let table = Table::Campaigns;
    let mut base = match json_blob(record, field::PERIOD_POLICY, table, key, diagnostics) {
        Some(Value::Object(map)) => map,
        Some(_) => {
            diagnostics.warn(
                table.name(),
                Some(key),
                "period_policy is not a JSON object; field ignored",
            );
            Map::new()
        }
        None => Map::new(),
    };
    let fragment = policy_fragment(record);
    let rows = windows.windows(&PolicyRef::Campaign(key.to_string()));
    let explicit_mode = codec::choice_or_text(record, field::POLICY_MODE);
    if base.is_empty() && fragment.is_empty() && rows.is_none() && explicit_mode.is_empty() {
        return None;
    }

    match rows {
        // Window rows replace the blob's windows; the first-window columns
        // only matter when no rows exist.
        Some(rows) => {
            let rows = serde_json::to_value(rows).unwrap_or(Value::Array(Vec::new()));
            base.insert("windows".to_string(), rows);
        }
        None => {
            let mut listed: Vec<_> = base
                .get("windows")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .enumerate()
                        .filter_map(|(index, item)| window_from_value(item, index))
                        .collect()
                })
                .unwrap_or_default();
            if !listed.is_empty() {
                // The columns describe the first window in canonical order.
                sort_windows(&mut listed);
                let mut sorted: Vec<Value> = listed
                    .iter()
                    .filter_map(|window| serde_json::to_value(window).ok())
                    .collect();
                if let Some(Value::Object(first)) = sorted.first_mut() {
                    *first = merge_policy(first, &fragment);
                }
                base.insert("windows".to_string(), Value::Array(sorted));
            } else {
                base = merge_policy(&base, &fragment);
            }
        }
    }

    let mut policy = match policy_from_value(&Value::Object(base)) {
        Ok(policy) => policy,
        Err(err) => {
            diagnostics.warn(
                table.name(),
                Some(key),
                format!("{err:#}; period policy left unchanged"),
            );
            return None;
        }
    };
    let window_count = effective_windows(&policy, IMPLICIT_WINDOW_ID).len();
    if let Some(mode) = infer_mode(Some(&explicit_mode), window_count) {
        policy.mode = Some(mode);
    }
    Some(policy_to_map(&policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::FieldValue;

    fn campaign_row(id: &str) -> FlatRecord {
        let mut record = FlatRecord::new();
        record.put_title(field::CAMPAIGN_ID, id);
        record
    }

    fn run(record: &FlatRecord, window_rows: &[FlatRecord]) -> (PatchSet, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let windows = WindowIndex::from_rows(window_rows, &mut diagnostics);
        let mut patches = PatchSet::default();
        reconstruct_campaign(record, &windows, &mut patches, &mut diagnostics);
        (patches, diagnostics)
    }

    #[test]
    fn flat_columns_win_over_blob_without_erasing_it() {
        let mut row = campaign_row("spring");
        row.put_json(
            field::PERIOD_POLICY,
            &json!({
                "mode": "fixed",
                "period": {"type": "promo", "startDate": "2026-01-01", "endDate": "2026-02-28"},
                "audienceRule": "all"
            }),
        );
        row.put_date(field::END_DATE, Some("2026-03-31"));
        row.put_number(field::START_DAY, Some(1.0));

        let (patches, diagnostics) = run(&row, &[]);
        let patch = patches.campaigns.get("spring").expect("campaign patch");
        let policy = &patch["period_policy"];
        assert_eq!(policy["endDate"], json!("2026-03-31"));
        assert_eq!(policy["period"]["type"], json!("promo"));
        assert_eq!(policy["period"]["startDay"], json!(1));
        assert_eq!(policy["audienceRule"], json!("all"));
        assert_eq!(policy["mode"], json!("fixed"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn window_rows_replace_windows_and_recompute_mode() {
        let mut row = campaign_row("spring");
        row.put_json(
            field::PERIOD_POLICY,
            &json!({"mode": "fixed", "windows": [{"id": "old", "startDate": "2025-01-01"}]}),
        );
        let mut rows = Vec::new();
        for (id, start) in [("b", "2026-04-01"), ("a", "2026-01-01")] {
            let mut window = FlatRecord::new();
            window.put_title(field::WINDOW_ID, &format!("campaign:spring#{id}"));
            window.put_text(field::POLICY_REF, Some("campaign:spring"));
            window.put_date(field::START_DATE, Some(start));
            window.put_number(field::PRIORITY, Some(1.0));
            rows.push(window);
        }

        let (patches, _) = run(&row, &rows);
        let policy = &patches.campaigns.get("spring").expect("patch")["period_policy"];
        assert_eq!(policy["mode"], json!("composite"));
        let ids: Vec<&str> = policy["windows"]
            .as_array()
            .expect("windows")
            .iter()
            .filter_map(|w| w["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn explicit_policy_mode_column_is_kept() {
        let mut row = campaign_row("spring");
        row.put_select(field::POLICY_MODE, Some("recurring"));
        row.put_select(field::RECUR_FREQ, Some("monthly"));
        row.put_date(field::START_DATE, Some("2026-01-01"));

        let (patches, _) = run(&row, &[]);
        let policy = &patches.campaigns.get("spring").expect("patch")["period_policy"];
        assert_eq!(policy["mode"], json!("recurring"));
        assert_eq!(policy["recurrence"]["freq"], json!("monthly"));
    }

    #[test]
    fn invalid_policy_blob_is_ignored_with_a_warning() {
        let mut row = campaign_row("spring");
        row.put_text(field::NAME, Some("Spring"));
        row.insert(field::PERIOD_POLICY, FieldValue::Text("{\"mode\": ".to_string()));

        let (patches, diagnostics) = run(&row, &[]);
        let patch = patches.campaigns.get("spring").expect("patch");
        assert_eq!(patch["name"], json!("Spring"));
        assert!(!patch.contains_key("period_policy"));
        assert!(diagnostics.mentions("campaigns", "period_policy"));
    }

    #[test]
    fn first_window_columns_patch_blob_window() {
        let mut row = campaign_row("spring");
        row.put_json(
            field::PERIOD_POLICY,
            &json!({"windows": [
                {"id": "w1", "priority": 1, "startDate": "2026-01-01", "endDate": "2026-01-31"},
                {"id": "w2", "priority": 2, "startDate": "2026-03-01"}
            ]}),
        );
        row.put_date(field::END_DATE, Some("2026-02-15"));

        let (patches, _) = run(&row, &[]);
        let policy = &patches.campaigns.get("spring").expect("patch")["period_policy"];
        assert_eq!(policy["windows"][0]["endDate"], json!("2026-02-15"));
        assert_eq!(policy["windows"][1]["id"], json!("w2"));
        assert!(policy.get("endDate").is_none());
    }

    #[test]
    fn first_window_columns_follow_canonical_order() {
        let mut row = campaign_row("spring");
        row.put_json(
            field::PERIOD_POLICY,
            &json!({"windows": [
                {"id": "late", "priority": 2, "startDate": "2026-04-01", "endDate": "2026-04-30"},
                {"id": "early", "priority": 1, "startDate": "2026-01-01", "endDate": "2026-01-31"}
            ]}),
        );
        row.put_date(field::START_DATE, Some("2026-01-01"));
        row.put_date(field::END_DATE, Some("2026-02-15"));

        let (patches, _) = run(&row, &[]);
        let policy = &patches.campaigns.get("spring").expect("patch")["period_policy"];
        assert_eq!(policy["windows"][0]["id"], json!("early"));
        assert_eq!(policy["windows"][0]["endDate"], json!("2026-02-15"));
        assert_eq!(policy["windows"][1]["id"], json!("late"));
        assert_eq!(policy["windows"][1]["startDate"], json!("2026-04-01"));
        assert_eq!(policy["windows"][1]["endDate"], json!("2026-04-30"));
    }
}
