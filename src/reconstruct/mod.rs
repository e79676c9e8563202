//! Reconstructor: edited flat records back to sparse document patches.
//!
//! Every row is handled independently. A row without a natural key is
//! skipped; a malformed JSON blob is treated as absent; an unknown enum value
//! drops that one field. Each case leaves a diagnostic and the pass carries
//! on.
mod campaign;
mod documents;
mod offer;

pub use campaign::reconstruct_campaign;
pub use documents::{reconstruct_card, reconstruct_category, reconstruct_tracker};
pub use offer::reconstruct_offer;

use crate::catalog::{PatchSet, Window};
use crate::diagnostics::Diagnostics;
use crate::flat::{codec, field, FlatRecord, PolicyRef, Table, TableSet};
use crate::util::number_value;
use crate::window::{sort_windows, window_from_value};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Patches and diagnostics produced by one reconstruction pass.
#[derive(Debug, Default)]
pub struct Reconstruction {
    pub patches: PatchSet,
    pub diagnostics: Diagnostics,
}

/// Reconstruct every pullable table present in `tables`.
///
/// Window rows are read from the `windows` table regardless of which rows
/// were flagged; they only matter through the offer or campaign that owns
/// them.
pub fn reconstruct(tables: &TableSet) -> Reconstruction {
    let mut out = Reconstruction::default();
    let windows = WindowIndex::from_rows(rows(tables, Table::Windows), &mut out.diagnostics);

    for record in rows(tables, Table::Cards) {
        reconstruct_card(record, &mut out.patches, &mut out.diagnostics);
    }
    for record in rows(tables, Table::Categories) {
        reconstruct_category(record, &mut out.patches, &mut out.diagnostics);
    }
    for record in rows(tables, Table::Offers) {
        reconstruct_offer(record, &windows, &mut out.patches, &mut out.diagnostics);
    }
    for record in rows(tables, Table::Trackers) {
        reconstruct_tracker(record, &mut out.patches, &mut out.diagnostics);
    }
    for record in rows(tables, Table::Campaigns) {
        reconstruct_campaign(record, &windows, &mut out.patches, &mut out.diagnostics);
    }

    tracing::debug!(
        patches = out.patches.total(),
        diagnostics = out.diagnostics.len(),
        "reconstructed flat records"
    );
    out
}

fn rows(tables: &TableSet, table: Table) -> &[FlatRecord] {
    tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
}

/// Natural key of a row, or a warning and `None`.
pub(crate) fn row_key(
    record: &FlatRecord,
    table: Table,
    diagnostics: &mut Diagnostics,
) -> Option<String> {
    let key = codec::text(record, table.key_field());
    if key.is_empty() {
        diagnostics.warn(
            table.name(),
            None,
            format!("row without {}; skipped", table.key_field()),
        );
        return None;
    }
    Some(key)
}

/// Parse a JSON blob field; malformed text is reported and treated as absent.
pub(crate) fn json_blob(
    record: &FlatRecord,
    name: &str,
    table: Table,
    key: &str,
    diagnostics: &mut Diagnostics,
) -> Option<Value> {
    match codec::json_or_text(record, name) {
        Ok(value) => value,
        Err(err) => {
            diagnostics.warn(table.name(), Some(key), format!("{err:#}; field ignored"));
            None
        }
    }
}

/// Policy fields carried as flat columns, in document (camelCase) shape.
///
/// Blank columns are left out so merging the fragment never erases.
pub(crate) fn policy_fragment(record: &FlatRecord) -> Map<String, Value> {
    let mut fragment = Map::new();
    put_str(&mut fragment, "startDate", codec::date_or_text(record, field::START_DATE));
    put_str(&mut fragment, "endDate", codec::date_or_text(record, field::END_DATE));
    put_str(&mut fragment, "audienceRule", codec::text(record, field::AUDIENCE_RULE));

    let mut period = Map::new();
    put_str(&mut period, "type", codec::choice_or_text(record, field::PERIOD_TYPE));
    put_num(&mut period, "startDay", codec::number(record, field::START_DAY));
    put_num(&mut period, "startMonth", codec::number(record, field::START_MONTH));
    if !period.is_empty() {
        fragment.insert("period".to_string(), Value::Object(period));
    }

    let mut recurrence = Map::new();
    put_str(&mut recurrence, "freq", codec::choice_or_text(record, field::RECUR_FREQ));
    put_num(&mut recurrence, "interval", codec::number(record, field::RECUR_INTERVAL));
    put_str(&mut recurrence, "until", codec::date_or_text(record, field::RECUR_UNTIL));
    if !recurrence.is_empty() {
        fragment.insert("recurrence".to_string(), Value::Object(recurrence));
    }
    fragment
}

fn put_str(map: &mut Map<String, Value>, key: &str, value: String) {
    if !value.is_empty() {
        map.insert(key.to_string(), Value::String(value));
    }
}

fn put_num(map: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        map.insert(key.to_string(), number_value(value));
    }
}

/// Window rows grouped by owning policy, each group in canonical order.
#[derive(Debug, Default)]
pub struct WindowIndex {
    by_ref: BTreeMap<PolicyRef, Vec<Window>>,
}

impl WindowIndex {
    pub fn from_rows(records: &[FlatRecord], diagnostics: &mut Diagnostics) -> Self {
        let mut by_ref: BTreeMap<PolicyRef, Vec<Map<String, Value>>> = BTreeMap::new();
        for record in records {
            let Some(key) = row_key(record, Table::Windows, diagnostics) else {
                continue;
            };
            let raw_ref = codec::text(record, field::POLICY_REF);
            let Some(policy_ref) = PolicyRef::parse(&raw_ref) else {
                diagnostics.warn(
                    Table::Windows.name(),
                    Some(&key),
                    format!("unrecognized policy_ref '{raw_ref}'; row skipped"),
                );
                continue;
            };

            let mut raw = match json_blob(record, field::DATA, Table::Windows, &key, diagnostics) {
                Some(Value::Object(extra)) => extra,
                _ => Map::new(),
            };
            for (name, value) in policy_fragment(record) {
                raw.insert(name, value);
            }
            let id = policy_ref.window_id(&key).unwrap_or(&key).to_string();
            raw.insert("id".to_string(), Value::String(id));
            if let Some(priority) = codec::number(record, field::PRIORITY) {
                raw.insert("priority".to_string(), number_value(priority));
            }
            by_ref.entry(policy_ref).or_default().push(raw);
        }

        let by_ref = by_ref
            .into_iter()
            .map(|(policy_ref, raws)| {
                let mut windows: Vec<Window> = raws
                    .into_iter()
                    .enumerate()
                    .filter_map(|(index, raw)| window_from_value(&Value::Object(raw), index))
                    .collect();
                sort_windows(&mut windows);
                (policy_ref, windows)
            })
            .collect();
        WindowIndex { by_ref }
    }

    pub fn windows(&self, policy_ref: &PolicyRef) -> Option<&[Window]> {
        self.by_ref.get(policy_ref).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::FieldValue;

    fn window_row(key: &str, policy_ref: &str, start: &str, priority: Option<f64>) -> FlatRecord {
        let mut record = FlatRecord::new();
        record.put_title(field::WINDOW_ID, key);
        record.put_text(field::POLICY_REF, Some(policy_ref));
        record.put_date(field::START_DATE, Some(start));
        record.put_number(field::PRIORITY, priority);
        record
    }

    #[test]
    fn window_index_groups_and_sorts_rows() {
        let rows = vec![
            window_row("campaign:spring#late", "campaign:spring", "2026-04-01", Some(2.0)),
            window_row("campaign:spring#early", "campaign:spring", "2026-01-01", Some(1.0)),
            window_row("offer:x#1", "offer:x", "2026-02-01", None),
            window_row("orphan", "nowhere", "2026-02-01", None),
        ];
        let mut diagnostics = Diagnostics::new();
        let index = WindowIndex::from_rows(&rows, &mut diagnostics);

        let spring = index
            .windows(&PolicyRef::Campaign("spring".to_string()))
            .expect("spring windows");
        let ids: Vec<&str> = spring.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        let offer = index
            .windows(&PolicyRef::Offer("x".to_string()))
            .expect("offer windows");
        assert_eq!(offer[0].id, "1");
        assert_eq!(offer[0].priority, Some(1));
        assert!(diagnostics.mentions("windows", "policy_ref"));
    }

    #[test]
    fn policy_fragment_skips_blank_columns() {
        let mut record = FlatRecord::new();
        record.put_date(field::START_DATE, Some("2026-01-01"));
        record.insert(field::END_DATE, FieldValue::Text("2026-03-31 (inclusive)".to_string()));
        record.put_number(field::START_DAY, Some(15.0));
        record.insert(field::RECUR_FREQ, FieldValue::Select(None));

        let fragment = policy_fragment(&record);
        assert_eq!(
            Value::Object(fragment),
            serde_json::json!({
                "startDate": "2026-01-01",
                "endDate": "2026-03-31",
                "period": {"startDay": 15}
            })
        );
    }

    #[test]
    fn rows_without_keys_are_skipped_with_a_warning() {
        let mut tables = TableSet::new();
        let mut keyless = FlatRecord::new();
        keyless.put_text(field::LABEL, Some("Dining"));
        let mut named = FlatRecord::new();
        named.put_title(field::CATEGORY_KEY, "dining");
        named.put_text(field::LABEL, Some("Dining"));
        tables.insert(Table::Categories, vec![keyless, named]);

        let out = reconstruct(&tables);
        assert_eq!(out.patches.categories.len(), 1);
        assert!(out.diagnostics.mentions("categories", "category_key"));
    }

    #[test]
    fn keyless_offer_rows_do_not_stop_the_pass() {
        let offer = |id: Option<&str>, value: f64| {
            let mut record = FlatRecord::new();
            if let Some(id) = id {
                record.put_title(field::OFFER_ID, id);
            }
            record.put_select(field::REWARD_TYPE, Some("multiplier"));
            record.put_number(field::REWARD_VALUE, Some(value));
            record.put_multi(field::CARD_IDS, &["cardA".to_string()]);
            record
        };
        let mut tables = TableSet::new();
        tables.insert(
            Table::Offers,
            vec![offer(Some("first"), 2.0), offer(None, 3.0), offer(Some("last"), 4.0)],
        );

        let out = reconstruct(&tables);
        assert_eq!(out.patches.modules.len(), 2);
        assert_eq!(out.patches.modules.get("last").expect("last")["multiplier"], 4);
        assert_eq!(
            out.patches.cards.get("cardA").expect("card")[crate::catalog::REWARD_MODULES_ADD],
            serde_json::json!(["first", "last"])
        );
        assert!(out.diagnostics.mentions("offers", "offer_id"));
        assert_eq!(out.diagnostics.warnings().count(), 1);
    }
}
