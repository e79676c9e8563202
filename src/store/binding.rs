//! Per-table mapping between canonical and remote field names.
//!
//! Built once per table when its schema is discovered; the legacy alias table
//! is consulted here and nowhere else.
use super::{RemoteTable, Schema};
use crate::flat::codec::{date_prefix, format_number, split_list};
use crate::flat::{canonical_field_name, FieldType, FieldValue, FlatRecord, Table};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TableBinding {
    pub table: Table,
    pub table_id: String,
    /// Canonical name -> (remote name, remote type).
    fields: BTreeMap<String, (String, FieldType)>,
}

impl TableBinding {
    pub fn new(table: Table, remote: &RemoteTable, schema: &Schema) -> Self {
        let mut fields = BTreeMap::new();
        // The title field carries the natural key, whatever it is called.
        if let Some((name, _)) = schema.iter().find(|(_, ty)| **ty == FieldType::Title) {
            fields.insert(
                table.key_field().to_string(),
                (name.clone(), FieldType::Title),
            );
        }
        for (name, ty) in schema {
            if *ty == FieldType::Title {
                continue;
            }
            match fields.entry(canonical_field_name(table, name)) {
                Entry::Vacant(slot) => {
                    slot.insert((name.clone(), *ty));
                }
                Entry::Occupied(slot) => tracing::warn!(
                    table = table.name(),
                    field = name.as_str(),
                    bound = slot.get().0.as_str(),
                    "remote field shadows an already bound field; ignored"
                ),
            }
        }
        Self {
            table,
            table_id: remote.id.clone(),
            fields,
        }
    }

    pub fn remote_name(&self, canonical: &str) -> Option<&str> {
        self.fields.get(canonical).map(|(remote, _)| remote.as_str())
    }

    pub fn has_field(&self, canonical: &str) -> bool {
        self.fields.contains_key(canonical)
    }

    /// Record a field created on the remote side under its canonical name.
    pub fn bind_created(&mut self, canonical: &str, ty: FieldType) {
        self.fields
            .entry(canonical.to_string())
            .or_insert_with(|| (canonical.to_string(), ty));
    }

    /// Rename to remote names and coerce values to the remote types.
    ///
    /// Fields the remote schema lacks, or whose value cannot be expressed in
    /// the remote type, are dropped and returned by canonical name.
    pub fn to_remote(&self, record: &FlatRecord) -> (FlatRecord, Vec<String>) {
        let mut out = FlatRecord::new();
        let mut dropped = Vec::new();
        for (name, value) in record.iter() {
            let coerced = self
                .fields
                .get(name)
                .and_then(|(remote, ty)| coerce(value, *ty).map(|value| (remote, value)));
            match coerced {
                Some((remote, value)) => out.insert(remote, value),
                None => dropped.push(name.clone()),
            }
        }
        (out, dropped)
    }

    /// Remote blanks for the table's flattened fields that `record` omits, so
    /// an update clears values removed from the document since the last push.
    /// The key and the sync gate are left alone.
    pub fn blanks_for(&self, record: &FlatRecord) -> FlatRecord {
        let key = self.table.key_field();
        let mut out = FlatRecord::new();
        for name in self.table.fields() {
            if *name == key || record.contains(name) {
                continue;
            }
            if let Some((remote, ty)) = self.fields.get(*name) {
                if let Some(blank) = FieldValue::blank(*ty) {
                    out.insert(remote, blank);
                }
            }
        }
        out
    }

    /// Rename a remote row to canonical names, dropping unbound fields.
    pub fn to_canonical(&self, record: &FlatRecord) -> FlatRecord {
        let reverse: BTreeMap<&str, &str> = self
            .fields
            .iter()
            .map(|(canonical, (remote, _))| (remote.as_str(), canonical.as_str()))
            .collect();
        let mut out = FlatRecord::new();
        for (name, value) in record.iter() {
            if let Some(canonical) = reverse.get(name.as_str()) {
                out.insert(canonical, value.clone());
            }
        }
        out
    }
}

/// Express `value` in the `target` field type, if it can be.
fn coerce(value: &FieldValue, target: FieldType) -> Option<FieldValue> {
    if value.field_type() == target {
        return Some(value.clone());
    }
    let text = as_text(value);
    let non_empty = Some(text.clone()).filter(|text| !text.is_empty());
    match target {
        FieldType::Title => Some(FieldValue::Title(text)),
        FieldType::Text => Some(FieldValue::Text(text)),
        FieldType::Select => Some(FieldValue::Select(non_empty)),
        FieldType::MultiSelect => Some(FieldValue::MultiSelect(match value {
            FieldValue::MultiSelect(values) | FieldValue::Relation(values) => values.clone(),
            _ => split_list(&text),
        })),
        FieldType::Number => match value {
            FieldValue::Text(raw) | FieldValue::Title(raw) => {
                raw.trim().parse::<f64>().ok().map(|n| FieldValue::Number(Some(n)))
            }
            _ => None,
        },
        FieldType::Date => Some(FieldValue::Date(
            Some(date_prefix(&text)).filter(|date| !date.is_empty()),
        )),
        FieldType::Url => Some(FieldValue::Url(non_empty)),
        FieldType::Checkbox | FieldType::Relation | FieldType::Unsupported => None,
    }
}

fn as_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Title(text) | FieldValue::Text(text) => text.clone(),
        FieldValue::Number(number) => number.map(format_number).unwrap_or_default(),
        FieldValue::Checkbox(flag) => flag.to_string(),
        FieldValue::Select(choice) | FieldValue::Date(choice) | FieldValue::Url(choice) => {
            choice.clone().unwrap_or_default()
        }
        FieldValue::MultiSelect(values) | FieldValue::Relation(values) => values.join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::field;

    fn binding(table: Table, schema: &[(&str, FieldType)]) -> TableBinding {
        let schema: Schema = schema
            .iter()
            .map(|(name, ty)| (name.to_string(), *ty))
            .collect();
        let remote = RemoteTable {
            id: "db1".to_string(),
            title: "Promotions".to_string(),
        };
        TableBinding::new(table, &remote, &schema)
    }

    #[test]
    fn legacy_names_bind_to_canonical_fields() {
        let binding = binding(
            Table::Campaigns,
            &[
                ("Name", FieldType::Title),
                ("Promo ID", FieldType::Text),
                ("Sync", FieldType::Checkbox),
                ("Promotion Type", FieldType::Select),
            ],
        );
        assert_eq!(binding.remote_name(field::CAMPAIGN_ID), Some("Name"));
        assert_eq!(binding.remote_name(field::SYNC), Some("Sync"));
        assert_eq!(binding.remote_name(field::PROMO_TYPE), Some("Promotion Type"));
        assert!(!binding.has_field(field::THEME));
    }

    #[test]
    fn to_remote_coerces_and_reports_dropped_fields() {
        let binding = binding(
            Table::Offers,
            &[
                ("Offer ID", FieldType::Title),
                ("Reward Type", FieldType::Text),
                ("Category IDs", FieldType::Text),
                ("Cap Limit", FieldType::Number),
            ],
        );
        let mut record = FlatRecord::new();
        record.put_title(field::OFFER_ID, "offerX");
        record.put_select(field::REWARD_TYPE, Some("percent"));
        record.put_multi(field::CATEGORY_IDS, &["dining".to_string(), "travel".to_string()]);
        record.put_number(field::CAP_LIMIT, Some(500.0));
        record.put_text(field::POLICY_REF, Some("offer:offerX"));

        let (remote, dropped) = binding.to_remote(&record);
        assert_eq!(
            remote.get("Reward Type"),
            Some(&FieldValue::Text("percent".to_string()))
        );
        assert_eq!(
            remote.get("Category IDs"),
            Some(&FieldValue::Text("dining, travel".to_string()))
        );
        assert_eq!(dropped, vec![field::POLICY_REF.to_string()]);

        let back = binding.to_canonical(&remote);
        assert_eq!(
            back.get(field::OFFER_ID),
            Some(&FieldValue::Title("offerX".to_string()))
        );
        assert!(back.contains(field::CAP_LIMIT));
    }

    #[test]
    fn blanks_cover_omitted_flattened_fields_only() {
        let binding = binding(
            Table::Offers,
            &[
                ("Offer ID", FieldType::Title),
                ("Cap Type", FieldType::Select),
                ("Cap Key", FieldType::Text),
                ("Cap Limit", FieldType::Number),
                ("Cards", FieldType::Relation),
                ("Sync", FieldType::Checkbox),
                ("Notes", FieldType::Text),
            ],
        );
        let mut record = FlatRecord::new();
        record.put_title(field::OFFER_ID, "offerX");
        record.put_number(field::CAP_LIMIT, Some(500.0));

        let blanks = binding.blanks_for(&record);
        let names: Vec<&str> = blanks.field_names().collect();
        assert_eq!(names, vec!["Cap Key", "Cap Type"]);
        assert_eq!(blanks.get("Cap Type"), Some(&FieldValue::Select(None)));
        assert_eq!(blanks.get("Cap Key"), Some(&FieldValue::Text(String::new())));
    }
}
