//! Flat records: one row of scalar and simple-list fields per document.
//!
//! Field values keep the editor's structural shape (text vs. select vs.
//! number) so decoders can degrade gracefully when an external schema is
//! looser than expected.
pub mod codec;
mod tables;

pub use tables::{canonical_field_name, field, normalize_name, resolve_table_alias, Table};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Structural type of a remote field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Title,
    Text,
    Number,
    Checkbox,
    Select,
    MultiSelect,
    Date,
    Url,
    Relation,
    #[serde(other)]
    Unsupported,
}

impl FieldType {
    /// Scalar types the store may create on demand.
    pub fn is_auto_creatable(self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Number
                | FieldType::Checkbox
                | FieldType::Select
                | FieldType::MultiSelect
        )
    }
}

/// A single field value as the tabular editor represents it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Title(String),
    Text(String),
    Number(Option<f64>),
    Checkbox(bool),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Date(Option<String>),
    Url(Option<String>),
    Relation(Vec<String>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Title(_) => FieldType::Title,
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Checkbox(_) => FieldType::Checkbox,
            FieldValue::Select(_) => FieldType::Select,
            FieldValue::MultiSelect(_) => FieldType::MultiSelect,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::Url(_) => FieldType::Url,
            FieldValue::Relation(_) => FieldType::Relation,
        }
    }

    /// The empty value of `ty`, used to clear a remote field. Titles and
    /// relations are never cleared.
    pub fn blank(ty: FieldType) -> Option<FieldValue> {
        match ty {
            FieldType::Text => Some(FieldValue::Text(String::new())),
            FieldType::Number => Some(FieldValue::Number(None)),
            FieldType::Checkbox => Some(FieldValue::Checkbox(false)),
            FieldType::Select => Some(FieldValue::Select(None)),
            FieldType::MultiSelect => Some(FieldValue::MultiSelect(Vec::new())),
            FieldType::Date => Some(FieldValue::Date(None)),
            FieldType::Url => Some(FieldValue::Url(None)),
            FieldType::Title | FieldType::Relation | FieldType::Unsupported => None,
        }
    }
}

/// One row in a table, keyed by canonical field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    // Encoders. Only empty strings and `None` mean "no value"; zero, false and
    // empty lists are encoded.

    pub fn put_title(&mut self, name: &str, value: &str) {
        self.insert(name, FieldValue::Title(value.to_string()));
    }

    pub fn put_text(&mut self, name: &str, value: Option<&str>) {
        if let Some(text) = value.filter(|text| !text.is_empty()) {
            self.insert(name, FieldValue::Text(text.to_string()));
        }
    }

    pub fn put_number(&mut self, name: &str, value: Option<f64>) {
        if let Some(number) = value {
            self.insert(name, FieldValue::Number(Some(number)));
        }
    }

    pub fn put_bool(&mut self, name: &str, value: bool) {
        self.insert(name, FieldValue::Checkbox(value));
    }

    pub fn put_select(&mut self, name: &str, value: Option<&str>) {
        if let Some(choice) = value.filter(|choice| !choice.is_empty()) {
            self.insert(name, FieldValue::Select(Some(choice.to_string())));
        }
    }

    pub fn put_multi(&mut self, name: &str, values: &[String]) {
        self.insert(name, FieldValue::MultiSelect(dedupe(values.iter().cloned())));
    }

    pub fn put_date(&mut self, name: &str, value: Option<&str>) {
        if let Some(date) = value.filter(|date| !date.is_empty()) {
            self.insert(name, FieldValue::Date(Some(date.to_string())));
        }
    }

    pub fn put_relation(&mut self, name: &str, ids: &[String]) {
        self.insert(name, FieldValue::Relation(dedupe(ids.iter().cloned())));
    }

    /// Encode a structured value as JSON text; `null` is "no value".
    pub fn put_json(&mut self, name: &str, value: &Value) {
        if value.is_null() {
            return;
        }
        if let Ok(text) = serde_json::to_string(value) {
            self.insert(name, FieldValue::Text(text));
        }
    }
}

/// Trim, drop empties, and dedupe preserving first-seen order.
pub fn dedupe<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() || out.iter().any(|seen| seen == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// Records grouped by canonical table. Serializes as a JSON object keyed by
/// table name, which is also the offline flatten/reconstruct file format.
pub type TableSet = BTreeMap<Table, Vec<FlatRecord>>;

/// Owner of a period policy, as written in a window row's `policy_ref`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyRef {
    Offer(String),
    Campaign(String),
}

impl PolicyRef {
    /// Parse `offer:<id>` or `campaign:<id>` (`promo:` is a legacy spelling).
    pub fn parse(raw: &str) -> Option<Self> {
        let (kind, id) = raw.trim().split_once(':')?;
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        match normalize_name(kind).as_str() {
            "offer" | "module" => Some(PolicyRef::Offer(id.to_string())),
            "campaign" | "promo" | "promotion" => Some(PolicyRef::Campaign(id.to_string())),
            _ => None,
        }
    }

    /// Natural key of a window row belonging to this policy.
    pub fn window_key(&self, window_id: &str) -> String {
        format!("{self}#{window_id}")
    }

    /// Window id recovered from a window row key, if it belongs here.
    pub fn window_id<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&format!("{self}#"))
            .filter(|id| !id.is_empty())
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyRef::Offer(id) => write!(f, "offer:{id}"),
            PolicyRef::Campaign(id) => write!(f, "campaign:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoders_keep_zero_like_values_and_skip_blanks() {
        let mut record = FlatRecord::new();
        record.put_text("empty", Some(""));
        record.put_text("none", None);
        record.put_number("zero", Some(0.0));
        record.put_number("missing", None);
        record.put_bool("off", false);
        record.put_multi("list", &[]);
        record.put_json("null_blob", &Value::Null);
        record.put_json("blob", &json!({"mode": "fixed"}));

        let names: Vec<&str> = record.field_names().collect();
        assert_eq!(names, vec!["blob", "list", "off", "zero"]);
        assert_eq!(
            record.get("blob"),
            Some(&FieldValue::Text("{\"mode\":\"fixed\"}".to_string()))
        );
    }

    #[test]
    fn field_values_serialize_externally_tagged() {
        let mut record = FlatRecord::new();
        record.put_title("offer_id", "em_bonus");
        record.put_number("reward_value", Some(5.0));
        let text = serde_json::to_value(&record).expect("serialize record");
        assert_eq!(
            text,
            json!({"offer_id": {"title": "em_bonus"}, "reward_value": {"number": 5.0}})
        );
    }

    #[test]
    fn policy_refs_parse_and_key_window_rows() {
        let offer = PolicyRef::parse("offer:em_bonus").expect("offer ref");
        assert_eq!(offer, PolicyRef::Offer("em_bonus".to_string()));
        assert_eq!(offer.window_key("1"), "offer:em_bonus#1");
        assert_eq!(offer.window_id("offer:em_bonus#w2"), Some("w2"));
        assert_eq!(offer.window_id("offer:other#1"), None);
        assert_eq!(
            PolicyRef::parse(" Promo : spring "),
            Some(PolicyRef::Campaign("spring".to_string()))
        );
        assert_eq!(PolicyRef::parse("campaign:"), None);
        assert_eq!(PolicyRef::parse("spring"), None);
    }

    #[test]
    fn table_sets_serialize_keyed_by_table_name() {
        let mut tables = TableSet::new();
        tables.insert(Table::CampaignSections, vec![FlatRecord::new()]);
        let value = serde_json::to_value(&tables).expect("serialize tables");
        assert_eq!(value, json!({"campaign_sections": [{}]}));
        let back: TableSet = serde_json::from_value(value).expect("parse tables");
        assert_eq!(back, tables);
    }
}
