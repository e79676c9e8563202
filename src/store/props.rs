//! Notion property JSON <-> flat field values.
use crate::flat::{FieldType, FieldValue, FlatRecord};
use serde_json::{json, Map, Value};

/// Notion caps a single rich-text object at 2000 characters.
pub const RICH_TEXT_CHUNK: usize = 1800;

/// Split `text` into chunks of at most `size` characters.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn rich_text(text: &str) -> Value {
    Value::Array(
        chunk_text(text, RICH_TEXT_CHUNK)
            .into_iter()
            .map(|chunk| json!({"text": {"content": chunk}}))
            .collect(),
    )
}

fn named(values: &[String]) -> Value {
    Value::Array(values.iter().map(|name| json!({"name": name})).collect())
}

/// Property payload for one value.
pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Title(text) => json!({"title": rich_text(text)}),
        FieldValue::Text(text) => json!({"rich_text": rich_text(text)}),
        FieldValue::Number(number) => json!({"number": number}),
        FieldValue::Checkbox(flag) => json!({"checkbox": flag}),
        FieldValue::Select(Some(name)) => json!({"select": {"name": name}}),
        FieldValue::Select(None) => json!({"select": null}),
        FieldValue::MultiSelect(names) => json!({"multi_select": named(names)}),
        FieldValue::Date(Some(start)) => json!({"date": {"start": start}}),
        FieldValue::Date(None) => json!({"date": null}),
        FieldValue::Url(url) => json!({"url": url}),
        FieldValue::Relation(ids) => json!({
            "relation": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>()
        }),
    }
}

/// `properties` object for a page create/update.
pub fn encode_record(record: &FlatRecord) -> Value {
    let properties: Map<String, Value> = record
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect();
    Value::Object(properties)
}

fn plain_text(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("plain_text")
                        .or_else(|| item.get("text").and_then(|text| text.get("content")))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn names(items: Option<&Value>, key: &str) -> Vec<String> {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Decode one page property; unsupported property types yield `None`.
pub fn decode_property(property: &Value) -> Option<FieldValue> {
    let kind = property.get("type")?.as_str()?;
    let body = property.get(kind);
    let value = match kind {
        "title" => FieldValue::Title(plain_text(body)),
        "rich_text" => FieldValue::Text(plain_text(body)),
        "number" => FieldValue::Number(body.and_then(Value::as_f64)),
        "checkbox" => FieldValue::Checkbox(body.and_then(Value::as_bool).unwrap_or(false)),
        "select" => FieldValue::Select(
            body.and_then(|select| select.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        "multi_select" => FieldValue::MultiSelect(names(body, "name")),
        "date" => FieldValue::Date(
            body.and_then(|date| date.get("start"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        "url" => FieldValue::Url(body.and_then(Value::as_str).map(str::to_string)),
        "relation" => FieldValue::Relation(names(body, "id")),
        _ => return None,
    };
    Some(value)
}

/// Flat record of a page object's properties.
pub fn decode_page(page: &Value) -> FlatRecord {
    let mut record = FlatRecord::new();
    if let Some(properties) = page.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            if let Some(value) = decode_property(property) {
                record.insert(name, value);
            }
        }
    }
    record
}

/// Structural type of a database property schema entry.
pub fn schema_type(property: &Value) -> FieldType {
    match property.get("type").and_then(Value::as_str) {
        Some("title") => FieldType::Title,
        Some("rich_text") => FieldType::Text,
        Some("number") => FieldType::Number,
        Some("checkbox") => FieldType::Checkbox,
        Some("select") => FieldType::Select,
        Some("multi_select") => FieldType::MultiSelect,
        Some("date") => FieldType::Date,
        Some("url") => FieldType::Url,
        Some("relation") => FieldType::Relation,
        _ => FieldType::Unsupported,
    }
}

/// Schema payload used to create a field of type `ty`.
pub fn field_schema(ty: FieldType) -> Option<Value> {
    let schema = match ty {
        FieldType::Text => json!({"rich_text": {}}),
        FieldType::Number => json!({"number": {}}),
        FieldType::Checkbox => json!({"checkbox": {}}),
        FieldType::Select => json!({"select": {"options": []}}),
        FieldType::MultiSelect => json!({"multi_select": {"options": []}}),
        _ => return None,
    };
    Some(schema)
}

/// Query filter for a key lookup, by the key field's type.
pub fn equals_filter(field: &str, ty: FieldType, value: &str) -> Value {
    let kind = match ty {
        FieldType::Title => "title",
        FieldType::Select => "select",
        _ => "rich_text",
    };
    json!({"property": field, kind: {"equals": value}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_text_is_chunked_on_char_boundaries() {
        let text = "é".repeat(RICH_TEXT_CHUNK + 5);
        let chunks = chunk_text(&text, RICH_TEXT_CHUNK);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), RICH_TEXT_CHUNK);
        assert_eq!(chunks[1].chars().count(), 5);
        assert!(chunk_text("", RICH_TEXT_CHUNK).is_empty());
    }

    #[test]
    fn page_properties_decode_by_type() {
        let page = json!({
            "id": "page-1",
            "properties": {
                "Offer ID": {"type": "title", "title": [{"plain_text": "offer"}, {"plain_text": "X"}]},
                "Reward Value": {"type": "number", "number": 5},
                "Sync": {"type": "checkbox", "checkbox": true},
                "Apply Mode": {"type": "select", "select": null},
                "Category IDs": {"type": "multi_select", "multi_select": [{"name": "dining"}]},
                "Valid To": {"type": "date", "date": {"start": "2026-03-31"}},
                "Updated": {"type": "last_edited_time", "last_edited_time": "2026-01-01T00:00:00Z"}
            }
        });
        let record = decode_page(&page);
        assert_eq!(record.get("Offer ID"), Some(&FieldValue::Title("offerX".to_string())));
        assert_eq!(record.get("Reward Value"), Some(&FieldValue::Number(Some(5.0))));
        assert_eq!(record.get("Sync"), Some(&FieldValue::Checkbox(true)));
        assert_eq!(record.get("Apply Mode"), Some(&FieldValue::Select(None)));
        assert_eq!(
            record.get("Valid To"),
            Some(&FieldValue::Date(Some("2026-03-31".to_string())))
        );
        assert!(!record.contains("Updated"));
    }

    #[test]
    fn values_encode_to_property_payloads() {
        assert_eq!(
            encode_value(&FieldValue::MultiSelect(vec!["dining".to_string()])),
            json!({"multi_select": [{"name": "dining"}]})
        );
        assert_eq!(
            encode_value(&FieldValue::Text("hi".to_string())),
            json!({"rich_text": [{"text": {"content": "hi"}}]})
        );
        assert_eq!(encode_value(&FieldValue::Number(None)), json!({"number": null}));
        assert_eq!(field_schema(FieldType::Relation), None);
        assert_eq!(
            equals_filter("Name", FieldType::Title, "cardA"),
            json!({"property": "Name", "title": {"equals": "cardA"}})
        );
    }
}
