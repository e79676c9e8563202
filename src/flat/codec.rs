//! Field Codec: typed, non-failing accessors over a flat record.
//!
//! Every decoder returns the type's zero value (empty string, `None`, `false`,
//! empty list) when the field is missing or has an unexpected shape.
use super::{dedupe, FieldValue, FlatRecord};
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn date_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d{4}-\d{2}-\d{2})").expect("valid date regex"))
}

/// Leading `YYYY-MM-DD` of `text`, or empty.
pub fn date_prefix(text: &str) -> String {
    date_prefix_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Plain text; a URL field reads as its address.
pub fn text(record: &FlatRecord, name: &str) -> String {
    match record.get(name) {
        Some(FieldValue::Title(value)) | Some(FieldValue::Text(value)) => value.trim().to_string(),
        _ => url(record, name),
    }
}

pub fn url(record: &FlatRecord, name: &str) -> String {
    match record.get(name) {
        Some(FieldValue::Url(Some(value))) => value.trim().to_string(),
        _ => String::new(),
    }
}

pub fn number(record: &FlatRecord, name: &str) -> Option<f64> {
    match record.get(name) {
        Some(FieldValue::Number(value)) => value.filter(|n| n.is_finite()),
        _ => None,
    }
}

pub fn boolean(record: &FlatRecord, name: &str) -> bool {
    matches!(record.get(name), Some(FieldValue::Checkbox(true)))
}

pub fn select(record: &FlatRecord, name: &str) -> String {
    match record.get(name) {
        Some(FieldValue::Select(Some(value))) => value.trim().to_string(),
        _ => String::new(),
    }
}

pub fn multi(record: &FlatRecord, name: &str) -> Vec<String> {
    match record.get(name) {
        Some(FieldValue::MultiSelect(values)) => dedupe(values.iter().cloned()),
        _ => Vec::new(),
    }
}

pub fn date(record: &FlatRecord, name: &str) -> String {
    match record.get(name) {
        Some(FieldValue::Date(Some(value))) => date_prefix(value),
        _ => String::new(),
    }
}

pub fn relation(record: &FlatRecord, name: &str) -> Vec<String> {
    match record.get(name) {
        Some(FieldValue::Relation(ids)) => dedupe(ids.iter().cloned()),
        _ => Vec::new(),
    }
}

/// Prefer a single-choice value; fall back to free text in the same field.
pub fn choice_or_text(record: &FlatRecord, name: &str) -> String {
    let choice = select(record, name);
    if !choice.is_empty() {
        return choice;
    }
    text(record, name)
}

/// Prefer a structured date; fall back to a `YYYY-MM-DD` prefix in free text.
pub fn date_or_text(record: &FlatRecord, name: &str) -> String {
    let structured = date(record, name);
    if !structured.is_empty() {
        return structured;
    }
    date_prefix(&text(record, name))
}

/// Split a delimited list on commas and newlines.
pub fn split_list(text: &str) -> Vec<String> {
    dedupe(text.split([',', '\n']).map(str::to_string))
}

/// Union of list-ish values across candidate fields, first-seen order.
///
/// Accepts multi-select fields, delimited text, or single scalars.
pub fn multi_or_single(record: &FlatRecord, names: &[&str]) -> Vec<String> {
    let mut collected = Vec::new();
    for name in names {
        match record.get(name) {
            Some(FieldValue::MultiSelect(values)) => collected.extend(values.iter().cloned()),
            Some(FieldValue::Title(value)) | Some(FieldValue::Text(value)) => {
                collected.extend(split_list(value))
            }
            Some(FieldValue::Select(Some(value))) => collected.push(value.clone()),
            Some(FieldValue::Number(Some(value))) => collected.push(format_number(*value)),
            _ => {}
        }
    }
    dedupe(collected)
}

/// Parse a JSON-text field. Blank text is `Ok(None)`; malformed JSON is an
/// error the caller reports as a structural diagnostic.
pub fn json_or_text(record: &FlatRecord, name: &str) -> Result<Option<Value>> {
    let raw = text(record, name);
    if raw.is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parse JSON in field {name}"))?;
    Ok(Some(value))
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
