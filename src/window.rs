//! Window Normalizer: canonical windows and period policies.
//!
//! Windows reach the engine from hand-written documents, JSON blobs typed into
//! the editor, and flat window rows. Everything funnels through here so the
//! rest of the engine sees one shape: normalized dates, a priority on every
//! window, and lists in a single total order.
use crate::catalog::{PeriodPolicy, PeriodSpec, Recurrence, Window};
use crate::flat::codec::date_prefix;
use crate::util::is_blank;
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Sub-structures merged key by key instead of replaced wholesale.
const NESTED_POLICY_KEYS: [&str; 2] = ["period", "recurrence"];

pub const MODE_FIXED: &str = "fixed";

/// Id of the single window synthesized for a policy without explicit windows.
pub const IMPLICIT_WINDOW_ID: &str = "1";
pub const MODE_COMPOSITE: &str = "composite";

/// Keep only a leading `YYYY-MM-DD`; empty when there is none.
pub fn normalize_date(raw: &str) -> String {
    date_prefix(raw)
}

/// Overall `(from, to)` covering every window plus the fallback bounds.
///
/// `to` considers both window end dates and recurrence `until` dates. Empty
/// strings are ignored; a side with no dates at all stays empty.
pub fn derive_bounds(windows: &[Window], fallback_from: &str, fallback_to: &str) -> (String, String) {
    let starts = windows
        .iter()
        .map(|w| normalize_date(&w.start_date))
        .chain(std::iter::once(normalize_date(fallback_from)));
    let ends = windows
        .iter()
        .flat_map(|w| {
            let until = w
                .recurrence
                .as_ref()
                .map(|r| normalize_date(&r.until))
                .unwrap_or_default();
            [normalize_date(&w.end_date), until]
        })
        .chain(std::iter::once(normalize_date(fallback_to)));

    let from = starts.filter(|d| !d.is_empty()).min().unwrap_or_default();
    let to = ends.filter(|d| !d.is_empty()).max().unwrap_or_default();
    (from, to)
}

/// Fill missing priorities with the 1-based position, then stable-sort by
/// `(priority, start, end, id)`.
///
/// Priorities are written back so a second pass sees the same keys and
/// produces the same order.
pub fn sort_windows(windows: &mut [Window]) {
    for (index, window) in windows.iter_mut().enumerate() {
        if window.priority.is_none() {
            window.priority = Some(index as i64 + 1);
        }
    }
    windows.sort_by(compare_windows);
}

fn compare_windows(a: &Window, b: &Window) -> Ordering {
    a.priority
        .unwrap_or(i64::MAX)
        .cmp(&b.priority.unwrap_or(i64::MAX))
        .then_with(|| a.start_date.cmp(&b.start_date))
        .then_with(|| a.end_date.cmp(&b.end_date))
        .then_with(|| a.id.cmp(&b.id))
}

/// Shallow-merge `patch` over `base`.
///
/// `period` and `recurrence` are merged key by key. A null or empty-string
/// patch value never overwrites; any other value (including 0, false, `[]`)
/// does.
pub fn merge_policy(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (key, value) in patch {
        if is_blank(value) {
            continue;
        }
        if NESTED_POLICY_KEYS.contains(&key.as_str()) {
            if let (Some(Value::Object(existing)), Value::Object(incoming)) = (out.get(key), value)
            {
                let merged = merge_flat(existing, incoming);
                out.insert(key.clone(), Value::Object(merged));
                continue;
            }
        }
        out.insert(key.clone(), value.clone());
    }
    out
}

fn merge_flat(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (key, value) in patch {
        if !is_blank(value) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Policy mode: an explicit value wins; otherwise `composite` for several
/// windows and `fixed` for one.
pub fn infer_mode(explicit: Option<&str>, window_count: usize) -> Option<String> {
    if let Some(mode) = explicit.map(str::trim).filter(|mode| !mode.is_empty()) {
        return Some(mode.to_string());
    }
    match window_count {
        0 => None,
        1 => Some(MODE_FIXED.to_string()),
        _ => Some(MODE_COMPOSITE.to_string()),
    }
}

fn str_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> &'a str {
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find(|value| !value.trim().is_empty())
        .unwrap_or("")
}

fn period_from_value(value: Option<&Value>) -> Option<PeriodSpec> {
    let mut spec = match value? {
        Value::String(kind) if !kind.trim().is_empty() => PeriodSpec {
            kind: kind.trim().to_string(),
            ..Default::default()
        },
        Value::Object(map) => {
            let mut spec: PeriodSpec = serde_json::from_value(Value::Object(map.clone())).ok()?;
            if spec.kind.is_empty() {
                if let Some(Value::String(kind)) = spec.extra.remove("periodType") {
                    spec.kind = kind;
                }
            }
            spec
        }
        _ => return None,
    };
    if spec.kind.is_empty() {
        return None;
    }
    spec.start_date = normalize_date(&spec.start_date);
    spec.end_date = normalize_date(&spec.end_date);
    Some(spec)
}

fn recurrence_from_value(value: Option<&Value>) -> Option<Recurrence> {
    let map = value?.as_object()?;
    let freq = map
        .get("freq")
        .and_then(Value::as_str)
        .map(|freq| freq.trim().to_lowercase())
        .unwrap_or_default();
    if freq.is_empty() {
        return None;
    }
    let interval = map
        .get("interval")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|interval| *interval >= 1.0)
        .map(|interval| interval.floor() as u32);
    let by_day = map
        .get("byDay")
        .and_then(Value::as_array)
        .map(|days| {
            days.iter()
                .filter_map(Value::as_str)
                .filter(|day| !day.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let until = normalize_date(map.get("until").and_then(Value::as_str).unwrap_or(""));
    let mut extra = map.clone();
    for key in ["freq", "interval", "byDay", "until"] {
        extra.remove(key);
    }
    Some(Recurrence {
        freq,
        interval,
        until,
        by_day,
        extra,
    })
}

/// Normalize one window object, accepting historical key spellings.
///
/// `index` is the window's 0-based position; it seeds the default id and
/// priority.
pub fn window_from_value(value: &Value, index: usize) -> Option<Window> {
    let map = value.as_object()?;
    let mut start_date = normalize_date(str_field(
        map,
        &["startDate", "start", "startAt", "start_at", "valid_from"],
    ));
    let mut end_date = normalize_date(str_field(
        map,
        &["endDate", "end", "endAt", "end_at", "valid_to"],
    ));

    let recurrence = recurrence_from_value(map.get("recurrence"));
    if end_date.is_empty() {
        if let Some(until) = recurrence.as_ref().map(|r| r.until.clone()) {
            end_date = until;
        }
    }

    let period = period_from_value(map.get("period"));
    if let Some(period) = period.as_ref().filter(|p| p.kind == "promo") {
        if start_date.is_empty() {
            start_date = period.start_date.clone();
        }
        if end_date.is_empty() {
            end_date = period.end_date.clone();
        }
    }

    let id = match map.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("window_{}", index + 1),
    };
    let priority = map
        .get("priority")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|p| p.is_finite())
        .map(|p| p.floor() as i64)
        .unwrap_or(index as i64 + 1);

    let audience_rule = str_field(map, &["audienceRule", "audience_rule"]).to_string();

    let mut extra = map.clone();
    for key in [
        "id",
        "priority",
        "startDate",
        "start",
        "startAt",
        "start_at",
        "valid_from",
        "endDate",
        "end",
        "endAt",
        "end_at",
        "valid_to",
        "period",
        "recurrence",
        "audienceRule",
        "audience_rule",
    ] {
        extra.remove(key);
    }

    Some(Window {
        id,
        priority: Some(priority),
        start_date,
        end_date,
        period,
        recurrence,
        audience_rule,
        extra,
    })
}

/// Build a typed policy from a JSON object, normalizing its windows.
pub fn policy_from_value(value: &Value) -> Result<PeriodPolicy> {
    let map = value
        .as_object()
        .ok_or_else(|| anyhow!("period policy must be a JSON object"))?;
    let mut rest = map.clone();
    let raw_windows = rest.remove("windows");
    let raw_period = rest.remove("period");
    let raw_recurrence = rest.remove("recurrence");
    let mut policy: PeriodPolicy =
        serde_json::from_value(Value::Object(rest)).context("decode period policy")?;
    policy.period = period_from_value(raw_period.as_ref());
    policy.recurrence = recurrence_from_value(raw_recurrence.as_ref());
    policy.start_date = normalize_date(&policy.start_date);
    policy.end_date = normalize_date(&policy.end_date);
    policy.windows = raw_windows
        .as_ref()
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| window_from_value(item, index))
                .collect()
        })
        .unwrap_or_default();
    sort_windows(&mut policy.windows);
    Ok(policy)
}

/// Serialize a typed policy back to a JSON object.
pub fn policy_to_map(policy: &PeriodPolicy) -> Map<String, Value> {
    match serde_json::to_value(policy) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// The single window a policy without explicit windows describes, if any.
pub fn implicit_window(policy: &PeriodPolicy, id: &str) -> Option<Window> {
    let period = policy.period.clone();
    let promo = period.as_ref().filter(|p| p.kind == "promo");
    let mut start_date = normalize_date(&policy.start_date);
    let mut end_date = normalize_date(&policy.end_date);
    if let Some(promo) = promo {
        if start_date.is_empty() {
            start_date = promo.start_date.clone();
        }
        if end_date.is_empty() {
            end_date = promo.end_date.clone();
        }
    }
    if end_date.is_empty() {
        if let Some(recurrence) = &policy.recurrence {
            end_date = recurrence.until.clone();
        }
    }
    if period.is_none()
        && policy.recurrence.is_none()
        && start_date.is_empty()
        && end_date.is_empty()
    {
        return None;
    }
    Some(Window {
        id: id.to_string(),
        priority: Some(1),
        start_date,
        end_date,
        period,
        recurrence: policy.recurrence.clone(),
        audience_rule: policy.audience_rule.clone(),
        extra: Map::new(),
    })
}

/// Explicit windows in canonical order, or the implicit single window.
pub fn effective_windows(policy: &PeriodPolicy, implicit_id: &str) -> Vec<Window> {
    if policy.has_windows() {
        let mut windows = policy.windows.clone();
        sort_windows(&mut windows);
        return windows;
    }
    implicit_window(policy, implicit_id).into_iter().collect()
}
