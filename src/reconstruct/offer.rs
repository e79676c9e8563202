//! Offer rows: module patch, card cross references, derived mission tracker.
use super::{row_key, WindowIndex};
use crate::catalog::{Patch, PatchSet, PeriodPolicy, REWARD_MODULES_ADD, TRACKERS_ADD};
use crate::diagnostics::Diagnostics;
use crate::flat::{codec, field, FlatRecord, PolicyRef, Table};
use crate::util::{number_value, prune_blank};
use crate::vocab::{ApplyMode, CapMode, MissionCreditMode, RewardType};
use crate::window::{derive_bounds, infer_mode, policy_to_map, IMPLICIT_WINDOW_ID};
use serde_json::{json, Value};

/// Usage amount credited by derived mission trackers.
pub const TRACKER_AMOUNT: &str = "tx_amount";

const TRACKER_TYPE: &str = "mission_tracker";
const STACK_MODES: [&str; 2] = ["add", "replace"];

/// Id of the tracker derived from a mission-gated offer.
pub fn tracker_id_for(offer_id: &str) -> String {
    format!("{offer_id}_tracker")
}

/// Reconstruct one offer row into `patches`.
pub fn reconstruct_offer(
    record: &FlatRecord,
    windows: &WindowIndex,
    patches: &mut PatchSet,
    diagnostics: &mut Diagnostics,
) {
    let table = Table::Offers;
    let Some(key) = row_key(record, table, diagnostics) else {
        return;
    };
    let mut warn = |message: String| diagnostics.warn(table.name(), Some(&key), message);
    let mut patch = Patch::new();

    patch.insert(
        "desc".to_string(),
        Value::String(codec::text(record, field::DESCRIPTION)),
    );

    // Reward kind: exactly one of rate / rate_per_x / multiplier survives.
    // The nulls clearing the other two are added after blank pruning.
    let mut reward_fields = Vec::new();
    let reward_type = codec::choice_or_text(record, field::REWARD_TYPE);
    let reward_value = codec::number(record, field::REWARD_VALUE);
    match (reward_type.as_str(), reward_value) {
        ("", None) => {}
        ("", Some(_)) => warn("reward_value without reward_type; reward left unchanged".to_string()),
        (raw, value) => match RewardType::parse(raw) {
            None => warn(format!("unknown reward_type '{raw}'; reward left unchanged")),
            Some(_) if value.is_none() => {
                warn("reward_type without reward_value; reward left unchanged".to_string())
            }
            Some(kind) => {
                for other in RewardType::ALL {
                    let value = if other == kind {
                        value.map(number_value).unwrap_or(Value::Null)
                    } else {
                        Value::Null
                    };
                    reward_fields.push((other.module_field().to_string(), value));
                }
            }
        },
    }

    let apply_mode = codec::choice_or_text(record, field::APPLY_MODE);
    let mut unconditional = false;
    if !apply_mode.is_empty() {
        match ApplyMode::parse(&apply_mode) {
            Some(mode) => {
                unconditional = mode == ApplyMode::Always;
                patch.insert("type".to_string(), Value::from(mode.module_type()));
            }
            None => warn(format!("unknown apply_mode '{apply_mode}'; field dropped")),
        }
    }

    let stack_mode = codec::choice_or_text(record, field::STACK_MODE).to_lowercase();
    if !stack_mode.is_empty() {
        if STACK_MODES.contains(&stack_mode.as_str()) {
            patch.insert("mode".to_string(), Value::String(stack_mode));
        } else {
            warn(format!("unknown mode '{stack_mode}'; field dropped"));
        }
    }

    // Only category-matched offers carry a match list.
    let categories = codec::multi_or_single(record, &[field::CATEGORY_IDS, field::CATEGORY]);
    if !categories.is_empty() && !unconditional {
        patch.insert("match".to_string(), json!(categories));
    }

    // Cap: a known type plus a limit; the key is honored, never invented.
    let cap_type = codec::choice_or_text(record, field::CAP_TYPE);
    let cap_limit = codec::number(record, field::CAP_LIMIT);
    let cap_key = codec::text(record, field::CAP_KEY);
    match (cap_type.as_str(), cap_limit) {
        ("", None) => {}
        ("", Some(_)) => warn("cap_limit without cap_type; cap left unchanged".to_string()),
        (raw, limit) => match CapMode::parse(raw) {
            None => warn(format!("unknown cap_type '{raw}'; cap left unchanged")),
            Some(CapMode::None) => {
                patch.insert("cap_mode".to_string(), Value::from(CapMode::None.as_str()));
            }
            Some(mode) => match limit {
                Some(limit) => {
                    patch.insert("cap_mode".to_string(), Value::from(mode.as_str()));
                    patch.insert("cap_limit".to_string(), number_value(limit));
                    patch.insert("cap_key".to_string(), Value::String(cap_key));
                }
                None => warn(format!("cap_type '{raw}' without cap_limit; cap left unchanged")),
            },
        },
    }
    if let Some(limit) = codec::number(record, field::SECONDARY_CAP_LIMIT) {
        patch.insert("secondary_cap_limit".to_string(), number_value(limit));
    }
    patch.insert(
        "secondary_cap_key".to_string(),
        Value::String(codec::text(record, field::SECONDARY_CAP_KEY)),
    );
    for (name, target) in [
        (field::MIN_SPEND, "min_spend"),
        (field::MIN_SINGLE_SPEND, "min_single_spend"),
    ] {
        if let Some(value) = codec::number(record, name) {
            patch.insert(target.to_string(), number_value(value));
        }
    }

    let mission_target = codec::number(record, field::MISSION_SPEND_TARGET);
    let mission_key = codec::text(record, field::REQ_MISSION_KEY);
    if let Some(target) = mission_target {
        patch.insert("req_mission_spend".to_string(), number_value(target));
    }
    patch.insert(
        "req_mission_key".to_string(),
        Value::String(mission_key.clone()),
    );
    let credit_mode = codec::choice_or_text(record, field::MISSION_CREDIT_MODE);
    let credit_mode = if credit_mode.is_empty() {
        None
    } else {
        let parsed = MissionCreditMode::parse(&credit_mode);
        if parsed.is_none() {
            warn(format!(
                "unknown mission_credit_mode '{credit_mode}'; field dropped"
            ));
        }
        parsed
    };
    if let Some(mode) = credit_mode {
        patch.insert("retroactive".to_string(), Value::Bool(mode.retroactive()));
    }

    // Validity: explicit window rows widen the typed dates; the single window
    // synthesized from the row's own dates never overrides them. valid_to and
    // promo_end agree.
    let valid_from = codec::date_or_text(record, field::VALID_FROM);
    let mut valid_to = codec::date_or_text(record, field::VALID_TO);
    if valid_to.is_empty() {
        valid_to = codec::date_or_text(record, field::PROMO_END);
    }
    let policy_ref = PolicyRef::Offer(key.clone());
    let offer_windows = windows.windows(&policy_ref).unwrap_or(&[]);
    let structured = offer_windows.len() > 1
        || offer_windows.iter().any(|window| {
            window.period.is_some()
                || window.recurrence.is_some()
                || !window.audience_rule.is_empty()
        });
    let synthesized = !structured
        && offer_windows
            .first()
            .is_some_and(|window| window.id == IMPLICIT_WINDOW_ID);
    let (from, to) = if synthesized {
        let (window_from, window_to) = derive_bounds(offer_windows, "", "");
        (
            if valid_from.is_empty() { window_from } else { valid_from },
            if valid_to.is_empty() { window_to } else { valid_to },
        )
    } else {
        let (from, to) = derive_bounds(offer_windows, &valid_from, &valid_to);
        for (name, typed, derived) in [
            ("valid_from", &valid_from, &from),
            ("valid_to", &valid_to, &to),
        ] {
            if !typed.is_empty() && typed != derived {
                warn(format!("window rows override {name} {typed} with {derived}"));
            }
        }
        (from, to)
    };
    patch.insert("valid_from".to_string(), Value::String(from.clone()));
    patch.insert("valid_to".to_string(), Value::String(to.clone()));
    patch.insert("promo_end".to_string(), Value::String(to.clone()));
    if structured {
        let policy = PeriodPolicy {
            mode: infer_mode(None, offer_windows.len()),
            windows: offer_windows.to_vec(),
            ..Default::default()
        };
        patch.insert(
            "period_policy".to_string(),
            Value::Object(policy_to_map(&policy)),
        );
    }

    prune_blank(&mut patch);
    patch.extend(reward_fields);
    patches.modules.merge(&key, patch);

    let cards = codec::multi_or_single(record, &[field::CARD_IDS, field::CARDS]);
    for card in &cards {
        patches.cards.append_to_list(card, REWARD_MODULES_ADD, &key);
    }

    if let (Some(_), false) = (mission_target, mission_key.is_empty()) {
        let tracker_id = tracker_id_for(&key);
        let mut tracker = Patch::new();
        tracker.insert("type".to_string(), Value::from(TRACKER_TYPE));
        tracker.insert("mission_id".to_string(), Value::String(key.clone()));
        tracker.insert(
            "req_mission_key".to_string(),
            Value::String(mission_key.clone()),
        );
        tracker.insert(
            "effects_on_match".to_string(),
            json!([{"key": mission_key, "amount": TRACKER_AMOUNT}]),
        );
        if !categories.is_empty() {
            tracker.insert("match".to_string(), json!(categories));
        }
        tracker.insert("valid_from".to_string(), Value::String(from));
        tracker.insert("valid_to".to_string(), Value::String(to.clone()));
        tracker.insert("promo_end".to_string(), Value::String(to));
        if let Some(mode) = credit_mode {
            tracker.insert("retroactive".to_string(), Value::Bool(mode.retroactive()));
        }
        prune_blank(&mut tracker);
        patches.trackers.merge(&tracker_id, tracker);
        for card in &cards {
            patches.cards.append_to_list(card, TRACKERS_ADD, &tracker_id);
        }
    }
}
