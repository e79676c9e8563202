//! Flattener: rule documents to flat records.
//!
//! One record per document, plus derived editor fields (reward type/value,
//! apply mode, mission credit mode, rule template) that only exist on the flat
//! side. Cross references that documents hold on the "wrong" end, such as a
//! module's owning cards, are inverted once per pass.
use crate::catalog::{
    Campaign, Card, Catalog, Category, RegistryEntry, RewardModule, Section, Tracker, Window,
};
use crate::flat::{field, FlatRecord, PolicyRef, Table, TableSet};
use crate::util::push_unique;
use crate::vocab::{self, MissionCreditMode};
use crate::window::{
    effective_windows, normalize_date, policy_to_map, sort_windows, IMPLICIT_WINDOW_ID,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flatten the whole catalogue into every push table.
pub fn flatten_catalog(catalog: &Catalog) -> TableSet {
    let mut tables = TableSet::new();
    let card_index = card_index(&catalog.cards);

    tables.insert(Table::Cards, catalog.cards.iter().map(card_record).collect());
    tables.insert(
        Table::Categories,
        catalog
            .categories
            .iter()
            .map(|(key, category)| category_record(key, category))
            .collect(),
    );
    tables.insert(
        Table::Modules,
        catalog
            .modules
            .iter()
            .map(|(key, module)| module_record(key, module))
            .collect(),
    );

    let mut offers = Vec::new();
    let mut windows = Vec::new();
    for (key, module) in &catalog.modules {
        let cards = card_index.get(key.as_str()).cloned().unwrap_or_default();
        offers.push(offer_record(key, module, &cards));
        let policy_ref = PolicyRef::Offer(key.clone());
        windows.extend(
            offer_windows(key, module)
                .iter()
                .map(|window| window_record(&policy_ref, window)),
        );
    }
    tables.insert(Table::Offers, offers);

    tables.insert(
        Table::Trackers,
        catalog
            .trackers
            .iter()
            .map(|(key, tracker)| tracker_record(key, tracker))
            .collect(),
    );

    let mut campaigns = Vec::new();
    let mut sections = Vec::new();
    for campaign in &catalog.campaigns {
        campaigns.push(campaign_record(campaign));
        sections.extend(
            campaign
                .sections
                .iter()
                .enumerate()
                .map(|(index, section)| section_record(&campaign.id, index, section)),
        );
        // Implicit policies travel in the campaign's own columns.
        if let Some(policy) = campaign.period_policy.as_ref().filter(|p| p.has_windows()) {
            let policy_ref = PolicyRef::Campaign(campaign.id.clone());
            windows.extend(
                effective_windows(policy, IMPLICIT_WINDOW_ID)
                    .iter()
                    .map(|window| window_record(&policy_ref, window)),
            );
        }
    }
    tables.insert(Table::Campaigns, campaigns);
    tables.insert(Table::CampaignSections, sections);
    tables.insert(Table::Windows, windows);

    tables.insert(
        Table::CampaignRegistry,
        catalog
            .campaign_registry
            .iter()
            .map(|(id, entry)| registry_record(id, entry))
            .collect(),
    );

    tables
}

/// Module id -> owning card ids, in card order.
pub fn card_index(cards: &[Card]) -> BTreeMap<&str, Vec<String>> {
    let mut index: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for card in cards {
        for module_id in &card.reward_modules {
            push_unique(index.entry(module_id.as_str()).or_default(), &card.id);
        }
    }
    index
}

pub fn card_record(card: &Card) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::CARD_ID, &card.id);
    record.put_text(field::NAME, Some(&card.name));
    record.put_select(field::CURRENCY, Some(&card.currency));
    record.put_select(field::BANK, Some(&card.bank));
    record.put_select(field::TYPE, Some(&card.kind));
    record.put_number(field::FCF, card.fcf);
    if let Some(hidden) = card.hidden {
        record.put_bool(field::HIDDEN, hidden);
    }
    record.put_select(field::STATUS, card.status.as_deref());
    if let Some(redemption) = &card.redemption {
        record.put_text(field::REDEMPTION_UNIT, Some(&redemption.unit));
        record.put_number(field::REDEMPTION_MIN, redemption.min);
        record.put_text(field::REDEMPTION_FEE, Some(&redemption.fee));
        record.put_text(field::REDEMPTION_RATIO, Some(&redemption.ratio));
        record.put_json(field::REDEMPTION, &to_json(redemption));
    }
    record.put_multi(field::REWARD_MODULE_IDS, &card.reward_modules);
    record.put_multi(field::TRACKER_IDS, &card.trackers);
    record
}

pub fn category_record(key: &str, category: &Category) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::CATEGORY_KEY, key);
    record.put_text(field::LABEL, Some(&category.label));
    record.put_text(field::PARENT, category.parent.as_deref());
    record.put_number(field::ORDER, category.order);
    if let Some(hidden) = category.hidden {
        record.put_bool(field::HIDDEN, hidden);
    }
    record
}

/// Full mirror of a module; the `data` blob carries the complete document.
pub fn module_record(key: &str, module: &RewardModule) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::MODULE_KEY, key);
    record.put_select(field::TYPE, Some(&module.kind));
    record.put_text(field::DESCRIPTION, Some(&module.desc));
    record.put_json(field::DATA, &to_json(module));
    record.put_number(field::RATE, module.rate);
    record.put_number(field::RATE_PER_X, module.rate_per_x);
    record.put_number(field::MULTIPLIER, module.multiplier);
    record.put_select(field::APPLY_MODE, vocab::apply_mode(module).as_deref());
    record.put_select(field::STACK_MODE, module.mode.as_deref());
    record.put_multi(field::MATCH, &match_list(module));
    record.put_select(field::CAP_MODE, module.cap_mode.as_deref());
    put_limits(&mut record, module);
    record.put_date(field::VALID_FROM, date(module.valid_from.as_deref()).as_deref());
    record.put_date(field::VALID_TO, date(module.valid_to.as_deref()).as_deref());
    record.put_date(field::PROMO_END, date(module.promo_end.as_deref()).as_deref());
    record.put_select(
        field::RULE_TEMPLATE,
        Some(vocab::rule_template(module).as_str()),
    );
    record
}

/// Editor-facing offer row for a module.
pub fn offer_record(key: &str, module: &RewardModule, card_ids: &[String]) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::OFFER_ID, key);
    record.put_text(field::DESCRIPTION, Some(&module.desc));
    if let Some((kind, value)) = vocab::reward_kind(module) {
        record.put_select(field::REWARD_TYPE, Some(kind.as_str()));
        record.put_number(field::REWARD_VALUE, Some(value));
    }
    record.put_select(field::APPLY_MODE, vocab::apply_mode(module).as_deref());
    record.put_select(field::STACK_MODE, module.mode.as_deref());
    record.put_multi(field::CATEGORY_IDS, &match_list(module));
    record.put_multi(field::CARD_IDS, card_ids);
    record.put_select(field::CAP_TYPE, module.cap_mode.as_deref());
    put_limits(&mut record, module);
    record.put_date(field::VALID_FROM, date(module.valid_from.as_deref()).as_deref());
    record.put_date(field::VALID_TO, date(module.valid_to.as_deref()).as_deref());
    record.put_date(field::PROMO_END, date(module.promo_end.as_deref()).as_deref());
    record.put_text(
        field::POLICY_REF,
        Some(&PolicyRef::Offer(key.to_string()).to_string()),
    );
    record.put_select(
        field::RULE_TEMPLATE,
        Some(vocab::rule_template(module).as_str()),
    );
    record
}

/// Cap, spend and mission columns shared by module and offer rows.
fn put_limits(record: &mut FlatRecord, module: &RewardModule) {
    record.put_number(field::CAP_LIMIT, module.cap_limit);
    record.put_text(field::CAP_KEY, module.cap_key.as_deref());
    record.put_number(field::SECONDARY_CAP_LIMIT, module.secondary_cap_limit);
    record.put_text(field::SECONDARY_CAP_KEY, module.secondary_cap_key.as_deref());
    record.put_number(field::MIN_SPEND, module.min_spend);
    record.put_number(field::MIN_SINGLE_SPEND, module.min_single_spend);
    record.put_number(field::MISSION_SPEND_TARGET, module.req_mission_spend);
    record.put_text(field::REQ_MISSION_KEY, module.req_mission_key.as_deref());
    record.put_select(
        field::MISSION_CREDIT_MODE,
        vocab::mission_credit_mode(module).map(MissionCreditMode::as_str),
    );
}

/// Windows of an offer: its policy's windows, else one synthesized from the
/// module's validity dates.
pub fn offer_windows(key: &str, module: &RewardModule) -> Vec<Window> {
    if let Some(policy) = &module.period_policy {
        let windows = effective_windows(policy, IMPLICIT_WINDOW_ID);
        if !windows.is_empty() {
            return windows;
        }
    }
    let start_date = normalize_date(module.valid_from.as_deref().unwrap_or(""));
    let end_date = normalize_date(
        module
            .valid_to
            .as_deref()
            .or(module.promo_end.as_deref())
            .unwrap_or(""),
    );
    if start_date.is_empty() && end_date.is_empty() {
        tracing::debug!(offer = key, "no validity dates; no window row");
        return Vec::new();
    }
    vec![Window {
        id: IMPLICIT_WINDOW_ID.to_string(),
        priority: Some(1),
        start_date,
        end_date,
        ..Default::default()
    }]
}

pub fn tracker_record(key: &str, tracker: &Tracker) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::TRACKER_KEY, key);
    record.put_select(field::TYPE, Some(&tracker.kind));
    record.put_text(field::DESCRIPTION, Some(&tracker.desc));
    record.put_multi(field::MATCH, &tracker.match_categories);
    record.put_text(field::REQ_MISSION_KEY, tracker.req_mission_key.as_deref());
    record.put_text(field::MISSION_ID, tracker.mission_id.as_deref());
    if tracker.retroactive.is_some() {
        record.put_select(
            field::MISSION_CREDIT_MODE,
            Some(MissionCreditMode::from_flag(tracker.retroactive).as_str()),
        );
    }
    record.put_date(field::VALID_FROM, date(tracker.valid_from.as_deref()).as_deref());
    record.put_date(field::VALID_TO, date(tracker.valid_to.as_deref()).as_deref());
    record.put_date(field::PROMO_END, date(tracker.promo_end.as_deref()).as_deref());
    if let Some(counter) = &tracker.counter {
        record.put_json(field::COUNTER, counter);
    }
    record.put_bool(field::HAS_ELIGIBLE_CHECK, tracker.eligible_check.is_some());
    record
}

/// Campaign row. The policy travels both as a JSON blob and, for its first
/// effective window, as flat columns.
pub fn campaign_record(campaign: &Campaign) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::CAMPAIGN_ID, &campaign.id);
    record.put_text(field::NAME, Some(&campaign.name));
    record.put_select(field::THEME, Some(&campaign.theme));
    record.put_text(field::ICON, Some(&campaign.icon));
    record.put_select(field::PROMO_TYPE, Some(&campaign.promo_type));
    record.put_multi(field::CARD_IDS, &campaign.cards);
    record.put_multi(field::CAP_KEYS, &campaign.cap_keys);
    record.put_text(
        field::POLICY_REF,
        Some(&PolicyRef::Campaign(campaign.id.clone()).to_string()),
    );
    if let Some(policy) = &campaign.period_policy {
        let mut canonical = policy.clone();
        sort_windows(&mut canonical.windows);
        record.put_json(field::PERIOD_POLICY, &Value::Object(policy_to_map(&canonical)));
        record.put_select(field::POLICY_MODE, policy.mode.as_deref());
        let windows = effective_windows(policy, IMPLICIT_WINDOW_ID);
        record.put_number(field::WINDOW_COUNT, Some(windows.len() as f64));
        if let Some(first) = windows.first() {
            put_window_columns(&mut record, first);
        }
    }
    record
}

/// One row per section, keyed `<campaign>#<n>` (1-based).
pub fn section_record(campaign_id: &str, index: usize, section: &Section) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::SECTION_ID, &format!("{campaign_id}#{}", index + 1));
    record.put_text(field::CAMPAIGN_ID, Some(campaign_id));
    record.put_number(field::ORDER, Some(index as f64 + 1.0));
    record.put_select(field::TYPE, Some(&section.kind));
    record.put_text(field::LABEL, Some(&section.label));
    record.put_text(field::USAGE_KEY, section.usage_key.as_deref());
    if let Some(keys) = &section.usage_keys {
        record.put_multi(field::USAGE_KEYS, keys);
    }
    record.put_number(field::TARGET, section.target);
    record.put_number(field::RATE, section.rate);
    record.put_text(field::CAP_MODULE, section.cap_module.as_deref());
    record.put_text(field::UNIT, section.unit.as_deref());
    record.put_text(field::UNLOCK_KEY, section.unlock_key.as_deref());
    record.put_number(field::UNLOCK_TARGET, section.unlock_target);
    record.put_text(field::TOTAL_KEY, section.total_key.as_deref());
    record.put_text(field::ELIGIBLE_KEY, section.eligible_key.as_deref());
    if let Some(markers) = &section.markers {
        record.put_json(field::MARKERS, markers);
    }
    if let Some(tiers) = &section.tiers {
        record.put_json(field::TIERS, tiers);
    }
    if !section.extra.is_empty() {
        record.put_json(field::DATA, &Value::Object(section.extra.clone()));
    }
    record
}

/// One window row tagged with its owning policy.
pub fn window_record(policy_ref: &PolicyRef, window: &Window) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::WINDOW_ID, &policy_ref.window_key(&window.id));
    record.put_text(field::POLICY_REF, Some(&policy_ref.to_string()));
    record.put_number(field::PRIORITY, window.priority.map(|p| p as f64));
    put_window_columns(&mut record, window);
    if !window.extra.is_empty() {
        record.put_json(field::DATA, &Value::Object(window.extra.clone()));
    }
    record
}

fn put_window_columns(record: &mut FlatRecord, window: &Window) {
    record.put_date(field::START_DATE, Some(&window.start_date));
    record.put_date(field::END_DATE, Some(&window.end_date));
    if let Some(period) = &window.period {
        record.put_select(field::PERIOD_TYPE, Some(&period.kind));
        record.put_number(field::START_DAY, period.start_day.map(f64::from));
        record.put_number(field::START_MONTH, period.start_month.map(f64::from));
    }
    if let Some(recurrence) = &window.recurrence {
        record.put_select(field::RECUR_FREQ, Some(&recurrence.freq));
        record.put_number(field::RECUR_INTERVAL, recurrence.interval.map(f64::from));
        record.put_date(field::RECUR_UNTIL, Some(&recurrence.until));
    }
    record.put_text(field::AUDIENCE_RULE, Some(&window.audience_rule));
}

pub fn registry_record(campaign_id: &str, entry: &RegistryEntry) -> FlatRecord {
    let mut record = FlatRecord::new();
    record.put_title(field::CAMPAIGN_ID, campaign_id);
    record.put_text(field::SETTING_KEY, Some(&entry.setting_key));
    record.put_text(field::WARNING_TITLE, Some(&entry.warning_title));
    record.put_text(field::WARNING_DESC, Some(&entry.warning_desc));
    record
}

fn match_list(module: &RewardModule) -> Vec<String> {
    if module.match_categories.is_empty() {
        return module.category.iter().cloned().collect();
    }
    module.match_categories.clone()
}

fn date(raw: Option<&str>) -> Option<String> {
    raw.map(normalize_date).filter(|date| !date.is_empty())
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
