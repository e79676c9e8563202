//! Canonical table and field names, plus the legacy alias table.
//!
//! Remote tables and fields have been renamed over time ("Promotions" became
//! "Campaigns", "Promo ID" became "Campaign ID"). Every remote name is
//! resolved through this module once, when a table's schema is discovered;
//! nothing downstream sees a legacy name.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical tables known to the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Cards,
    Categories,
    Modules,
    Offers,
    Trackers,
    Campaigns,
    CampaignSections,
    Windows,
    CampaignRegistry,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Cards,
        Table::Categories,
        Table::Modules,
        Table::Offers,
        Table::Trackers,
        Table::Campaigns,
        Table::CampaignSections,
        Table::Windows,
        Table::CampaignRegistry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Cards => "cards",
            Table::Categories => "categories",
            Table::Modules => "modules",
            Table::Offers => "offers",
            Table::Trackers => "trackers",
            Table::Campaigns => "campaigns",
            Table::CampaignSections => "campaign_sections",
            Table::Windows => "windows",
            Table::CampaignRegistry => "campaign_registry",
        }
    }

    /// Natural-key field of the table.
    pub fn key_field(self) -> &'static str {
        match self {
            Table::Cards => field::CARD_ID,
            Table::Categories => field::CATEGORY_KEY,
            Table::Modules => field::MODULE_KEY,
            Table::Offers => field::OFFER_ID,
            Table::Trackers => field::TRACKER_KEY,
            Table::Campaigns => field::CAMPAIGN_ID,
            Table::CampaignSections => field::SECTION_ID,
            Table::Windows => field::WINDOW_ID,
            Table::CampaignRegistry => field::CAMPAIGN_ID,
        }
    }

    /// Every field the flattener may write for this table, key included.
    /// Relations filled in by the sync driver are not listed.
    pub fn fields(self) -> &'static [&'static str] {
        use field::*;
        match self {
            Table::Cards => &[
                CARD_ID, NAME, CURRENCY, BANK, TYPE, FCF, HIDDEN, STATUS, REDEMPTION,
                REDEMPTION_UNIT, REDEMPTION_MIN, REDEMPTION_FEE, REDEMPTION_RATIO,
                REWARD_MODULE_IDS, TRACKER_IDS,
            ],
            Table::Categories => &[CATEGORY_KEY, LABEL, PARENT, ORDER, HIDDEN],
            Table::Modules => &[
                MODULE_KEY, TYPE, DESCRIPTION, DATA, RATE, RATE_PER_X, MULTIPLIER, APPLY_MODE,
                STACK_MODE, MATCH, CAP_MODE, CAP_LIMIT, CAP_KEY, SECONDARY_CAP_LIMIT,
                SECONDARY_CAP_KEY, MIN_SPEND, MIN_SINGLE_SPEND, MISSION_SPEND_TARGET,
                REQ_MISSION_KEY, MISSION_CREDIT_MODE, VALID_FROM, VALID_TO, PROMO_END,
                RULE_TEMPLATE,
            ],
            Table::Offers => &[
                OFFER_ID, DESCRIPTION, REWARD_TYPE, REWARD_VALUE, APPLY_MODE, STACK_MODE,
                CATEGORY_IDS, CARD_IDS, CAP_TYPE, CAP_LIMIT, CAP_KEY, SECONDARY_CAP_LIMIT,
                SECONDARY_CAP_KEY, MIN_SPEND, MIN_SINGLE_SPEND, MISSION_SPEND_TARGET,
                REQ_MISSION_KEY, MISSION_CREDIT_MODE, VALID_FROM, VALID_TO, PROMO_END,
                POLICY_REF, RULE_TEMPLATE,
            ],
            Table::Trackers => &[
                TRACKER_KEY, TYPE, DESCRIPTION, MATCH, REQ_MISSION_KEY, MISSION_ID,
                MISSION_CREDIT_MODE, VALID_FROM, VALID_TO, PROMO_END, COUNTER,
                HAS_ELIGIBLE_CHECK,
            ],
            Table::Campaigns => &[
                CAMPAIGN_ID, NAME, THEME, ICON, PROMO_TYPE, CARD_IDS, CAP_KEYS, POLICY_REF,
                PERIOD_POLICY, POLICY_MODE, WINDOW_COUNT, START_DATE, END_DATE, PERIOD_TYPE,
                START_DAY, START_MONTH, RECUR_FREQ, RECUR_INTERVAL, RECUR_UNTIL, AUDIENCE_RULE,
            ],
            Table::CampaignSections => &[
                SECTION_ID, CAMPAIGN_ID, ORDER, TYPE, LABEL, USAGE_KEY, USAGE_KEYS, TARGET, RATE,
                CAP_MODULE, UNIT, UNLOCK_KEY, UNLOCK_TARGET, TOTAL_KEY, ELIGIBLE_KEY, MARKERS,
                TIERS, DATA,
            ],
            Table::Windows => &[
                WINDOW_ID, POLICY_REF, PRIORITY, START_DATE, END_DATE, PERIOD_TYPE, START_DAY,
                START_MONTH, RECUR_FREQ, RECUR_INTERVAL, RECUR_UNTIL, AUDIENCE_RULE, DATA,
            ],
            Table::CampaignRegistry => &[CAMPAIGN_ID, SETTING_KEY, WARNING_TITLE, WARNING_DESC],
        }
    }

    /// Tables whose flagged rows are reconstructed on pull.
    pub fn is_pullable(self) -> bool {
        matches!(
            self,
            Table::Cards | Table::Categories | Table::Offers | Table::Trackers | Table::Campaigns
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        resolve_table_alias(raw).ok_or_else(|| anyhow::anyhow!("unknown table {raw:?}"))
    }
}

/// Canonical field names.
pub mod field {
    pub const SYNC: &str = "sync";

    pub const CARD_ID: &str = "card_id";
    pub const NAME: &str = "name";
    pub const CURRENCY: &str = "currency";
    pub const BANK: &str = "bank";
    pub const TYPE: &str = "type";
    pub const FCF: &str = "fcf";
    pub const HIDDEN: &str = "hidden";
    pub const STATUS: &str = "status";
    pub const REDEMPTION: &str = "redemption";
    pub const REDEMPTION_UNIT: &str = "redemption_unit";
    pub const REDEMPTION_MIN: &str = "redemption_min";
    pub const REDEMPTION_FEE: &str = "redemption_fee";
    pub const REDEMPTION_RATIO: &str = "redemption_ratio";
    pub const REWARD_MODULE_IDS: &str = "reward_module_ids";
    pub const TRACKER_IDS: &str = "tracker_ids";

    pub const CATEGORY_KEY: &str = "category_key";
    pub const LABEL: &str = "label";
    pub const PARENT: &str = "parent";
    pub const ORDER: &str = "order";

    pub const MODULE_KEY: &str = "module_key";
    pub const DESCRIPTION: &str = "description";
    pub const DATA: &str = "data";
    pub const RATE: &str = "rate";
    pub const RATE_PER_X: &str = "rate_per_x";
    pub const MULTIPLIER: &str = "multiplier";
    pub const STACK_MODE: &str = "mode";
    pub const MATCH: &str = "match";
    pub const CAP_MODE: &str = "cap_mode";

    pub const OFFER_ID: &str = "offer_id";
    pub const REWARD_TYPE: &str = "reward_type";
    pub const REWARD_VALUE: &str = "reward_value";
    pub const APPLY_MODE: &str = "apply_mode";
    pub const CATEGORY_IDS: &str = "category_ids";
    pub const CATEGORY: &str = "category";
    pub const CARD_IDS: &str = "card_ids";
    pub const CARDS: &str = "cards";
    pub const CAP_TYPE: &str = "cap_type";
    pub const CAP_LIMIT: &str = "cap_limit";
    pub const CAP_KEY: &str = "cap_key";
    pub const SECONDARY_CAP_LIMIT: &str = "secondary_cap_limit";
    pub const SECONDARY_CAP_KEY: &str = "secondary_cap_key";
    pub const MIN_SPEND: &str = "min_spend";
    pub const MIN_SINGLE_SPEND: &str = "min_single_spend";
    pub const MISSION_SPEND_TARGET: &str = "mission_spend_target";
    pub const REQ_MISSION_KEY: &str = "req_mission_key";
    pub const MISSION_CREDIT_MODE: &str = "mission_credit_mode";
    pub const VALID_FROM: &str = "valid_from";
    pub const VALID_TO: &str = "valid_to";
    pub const PROMO_END: &str = "promo_end";
    pub const POLICY_REF: &str = "policy_ref";
    pub const RULE_TEMPLATE: &str = "rule_template";

    pub const TRACKER_KEY: &str = "tracker_key";
    pub const MISSION_ID: &str = "mission_id";
    pub const COUNTER: &str = "counter";
    pub const HAS_ELIGIBLE_CHECK: &str = "has_eligible_check";

    pub const CAMPAIGN_ID: &str = "campaign_id";
    pub const THEME: &str = "theme";
    pub const ICON: &str = "icon";
    pub const PROMO_TYPE: &str = "promo_type";
    pub const CAP_KEYS: &str = "cap_keys";
    pub const PERIOD_POLICY: &str = "period_policy";
    pub const POLICY_MODE: &str = "policy_mode";
    pub const WINDOW_COUNT: &str = "window_count";

    pub const SECTION_ID: &str = "section_id";
    pub const CAMPAIGN: &str = "campaign";
    pub const USAGE_KEY: &str = "usage_key";
    pub const USAGE_KEYS: &str = "usage_keys";
    pub const TARGET: &str = "target";
    pub const CAP_MODULE: &str = "cap_module";
    pub const UNIT: &str = "unit";
    pub const UNLOCK_KEY: &str = "unlock_key";
    pub const UNLOCK_TARGET: &str = "unlock_target";
    pub const TOTAL_KEY: &str = "total_key";
    pub const ELIGIBLE_KEY: &str = "eligible_key";
    pub const MARKERS: &str = "markers";
    pub const TIERS: &str = "tiers";

    pub const WINDOW_ID: &str = "window_id";
    pub const PRIORITY: &str = "priority";
    pub const START_DATE: &str = "start_date";
    pub const END_DATE: &str = "end_date";
    pub const PERIOD_TYPE: &str = "period_type";
    pub const START_DAY: &str = "start_day";
    pub const START_MONTH: &str = "start_month";
    pub const RECUR_FREQ: &str = "recur_freq";
    pub const RECUR_INTERVAL: &str = "recur_interval";
    pub const RECUR_UNTIL: &str = "recur_until";
    pub const AUDIENCE_RULE: &str = "audience_rule";

    pub const SETTING_KEY: &str = "setting_key";
    pub const WARNING_TITLE: &str = "warning_title";
    pub const WARNING_DESC: &str = "warning_desc";
}

/// Legacy remote table titles, normalized, mapped to canonical tables.
const TABLE_ALIASES: &[(&str, Table)] = &[
    ("promotions", Table::Campaigns),
    ("promos", Table::Campaigns),
    ("promotion_sections", Table::CampaignSections),
    ("promo_sections", Table::CampaignSections),
    ("promo_registry", Table::CampaignRegistry),
    ("reward_modules", Table::Modules),
    ("reward_offers", Table::Offers),
    ("period_windows", Table::Windows),
    ("policy_windows", Table::Windows),
];

/// Legacy field names, normalized, mapped to canonical names. A `None` table
/// applies everywhere.
const FIELD_ALIASES: &[(Option<Table>, &str, &str)] = &[
    (None, "promo_id", field::CAMPAIGN_ID),
    (Some(Table::CampaignSections), "promotion", field::CAMPAIGN),
    (Some(Table::Cards), "modules", field::REWARD_MODULE_IDS),
    (Some(Table::Cards), "reward_modules", field::REWARD_MODULE_IDS),
    (Some(Table::Cards), "trackers", field::TRACKER_IDS),
    (Some(Table::Modules), "desc", field::DESCRIPTION),
    (Some(Table::Modules), "req_mission_spend", field::MISSION_SPEND_TARGET),
    (Some(Table::Offers), "desc", field::DESCRIPTION),
    (Some(Table::Offers), "module_key", field::OFFER_ID),
    (Some(Table::Offers), "req_mission_spend", field::MISSION_SPEND_TARGET),
    (Some(Table::Offers), "cap_mode", field::CAP_TYPE),
    (Some(Table::Trackers), "desc", field::DESCRIPTION),
    (Some(Table::Campaigns), "cards", field::CARD_IDS),
    (Some(Table::Campaigns), "promotion_type", field::PROMO_TYPE),
    (Some(Table::Campaigns), "badge_type", field::PERIOD_TYPE),
];

/// Lowercase and collapse non-alphanumeric runs to `_`
/// ("Redemption ? Unit" -> "redemption_unit").
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Map a remote table title to a canonical table.
pub fn resolve_table_alias(title: &str) -> Option<Table> {
    let normalized = normalize_name(title);
    if let Some(table) = Table::ALL.iter().find(|t| t.name() == normalized) {
        return Some(*table);
    }
    TABLE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, table)| *table)
}

/// Map a remote field name to its canonical name for `table`.
pub fn canonical_field_name(table: Table, remote: &str) -> String {
    let normalized = normalize_name(remote);
    FIELD_ALIASES
        .iter()
        .find(|(scope, alias, _)| scope.is_none_or(|t| t == table) && *alias == normalized)
        .map(|(_, _, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}
