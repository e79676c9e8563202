//! Enumerated editor values and their accepted spellings.
//!
//! Parsing returns `None` for unknown values; callers record a diagnostic and
//! drop the single field.
use crate::catalog::RewardModule;

/// Which of the three mutually exclusive reward-kind fields a value feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardType {
    Percent,
    RatePerAmount,
    Multiplier,
}

impl RewardType {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalized(raw).as_str() {
            "percent" | "percentage" | "rate" => Some(RewardType::Percent),
            "rate_per_x" | "rate_per_amount" | "per_amount" => Some(RewardType::RatePerAmount),
            "multiplier" | "x" => Some(RewardType::Multiplier),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RewardType::Percent => "percent",
            RewardType::RatePerAmount => "rate_per_x",
            RewardType::Multiplier => "multiplier",
        }
    }

    /// Document field carrying the value.
    pub fn module_field(self) -> &'static str {
        match self {
            RewardType::Percent => "rate",
            RewardType::RatePerAmount => "rate_per_x",
            RewardType::Multiplier => "multiplier",
        }
    }

    pub const ALL: [RewardType; 3] = [
        RewardType::Percent,
        RewardType::RatePerAmount,
        RewardType::Multiplier,
    ];
}

/// First populated reward kind, checked in `rate`, `rate_per_x`,
/// `multiplier` order.
pub fn reward_kind(module: &RewardModule) -> Option<(RewardType, f64)> {
    [
        (RewardType::Percent, module.rate),
        (RewardType::RatePerAmount, module.rate_per_x),
        (RewardType::Multiplier, module.multiplier),
    ]
    .into_iter()
    .find_map(|(kind, value)| value.map(|value| (kind, value)))
}

/// How a module decides whether it applies to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Always,
    Category,
}

impl ApplyMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalized(raw).as_str() {
            "base" | "always" | "base_always" | "unconditional" => Some(ApplyMode::Always),
            "category" | "categories" | "category_match" | "matched" | "bonus" => {
                Some(ApplyMode::Category)
            }
            _ => None,
        }
    }

    /// Module `type` tag for the mode.
    pub fn module_type(self) -> &'static str {
        match self {
            ApplyMode::Always => "always",
            ApplyMode::Category => "category",
        }
    }
}

/// Flattened apply mode: explicit value, else derived from the type tag.
pub fn apply_mode(module: &RewardModule) -> Option<String> {
    if let Some(explicit) = module.apply_mode.as_deref().filter(|m| !m.is_empty()) {
        return Some(explicit.to_string());
    }
    match module.kind.as_str() {
        "always" => Some("always".to_string()),
        "category" => Some("category".to_string()),
        _ => None,
    }
}

/// Cap policy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapMode {
    None,
    Reward,
    Spending,
}

impl CapMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalized(raw).as_str() {
            "none" | "no_cap" => Some(CapMode::None),
            "reward" | "reward_capped" | "reward_cap" => Some(CapMode::Reward),
            "spending" | "spending_capped" | "spend" | "spending_cap" => Some(CapMode::Spending),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CapMode::None => "none",
            CapMode::Reward => "reward",
            CapMode::Spending => "spending",
        }
    }
}

/// Whether spend before a mission unlock counts toward the reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionCreditMode {
    Retroactive,
    FromUnlockOnly,
}

impl MissionCreditMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalized(raw).as_str() {
            "retroactive" | "retro" => Some(MissionCreditMode::Retroactive),
            "from_unlock_only" | "from_unlock" | "unlock_only" | "non_retroactive" => {
                Some(MissionCreditMode::FromUnlockOnly)
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MissionCreditMode::Retroactive => "retroactive",
            MissionCreditMode::FromUnlockOnly => "from_unlock_only",
        }
    }

    pub fn retroactive(self) -> bool {
        self == MissionCreditMode::Retroactive
    }

    pub fn from_flag(retroactive: Option<bool>) -> Self {
        if retroactive == Some(false) {
            MissionCreditMode::FromUnlockOnly
        } else {
            MissionCreditMode::Retroactive
        }
    }
}

/// Mission credit mode of a module, only when it declares a mission.
pub fn mission_credit_mode(module: &RewardModule) -> Option<MissionCreditMode> {
    module
        .has_mission()
        .then(|| MissionCreditMode::from_flag(module.retroactive))
}

/// Editor-facing rule template, recomputed on every flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTemplate {
    LevelCapped,
    TieredCap,
    MissionNonRetroactive,
    MissionRetroactive,
    StandardRate,
}

impl RuleTemplate {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleTemplate::LevelCapped => "level_capped",
            RuleTemplate::TieredCap => "tiered_cap",
            RuleTemplate::MissionNonRetroactive => "mission_non_retroactive",
            RuleTemplate::MissionRetroactive => "mission_retroactive",
            RuleTemplate::StandardRate => "standard_rate",
        }
    }
}

pub fn rule_template(module: &RewardModule) -> RuleTemplate {
    match module.kind.as_str() {
        "guru_capped" | "level_capped" => return RuleTemplate::LevelCapped,
        "tiered_cap" | "tier_cap" => return RuleTemplate::TieredCap,
        _ => {}
    }
    match mission_credit_mode(module) {
        Some(MissionCreditMode::FromUnlockOnly) => RuleTemplate::MissionNonRetroactive,
        Some(MissionCreditMode::Retroactive) => RuleTemplate::MissionRetroactive,
        None => RuleTemplate::StandardRate,
    }
}

fn normalized(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' '], "_")
}
