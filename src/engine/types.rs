use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PLAYER_SCHEMA_VERSION: u8 = 2;
pub const BUSINESS_SCHEMA_VERSION: u8 = 1;
pub const PRODUCTION_SCHEMA_VERSION: u8 = 1;
pub const WORKER_SCHEMA_VERSION: u8 = 1;
pub const BROTHEL_SCHEMA_VERSION: u8 = 1;

/// Skill ceiling shared by power, intelligence, and defense.
pub const MAX_SKILL_LEVEL: u32 = 100;

/// Business upgrade ceiling.
pub const MAX_BUSINESS_LEVEL: u8 = 10;

/// The three trainable skills.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Power,
    Intelligence,
    Defense,
}

impl Skill {
    pub fn label(&self) -> &'static str {
        match self {
            Skill::Power => "power",
            Skill::Intelligence => "intelligence",
            Skill::Defense => "defense",
        }
    }
}

/// Direction of a bank transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Deposit,
    Withdraw,
}

/// The central aggregate. One row per chat-platform identity; created on
/// first interaction with a starting cash grant and never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub id: String,
    pub display_name: String,
    pub level: u32,
    pub xp: i64,
    pub hp: i64,
    pub max_hp: i64,
    pub stamina: i64,
    pub max_stamina: i64,
    pub cash: i64,
    pub bank_balance: i64,
    /// Base skill levels (0-100). Equipment bonuses are derived at read
    /// time from the equipped item ids and are never folded back in here.
    pub power: u32,
    pub intelligence: u32,
    pub defense: u32,
    #[serde(default)]
    pub equipped_weapon_id: Option<String>,
    #[serde(default)]
    pub equipped_gear_id: Option<String>,
    #[serde(default)]
    pub jail_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hospital_until: Option<DateTime<Utc>>,
    pub daily_catches: u32,
    pub last_catch_reset: DateTime<Utc>,
    pub total_robberies: u32,
    pub successful_robberies: u32,
    pub pvp_wins: u32,
    pub pvp_losses: u32,
    /// 0-100. Persisted and surfaced; no formula consumes it yet.
    #[serde(default)]
    pub addiction: u8,
    pub last_stamina_refill: DateTime<Utc>,
    #[serde(default)]
    pub last_daily_bonus: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerRecord {
    pub fn new(id: &str, display_name: &str, starting_cash: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            level: 1,
            xp: 0,
            hp: 100,
            max_hp: 100,
            stamina: 50,
            max_stamina: 50,
            cash: starting_cash,
            bank_balance: 0,
            power: 1,
            intelligence: 1,
            defense: 1,
            equipped_weapon_id: None,
            equipped_gear_id: None,
            jail_until: None,
            hospital_until: None,
            daily_catches: 0,
            last_catch_reset: now,
            total_robberies: 0,
            successful_robberies: 0,
            pvp_wins: 0,
            pvp_losses: 0,
            addiction: 0,
            last_stamina_refill: now,
            last_daily_bonus: None,
            created_at: now,
            updated_at: now,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    /// Pocket cash plus bank balance; the wealth figure used by the
    /// penalty and bribe formulas.
    pub fn total_wealth(&self) -> i64 {
        self.cash + self.bank_balance
    }

    /// Current HP as a fraction of maximum, in [0.0, 1.0].
    pub fn hp_fraction(&self) -> f64 {
        if self.max_hp <= 0 {
            return 0.0;
        }
        (self.hp.max(0) as f64 / self.max_hp as f64).min(1.0)
    }

    /// Base skill level for a given skill.
    pub fn skill_level(&self, skill: Skill) -> u32 {
        match skill {
            Skill::Power => self.power,
            Skill::Intelligence => self.intelligence,
            Skill::Defense => self.defense,
        }
    }

    pub fn set_skill_level(&mut self, skill: Skill, value: u32) {
        match skill {
            Skill::Power => self.power = value,
            Skill::Intelligence => self.intelligence = value,
            Skill::Defense => self.defense = value,
        }
    }

    /// XP threshold for the next level.
    pub fn xp_to_level(&self) -> i64 {
        self.level as i64 * 100
    }

    /// Apply a single level-up check. Rewards are bounded, so one check per
    /// attempt is sufficient.
    pub fn check_level_up(&mut self) -> bool {
        let threshold = self.xp_to_level();
        if self.xp >= threshold {
            self.level += 1;
            self.xp -= threshold;
            true
        } else {
            false
        }
    }

    /// Reset the daily-catches counter when the stored reset date is before
    /// today's UTC date. Returns true when a reset happened.
    pub fn reset_daily_catches_if_stale(&mut self, now: DateTime<Utc>) -> bool {
        if self.last_catch_reset.date_naive() < now.date_naive() {
            self.daily_catches = 0;
            self.last_catch_reset = now;
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Displayed stat bonuses contributed by equipped items. Derived from the
/// item catalog on every read; never written back to the base columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EquipmentBonus {
    pub power: u32,
    pub defense: u32,
}

/// Base skill plus equipment bonus, computed at the read boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatView {
    pub base: u32,
    pub bonus: u32,
}

impl StatView {
    pub fn total(&self) -> u32 {
        self.base + self.bonus
    }
}

/// Static catalog entry for a crime. Immutable during a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrimeDef {
    pub id: String,
    pub name: String,
    pub min_level_required: u32,
    pub stamina_cost: i64,
    pub base_reward: i64,
    pub max_reward: i64,
    pub xp_reward: i64,
    pub hp_loss_on_fail: i64,
    pub jail_time_minutes: i64,
    /// Base success percentage before adjustments.
    pub success_rate: f64,
    /// Independent item drops; each is rolled on its own, none are
    /// mutually exclusive.
    #[serde(default)]
    pub drops: Vec<ItemDrop>,
}

/// An independent loot roll attached to a crime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDrop {
    pub item_id: String,
    /// Drop chance in percent, [0, 100].
    pub chance: f64,
    pub min_quantity: u32,
    pub max_quantity: u32,
}

/// What a business consumes to start a production run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProductionCost {
    /// Flat cash cost deducted on start.
    Cash { amount: i64 },
    /// The player feeds in contraband items of their choosing. Input value
    /// is capped before any laundering fee is applied.
    Contraband { max_input_value: i64 },
}

/// What a business pays out when a production run is collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BusinessReward {
    /// Flat cash profit, scaled by upgrade level at collection.
    Cash { profit: i64 },
    /// A quantity of items, scaled by upgrade level at collection.
    Items { item_id: String, quantity: u32 },
    /// Cash derived from the consumed input value (laundering-style).
    ConvertedInput,
}

/// Static catalog entry for a business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessDef {
    pub id: String,
    pub name: String,
    pub purchase_price: i64,
    pub cost: ProductionCost,
    pub stamina_cost: i64,
    pub duration_minutes: i64,
    pub reward: BusinessReward,
    pub min_level_required: u32,
    /// Fraction of the (capped) input value removed as a laundering fee.
    #[serde(default)]
    pub conversion_rate: Option<f64>,
}

/// Per-player ownership of a business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnedBusinessRecord {
    pub player_id: String,
    pub business_id: String,
    /// 1-10.
    pub upgrade_level: u8,
    pub acquired_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl OwnedBusinessRecord {
    pub fn new(player_id: &str, business_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.to_string(),
            business_id: business_id.to_string(),
            upgrade_level: 1,
            acquired_at: now,
            schema_version: BUSINESS_SCHEMA_VERSION,
        }
    }
}

/// The reward waiting inside an in-flight production run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PendingReward {
    Cash { amount: i64 },
    Items { item_id: String, quantity: u32 },
}

/// An in-flight, time-bound production run. A business has at most one
/// uncollected run at a time; "ready" is derived from `completed_at`, not
/// stored as a flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionRecord {
    pub player_id: String,
    pub business_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub reward: PendingReward,
    pub collected: bool,
    pub schema_version: u8,
}

impl ProductionRecord {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now >= self.completed_at
    }
}

/// Static catalog entry for a hireable worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerDef {
    pub id: String,
    pub name: String,
    pub hire_cost: i64,
    pub income_per_hour: i64,
    pub min_level_required: u32,
}

/// A hired worker instance on a player's roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HiredWorkerRecord {
    pub instance_id: String,
    pub player_id: String,
    pub worker_id: String,
    pub hired_at: DateTime<Utc>,
    pub schema_version: u8,
}

/// Per-player brothel aggregate: slot capacity and pending-income accrual.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrothelRecord {
    pub player_id: String,
    pub worker_slots: u32,
    pub additional_slots: u32,
    /// Bookkeeping sum of income_per_hour across hired instances. Kept in
    /// lockstep with the roster by hire/sell.
    pub income_per_hour: i64,
    pub last_collection: DateTime<Utc>,
    pub schema_version: u8,
}

impl BrothelRecord {
    pub fn new(player_id: &str, worker_slots: u32, now: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.to_string(),
            worker_slots,
            additional_slots: 0,
            income_per_hour: 0,
            last_collection: now,
            schema_version: BROTHEL_SCHEMA_VERSION,
        }
    }

    pub fn total_slots(&self) -> u32 {
        self.worker_slots + self.additional_slots
    }

    /// Income accrued since the last collection, computed from elapsed
    /// wall-clock seconds.
    pub fn pending_income(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = now.signed_duration_since(self.last_collection).num_seconds();
        if elapsed <= 0 {
            return 0;
        }
        self.income_per_hour * elapsed / 3600
    }
}

/// What an item is for. Weapons and gear contribute derived stat bonuses
/// while equipped; contraband feeds conversion businesses; consumables are
/// single-use effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Weapon { power_bonus: u32 },
    Gear { defense_bonus: u32 },
    Contraband,
    Consumable { effect: ItemEffect },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemEffect {
    /// Immediate release from jail when used.
    JailFree,
}

/// Static catalog entry for an item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDef {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub base_value: i64,
}

impl ItemDef {
    pub fn is_contraband(&self) -> bool {
        matches!(self.kind, ItemKind::Contraband)
    }
}

/// Severity channel for user-facing operation results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Error,
    Info,
}

/// A typed message handed to the UI collaborator after an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub text: String,
}

impl Outcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Info,
            text: text.into(),
        }
    }
}
