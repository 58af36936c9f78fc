//! The authoritative store contract.
//!
//! The production ledger is a remote service; everything the simulation
//! needs from it is captured by the [`Ledger`] trait: a set of
//! server-validated transactional procedures, the primitive reads and
//! writes used by the degraded fallback path, and a capability probe so
//! callers can discover which procedures a deployment actually has.
//! [`store::SledLedger`] is the local implementation used for development
//! and tests.

pub mod gateway;
pub mod ops;
pub mod store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::types::{
    BrothelRecord, HiredWorkerRecord, OwnedBusinessRecord, PendingReward, PlayerRecord,
    ProductionRecord, Skill, TransferDirection,
};

pub use gateway::{DirectLedgerWrite, Gateway, MutationPath, MutationStrategy, RemoteProcedure};
pub use store::{SledLedger, SledLedgerBuilder};

/// Errors from the store boundary.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Cash or bank balance would go negative.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Stamina would go negative.
    #[error("insufficient stamina")]
    InsufficientStamina,

    /// A capacity-guarded insert lost its slot between check and commit.
    #[error("capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: u32, available: u32 },

    /// The deployment does not carry this transactional procedure.
    #[error("procedure unavailable: {0}")]
    ProcedureUnavailable(&'static str),

    /// A server-side validation rejected the operation; nothing changed.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// The transactional procedures a ledger deployment may carry. Probed via
/// [`Ledger::supports`] so callers can degrade to the direct-write path
/// mid-rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    AdjustCash,
    BankTransfer,
    CrimeOutcome,
    PvpAttack,
    JailBribe,
    SkillUpgrade,
    StaminaRefill,
    BrothelIncome,
    DailyBonus,
    HireWorkers,
    SellWorkers,
    PurchaseBusiness,
    StartProduction,
    CollectProduction,
    UpgradeBusiness,
}

impl ProcedureKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProcedureKind::AdjustCash => "adjust_cash",
            ProcedureKind::BankTransfer => "bank_transfer",
            ProcedureKind::CrimeOutcome => "execute_crime_outcome",
            ProcedureKind::PvpAttack => "execute_pvp_attack",
            ProcedureKind::JailBribe => "execute_jail_bribe",
            ProcedureKind::SkillUpgrade => "upgrade_skill",
            ProcedureKind::StaminaRefill => "refill_stamina",
            ProcedureKind::BrothelIncome => "collect_brothel_income",
            ProcedureKind::DailyBonus => "claim_daily_bonus",
            ProcedureKind::HireWorkers => "hire_workers",
            ProcedureKind::SellWorkers => "sell_workers",
            ProcedureKind::PurchaseBusiness => "purchase_business",
            ProcedureKind::StartProduction => "start_production",
            ProcedureKind::CollectProduction => "collect_production",
            ProcedureKind::UpgradeBusiness => "upgrade_business",
        }
    }
}

/// Caller-selected input for a contraband-consuming production run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionInput {
    pub item_id: String,
    pub quantity: u32,
}

/// A row in the online-players snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSummary {
    pub id: String,
    pub display_name: String,
    pub level: u32,
    pub hp: i64,
    pub max_hp: i64,
}

/// A row in the wealth leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub id: String,
    pub display_name: String,
    pub level: u32,
    pub total_wealth: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CashReceipt {
    pub new_cash: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankReceipt {
    pub player: PlayerRecord,
    pub new_cash: i64,
    pub new_bank: i64,
}

/// Authoritative result of a crime attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimeOutcome {
    pub player: PlayerRecord,
    pub success: bool,
    pub reward: i64,
    pub xp_gained: i64,
    /// Zero unless the failure ended in jail.
    pub jail_minutes: i64,
    pub hospitalized: bool,
    pub drops: Vec<(String, u32)>,
    pub leveled_up: bool,
}

/// Authoritative result of a PvP attack, from the attacker's side.
#[derive(Debug, Clone, PartialEq)]
pub struct PvpOutcome {
    pub attacker: PlayerRecord,
    pub defender_id: String,
    pub attacker_won: bool,
    pub cash_taken: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BribeReceipt {
    pub player: PlayerRecord,
    pub amount_paid: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillReceipt {
    pub player: PlayerRecord,
    pub skill: Skill,
    pub new_level: u32,
    pub cost: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaminaReceipt {
    pub player: PlayerRecord,
    pub gained: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrothelReceipt {
    pub player: PlayerRecord,
    pub brothel: BrothelRecord,
    pub collected: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyBonusReceipt {
    pub player: PlayerRecord,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HireReceipt {
    pub player: PlayerRecord,
    pub brothel: BrothelRecord,
    pub hired: Vec<HiredWorkerRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellReceipt {
    pub player: PlayerRecord,
    pub brothel: BrothelRecord,
    pub sold: u32,
    pub refund: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub player: PlayerRecord,
    pub business: OwnedBusinessRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionStartReceipt {
    pub player: PlayerRecord,
    pub production: ProductionRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectReceipt {
    pub player: PlayerRecord,
    pub reward: PendingReward,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeReceipt {
    pub player: PlayerRecord,
    pub business: OwnedBusinessRecord,
    pub cost: i64,
}

/// The full store contract. Procedures are atomic server-side; primitives
/// exist for reads and for the degraded direct-write path.
pub trait Ledger: Send + Sync {
    /// Whether this deployment carries the given transactional procedure.
    fn supports(&self, kind: ProcedureKind) -> bool;

    // --- reads -----------------------------------------------------------

    /// Fetch the player, creating the row with the starting grant on first
    /// interaction.
    fn ensure_player(
        &self,
        id: &str,
        display_name: &str,
    ) -> Result<PlayerRecord, LedgerError>;

    fn fetch_player(&self, id: &str) -> Result<PlayerRecord, LedgerError>;

    fn inventory_by_player(&self, id: &str) -> Result<HashMap<String, u32>, LedgerError>;

    fn owned_businesses(&self, id: &str) -> Result<Vec<OwnedBusinessRecord>, LedgerError>;

    fn productions(&self, id: &str) -> Result<Vec<ProductionRecord>, LedgerError>;

    fn hired_workers(&self, id: &str) -> Result<Vec<HiredWorkerRecord>, LedgerError>;

    fn brothel(&self, id: &str) -> Result<BrothelRecord, LedgerError>;

    fn online_players(&self, now: DateTime<Utc>) -> Result<Vec<PlayerSummary>, LedgerError>;

    fn leaderboard_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, LedgerError>;

    // --- primitives (fallback writes) ------------------------------------

    fn put_player(&self, player: &PlayerRecord) -> Result<(), LedgerError>;

    /// Quantity 0 deletes the row; entries are never retained at zero.
    fn put_inventory_entry(
        &self,
        player_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<(), LedgerError>;

    fn put_brothel(&self, brothel: &BrothelRecord) -> Result<(), LedgerError>;

    fn put_production(&self, production: &ProductionRecord) -> Result<(), LedgerError>;

    fn put_owned_business(&self, business: &OwnedBusinessRecord) -> Result<(), LedgerError>;

    fn insert_workers(&self, workers: &[HiredWorkerRecord]) -> Result<(), LedgerError>;

    fn remove_workers(&self, player_id: &str, instance_ids: &[String])
        -> Result<(), LedgerError>;

    // --- transactional procedures ----------------------------------------

    /// Fails if the resulting cash would be negative.
    fn adjust_cash(&self, player_id: &str, delta: i64) -> Result<CashReceipt, LedgerError>;

    fn bank_transfer(
        &self,
        player_id: &str,
        amount: i64,
        direction: TransferDirection,
    ) -> Result<BankReceipt, LedgerError>;

    fn execute_crime_outcome(
        &self,
        player_id: &str,
        crime_id: &str,
    ) -> Result<CrimeOutcome, LedgerError>;

    fn execute_pvp_attack(
        &self,
        attacker_id: &str,
        defender_id: &str,
    ) -> Result<PvpOutcome, LedgerError>;

    fn execute_jail_bribe(&self, player_id: &str) -> Result<BribeReceipt, LedgerError>;

    fn upgrade_skill(&self, player_id: &str, skill: Skill) -> Result<SkillReceipt, LedgerError>;

    fn refill_stamina(&self, player_id: &str) -> Result<StaminaReceipt, LedgerError>;

    fn collect_brothel_income(&self, player_id: &str) -> Result<BrothelReceipt, LedgerError>;

    fn claim_daily_bonus(&self, player_id: &str) -> Result<DailyBonusReceipt, LedgerError>;

    fn hire_workers(
        &self,
        player_id: &str,
        worker_id: &str,
        quantity: u32,
    ) -> Result<HireReceipt, LedgerError>;

    fn sell_workers(
        &self,
        player_id: &str,
        worker_id: &str,
        quantity: u32,
    ) -> Result<SellReceipt, LedgerError>;

    fn purchase_business(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<PurchaseReceipt, LedgerError>;

    fn start_production(
        &self,
        player_id: &str,
        business_id: &str,
        input: Option<ProductionInput>,
    ) -> Result<ProductionStartReceipt, LedgerError>;

    fn collect_production(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<CollectReceipt, LedgerError>;

    fn upgrade_business(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<UpgradeReceipt, LedgerError>;
}
