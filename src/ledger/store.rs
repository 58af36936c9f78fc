//! Sled-backed local implementation of the ledger contract.
//!
//! Used for development, the demo CLI, and tests. Procedures run under a
//! single write lock so each one is atomic with respect to the others,
//! which is the behavior the remote store guarantees with its transactional
//! procedures. Individual procedures can be switched off through the
//! builder to exercise the degraded direct-write path.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sled::IVec;

use crate::catalog::Catalog;
use crate::config::GameConfig;
use crate::engine::types::{
    BrothelRecord, HiredWorkerRecord, OwnedBusinessRecord, PlayerRecord, ProductionRecord, Skill,
    TransferDirection, BROTHEL_SCHEMA_VERSION, BUSINESS_SCHEMA_VERSION, PLAYER_SCHEMA_VERSION,
    PRODUCTION_SCHEMA_VERSION, WORKER_SCHEMA_VERSION,
};
use crate::ledger::{
    ops, BankReceipt, BribeReceipt, BrothelReceipt, CashReceipt, CollectReceipt, CrimeOutcome,
    DailyBonusReceipt, HireReceipt, LeaderboardEntry, Ledger, LedgerError, PlayerSummary,
    ProcedureKind, ProductionInput, ProductionStartReceipt, PurchaseReceipt, PvpOutcome,
    SellReceipt, SkillReceipt, StaminaReceipt, UpgradeReceipt,
};

const TREE_PLAYERS: &str = "players";
const TREE_INVENTORY: &str = "inventory";
const TREE_BUSINESSES: &str = "businesses";
const TREE_PRODUCTIONS: &str = "productions";
const TREE_WORKERS: &str = "workers";
const TREE_BROTHELS: &str = "brothels";

/// Helper builder so tests can easily create throwaway stores with custom
/// capability sets and deterministic rolls.
pub struct SledLedgerBuilder {
    path: PathBuf,
    catalog: Arc<Catalog>,
    game: GameConfig,
    roll_seed: Option<u64>,
    disabled: HashSet<ProcedureKind>,
}

impl SledLedgerBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            catalog: Arc::new(Catalog::standard()),
            game: GameConfig::default(),
            roll_seed: None,
            disabled: HashSet::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_game_config(mut self, game: GameConfig) -> Self {
        self.game = game;
        self
    }

    /// Seed the outcome RNG for reproducible rolls in tests.
    pub fn with_roll_seed(mut self, seed: u64) -> Self {
        self.roll_seed = Some(seed);
        self
    }

    /// Pretend this deployment does not carry the given procedure, forcing
    /// callers onto the direct-write path.
    pub fn without_procedure(mut self, kind: ProcedureKind) -> Self {
        self.disabled.insert(kind);
        self
    }

    pub fn open(self) -> Result<SledLedger, LedgerError> {
        SledLedger::open_with_options(
            self.path,
            self.catalog,
            self.game,
            self.roll_seed,
            self.disabled,
        )
    }
}

/// Sled-backed persistence for player, inventory, business, and worker
/// records, plus the transactional procedure set.
pub struct SledLedger {
    _db: sled::Db,
    players: sled::Tree,
    inventory: sled::Tree,
    businesses: sled::Tree,
    productions: sled::Tree,
    workers: sled::Tree,
    brothels: sled::Tree,
    catalog: Arc<Catalog>,
    game: GameConfig,
    /// Serializes procedures; models the server's transactional section.
    write_lock: Mutex<()>,
    rng: Mutex<StdRng>,
    disabled: HashSet<ProcedureKind>,
}

impl SledLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        SledLedgerBuilder::new(path.as_ref()).open()
    }

    fn open_with_options(
        path: PathBuf,
        catalog: Arc<Catalog>,
        game: GameConfig,
        roll_seed: Option<u64>,
        disabled: HashSet<ProcedureKind>,
    ) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(&path)?;
        let players = db.open_tree(TREE_PLAYERS)?;
        let inventory = db.open_tree(TREE_INVENTORY)?;
        let businesses = db.open_tree(TREE_BUSINESSES)?;
        let productions = db.open_tree(TREE_PRODUCTIONS)?;
        let workers = db.open_tree(TREE_WORKERS)?;
        let brothels = db.open_tree(TREE_BROTHELS)?;
        let rng = match roll_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            _db: db,
            players,
            inventory,
            businesses,
            productions,
            workers,
            brothels,
            catalog,
            game,
            write_lock: Mutex::new(()),
            rng: Mutex::new(rng),
            disabled,
        })
    }

    fn player_key(id: &str) -> Vec<u8> {
        format!("players:{}", id).into_bytes()
    }

    fn inventory_key(player_id: &str, item_id: &str) -> Vec<u8> {
        format!("inv:{}:{}", player_id, item_id).into_bytes()
    }

    fn inventory_prefix(player_id: &str) -> Vec<u8> {
        format!("inv:{}:", player_id).into_bytes()
    }

    fn business_key(player_id: &str, business_id: &str) -> Vec<u8> {
        format!("biz:{}:{}", player_id, business_id).into_bytes()
    }

    fn business_prefix(player_id: &str) -> Vec<u8> {
        format!("biz:{}:", player_id).into_bytes()
    }

    fn production_key(player_id: &str, business_id: &str) -> Vec<u8> {
        format!("prod:{}:{}", player_id, business_id).into_bytes()
    }

    fn production_prefix(player_id: &str) -> Vec<u8> {
        format!("prod:{}:", player_id).into_bytes()
    }

    fn worker_key(player_id: &str, instance_id: &str) -> Vec<u8> {
        format!("workers:{}:{}", player_id, instance_id).into_bytes()
    }

    fn worker_prefix(player_id: &str) -> Vec<u8> {
        format!("workers:{}:", player_id).into_bytes()
    }

    fn brothel_key(player_id: &str) -> Vec<u8> {
        format!("brothel:{}", player_id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, LedgerError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    fn check_procedure(&self, kind: ProcedureKind) -> Result<(), LedgerError> {
        if self.disabled.contains(&kind) {
            Err(LedgerError::ProcedureUnavailable(kind.name()))
        } else {
            Ok(())
        }
    }

    fn load_player(&self, id: &str) -> Result<PlayerRecord, LedgerError> {
        let Some(bytes) = self.players.get(Self::player_key(id))? else {
            return Err(LedgerError::NotFound(format!("player: {}", id)));
        };
        let record: PlayerRecord = Self::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(LedgerError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn store_player(&self, player: &PlayerRecord) -> Result<(), LedgerError> {
        let mut player = player.clone();
        player.schema_version = PLAYER_SCHEMA_VERSION;
        self.players
            .insert(Self::player_key(&player.id), Self::serialize(&player)?)?;
        self.players.flush()?;
        Ok(())
    }

    fn load_inventory(&self, player_id: &str) -> Result<HashMap<String, u32>, LedgerError> {
        let prefix = format!("inv:{}:", player_id);
        let mut map = HashMap::new();
        for entry in self.inventory.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(item_id) = text.strip_prefix(&prefix) {
                let quantity: u32 = Self::deserialize(value)?;
                if quantity > 0 {
                    map.insert(item_id.to_string(), quantity);
                }
            }
        }
        Ok(map)
    }

    /// Replace the stored inventory with the given map. Zero-quantity
    /// entries are deleted, never written.
    fn store_inventory(
        &self,
        player_id: &str,
        inventory: &HashMap<String, u32>,
    ) -> Result<(), LedgerError> {
        let prefix = Self::inventory_prefix(player_id);
        let stale: Vec<IVec> = self
            .inventory
            .scan_prefix(&prefix)
            .filter_map(|entry| entry.ok().map(|(key, _)| key))
            .collect();
        for key in stale {
            self.inventory.remove(key)?;
        }
        for (item_id, quantity) in inventory {
            if *quantity > 0 {
                self.inventory.insert(
                    Self::inventory_key(player_id, item_id),
                    Self::serialize(quantity)?,
                )?;
            }
        }
        self.inventory.flush()?;
        Ok(())
    }

    fn load_brothel(&self, player_id: &str) -> Result<BrothelRecord, LedgerError> {
        match self.brothels.get(Self::brothel_key(player_id))? {
            Some(bytes) => {
                let record: BrothelRecord = Self::deserialize(bytes)?;
                if record.schema_version != BROTHEL_SCHEMA_VERSION {
                    return Err(LedgerError::SchemaMismatch {
                        entity: "brothel",
                        expected: BROTHEL_SCHEMA_VERSION,
                        found: record.schema_version,
                    });
                }
                Ok(record)
            }
            None => Ok(BrothelRecord::new(
                player_id,
                self.game.default_worker_slots,
                Utc::now(),
            )),
        }
    }

    fn store_brothel(&self, brothel: &BrothelRecord) -> Result<(), LedgerError> {
        self.brothels.insert(
            Self::brothel_key(&brothel.player_id),
            Self::serialize(brothel)?,
        )?;
        self.brothels.flush()?;
        Ok(())
    }

    fn load_production(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<Option<ProductionRecord>, LedgerError> {
        match self
            .productions
            .get(Self::production_key(player_id, business_id))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn store_production(&self, production: &ProductionRecord) -> Result<(), LedgerError> {
        self.productions.insert(
            Self::production_key(&production.player_id, &production.business_id),
            Self::serialize(production)?,
        )?;
        self.productions.flush()?;
        Ok(())
    }

    fn load_owned_business(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<OwnedBusinessRecord, LedgerError> {
        let Some(bytes) = self
            .businesses
            .get(Self::business_key(player_id, business_id))?
        else {
            return Err(LedgerError::NotFound(format!(
                "owned business: {}:{}",
                player_id, business_id
            )));
        };
        Self::deserialize(bytes)
    }

    /// Sweep lapsed jail/hospital stamps into the stored record so every
    /// procedure starts from the clock-derived lifecycle.
    fn normalized_player(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PlayerRecord, LedgerError> {
        let mut player = self.load_player(id)?;
        if ops::sweep_releases(&mut player, now) {
            self.store_player(&player)?;
        }
        Ok(player)
    }
}

impl Ledger for SledLedger {
    fn supports(&self, kind: ProcedureKind) -> bool {
        !self.disabled.contains(&kind)
    }

    fn ensure_player(&self, id: &str, display_name: &str) -> Result<PlayerRecord, LedgerError> {
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        match self.load_player(id) {
            Ok(player) => Ok(player),
            Err(LedgerError::NotFound(_)) => {
                let player = PlayerRecord::new(id, display_name, self.game.starting_cash, Utc::now());
                self.store_player(&player)?;
                log::info!(
                    "created player {} with starting grant {}",
                    id,
                    self.game.starting_cash
                );
                Ok(player)
            }
            Err(e) => Err(e),
        }
    }

    fn fetch_player(&self, id: &str) -> Result<PlayerRecord, LedgerError> {
        self.load_player(id)
    }

    fn inventory_by_player(&self, id: &str) -> Result<HashMap<String, u32>, LedgerError> {
        self.load_inventory(id)
    }

    fn owned_businesses(&self, id: &str) -> Result<Vec<OwnedBusinessRecord>, LedgerError> {
        let mut owned = Vec::new();
        for entry in self.businesses.scan_prefix(Self::business_prefix(id)) {
            let (_, value) = entry?;
            let record: OwnedBusinessRecord = Self::deserialize(value)?;
            if record.schema_version != BUSINESS_SCHEMA_VERSION {
                return Err(LedgerError::SchemaMismatch {
                    entity: "owned_business",
                    expected: BUSINESS_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            owned.push(record);
        }
        Ok(owned)
    }

    fn productions(&self, id: &str) -> Result<Vec<ProductionRecord>, LedgerError> {
        let mut runs = Vec::new();
        for entry in self.productions.scan_prefix(Self::production_prefix(id)) {
            let (_, value) = entry?;
            let record: ProductionRecord = Self::deserialize(value)?;
            if record.schema_version != PRODUCTION_SCHEMA_VERSION {
                return Err(LedgerError::SchemaMismatch {
                    entity: "production",
                    expected: PRODUCTION_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            runs.push(record);
        }
        Ok(runs)
    }

    fn hired_workers(&self, id: &str) -> Result<Vec<HiredWorkerRecord>, LedgerError> {
        let mut roster = Vec::new();
        for entry in self.workers.scan_prefix(Self::worker_prefix(id)) {
            let (_, value) = entry?;
            let record: HiredWorkerRecord = Self::deserialize(value)?;
            if record.schema_version != WORKER_SCHEMA_VERSION {
                return Err(LedgerError::SchemaMismatch {
                    entity: "worker",
                    expected: WORKER_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            roster.push(record);
        }
        Ok(roster)
    }

    fn brothel(&self, id: &str) -> Result<BrothelRecord, LedgerError> {
        self.load_brothel(id)
    }

    fn online_players(&self, now: DateTime<Utc>) -> Result<Vec<PlayerSummary>, LedgerError> {
        let window = Duration::minutes(self.game.online_window_minutes);
        let mut online = Vec::new();
        for entry in self.players.iter() {
            let (_, value) = entry?;
            let record: PlayerRecord = Self::deserialize(value)?;
            if now.signed_duration_since(record.updated_at) <= window {
                online.push(PlayerSummary {
                    id: record.id,
                    display_name: record.display_name,
                    level: record.level,
                    hp: record.hp,
                    max_hp: record.max_hp,
                });
            }
        }
        online.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(online)
    }

    fn leaderboard_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let mut entries = Vec::new();
        for entry in self.players.iter() {
            let (_, value) = entry?;
            let record: PlayerRecord = Self::deserialize(value)?;
            entries.push(LeaderboardEntry {
                total_wealth: record.total_wealth(),
                id: record.id,
                display_name: record.display_name,
                level: record.level,
            });
        }
        entries.sort_by(|a, b| b.total_wealth.cmp(&a.total_wealth).then(a.id.cmp(&b.id)));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    fn put_player(&self, player: &PlayerRecord) -> Result<(), LedgerError> {
        self.store_player(player)
    }

    fn put_inventory_entry(
        &self,
        player_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            self.inventory
                .remove(Self::inventory_key(player_id, item_id))?;
        } else {
            self.inventory.insert(
                Self::inventory_key(player_id, item_id),
                Self::serialize(&quantity)?,
            )?;
        }
        self.inventory.flush()?;
        Ok(())
    }

    fn put_brothel(&self, brothel: &BrothelRecord) -> Result<(), LedgerError> {
        self.store_brothel(brothel)
    }

    fn put_production(&self, production: &ProductionRecord) -> Result<(), LedgerError> {
        self.store_production(production)
    }

    fn put_owned_business(&self, business: &OwnedBusinessRecord) -> Result<(), LedgerError> {
        self.businesses.insert(
            Self::business_key(&business.player_id, &business.business_id),
            Self::serialize(business)?,
        )?;
        self.businesses.flush()?;
        Ok(())
    }

    fn insert_workers(&self, workers: &[HiredWorkerRecord]) -> Result<(), LedgerError> {
        for worker in workers {
            self.workers.insert(
                Self::worker_key(&worker.player_id, &worker.instance_id),
                Self::serialize(worker)?,
            )?;
        }
        self.workers.flush()?;
        Ok(())
    }

    fn remove_workers(
        &self,
        player_id: &str,
        instance_ids: &[String],
    ) -> Result<(), LedgerError> {
        for instance_id in instance_ids {
            self.workers
                .remove(Self::worker_key(player_id, instance_id))?;
        }
        self.workers.flush()?;
        Ok(())
    }

    fn adjust_cash(&self, player_id: &str, delta: i64) -> Result<CashReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::AdjustCash)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let mut player = self.load_player(player_id)?;
        let new_cash = ops::adjust_cash(&mut player, delta)?;
        self.store_player(&player)?;
        Ok(CashReceipt { new_cash })
    }

    fn bank_transfer(
        &self,
        player_id: &str,
        amount: i64,
        direction: TransferDirection,
    ) -> Result<BankReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::BankTransfer)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        ops::bank_transfer(&mut player, amount, direction, &self.game, now)?;
        self.store_player(&player)?;
        Ok(BankReceipt {
            new_cash: player.cash,
            new_bank: player.bank_balance,
            player,
        })
    }

    fn execute_crime_outcome(
        &self,
        player_id: &str,
        crime_id: &str,
    ) -> Result<CrimeOutcome, LedgerError> {
        self.check_procedure(ProcedureKind::CrimeOutcome)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let crime = self
            .catalog
            .crime(crime_id)
            .ok_or_else(|| LedgerError::NotFound(format!("crime: {}", crime_id)))?;
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let mut inventory = self.load_inventory(player_id)?;
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let resolution = ops::run_crime(&mut player, &mut inventory, crime, &self.game, now, &mut *rng)?;
        drop(rng);
        self.store_player(&player)?;
        self.store_inventory(player_id, &inventory)?;
        Ok(CrimeOutcome {
            player,
            success: resolution.success,
            reward: resolution.reward,
            xp_gained: resolution.xp_gained,
            jail_minutes: resolution.jail_minutes,
            hospitalized: resolution.hospitalized,
            drops: resolution.drops,
            leveled_up: resolution.leveled_up,
        })
    }

    fn execute_pvp_attack(
        &self,
        attacker_id: &str,
        defender_id: &str,
    ) -> Result<PvpOutcome, LedgerError> {
        self.check_procedure(ProcedureKind::PvpAttack)?;
        if attacker_id == defender_id {
            return Err(LedgerError::Rejected("cannot attack yourself".to_string()));
        }
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut attacker = self.normalized_player(attacker_id, now)?;
        let mut defender = self.normalized_player(defender_id, now)?;
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let resolution = ops::run_pvp(
            &mut attacker,
            &mut defender,
            &self.catalog,
            &self.game,
            now,
            &mut *rng,
        )?;
        drop(rng);
        self.store_player(&attacker)?;
        self.store_player(&defender)?;
        Ok(PvpOutcome {
            attacker,
            defender_id: defender_id.to_string(),
            attacker_won: resolution.attacker_won,
            cash_taken: resolution.cash_taken,
        })
    }

    fn execute_jail_bribe(&self, player_id: &str) -> Result<BribeReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::JailBribe)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let amount_paid = ops::pay_bribe(&mut player, now)?;
        self.store_player(&player)?;
        Ok(BribeReceipt {
            player,
            amount_paid,
        })
    }

    fn upgrade_skill(&self, player_id: &str, skill: Skill) -> Result<SkillReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::SkillUpgrade)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let (new_level, cost) = ops::upgrade_skill(&mut player, skill, now)?;
        self.store_player(&player)?;
        Ok(SkillReceipt {
            player,
            skill,
            new_level,
            cost,
        })
    }

    fn refill_stamina(&self, player_id: &str) -> Result<StaminaReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::StaminaRefill)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let gained = ops::refill_stamina(&mut player, &self.game, now)?;
        self.store_player(&player)?;
        Ok(StaminaReceipt { player, gained })
    }

    fn collect_brothel_income(&self, player_id: &str) -> Result<BrothelReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::BrothelIncome)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let mut brothel = self.load_brothel(player_id)?;
        let collected = ops::collect_brothel_income(&mut player, &mut brothel, now)?;
        self.store_player(&player)?;
        self.store_brothel(&brothel)?;
        Ok(BrothelReceipt {
            player,
            brothel,
            collected,
        })
    }

    fn claim_daily_bonus(&self, player_id: &str) -> Result<DailyBonusReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::DailyBonus)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let amount = ops::claim_daily_bonus(&mut player, &self.game, now)?;
        self.store_player(&player)?;
        Ok(DailyBonusReceipt { player, amount })
    }

    fn hire_workers(
        &self,
        player_id: &str,
        worker_id: &str,
        quantity: u32,
    ) -> Result<HireReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::HireWorkers)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let worker = self
            .catalog
            .worker(worker_id)
            .ok_or_else(|| LedgerError::NotFound(format!("worker: {}", worker_id)))?;
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let mut brothel = self.load_brothel(player_id)?;
        // The count is read inside the same locked section as the insert,
        // which closes the double-hire race window.
        let current_count = self.hired_workers(player_id)?.len() as u32;
        let hired = ops::hire_workers(&mut player, &mut brothel, current_count, worker, quantity, now)?;
        self.insert_workers(&hired)?;
        self.store_player(&player)?;
        self.store_brothel(&brothel)?;
        Ok(HireReceipt {
            player,
            brothel,
            hired,
        })
    }

    fn sell_workers(
        &self,
        player_id: &str,
        worker_id: &str,
        quantity: u32,
    ) -> Result<SellReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::SellWorkers)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let worker = self
            .catalog
            .worker(worker_id)
            .ok_or_else(|| LedgerError::NotFound(format!("worker: {}", worker_id)))?;
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let mut brothel = self.load_brothel(player_id)?;
        let roster = self.hired_workers(player_id)?;
        let (removed, refund) =
            ops::sell_workers(&mut player, &mut brothel, &roster, worker, quantity, &self.game, now)?;
        self.remove_workers(player_id, &removed)?;
        self.store_player(&player)?;
        self.store_brothel(&brothel)?;
        Ok(SellReceipt {
            player,
            brothel,
            sold: removed.len() as u32,
            refund,
        })
    }

    fn purchase_business(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<PurchaseReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::PurchaseBusiness)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let business = self
            .catalog
            .business(business_id)
            .ok_or_else(|| LedgerError::NotFound(format!("business: {}", business_id)))?;
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let owned = self.owned_businesses(player_id)?;
        let record = ops::purchase_business(&mut player, &owned, business, now)?;
        self.put_owned_business(&record)?;
        self.store_player(&player)?;
        Ok(PurchaseReceipt {
            player,
            business: record,
        })
    }

    fn start_production(
        &self,
        player_id: &str,
        business_id: &str,
        input: Option<ProductionInput>,
    ) -> Result<ProductionStartReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::StartProduction)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let business = self
            .catalog
            .business(business_id)
            .ok_or_else(|| LedgerError::NotFound(format!("business: {}", business_id)))?;
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let owned = self.load_owned_business(player_id, business_id)?;
        let existing = self.load_production(player_id, business_id)?;
        let mut inventory = self.load_inventory(player_id)?;
        let production = ops::start_production(
            &mut player,
            &mut inventory,
            &owned,
            existing.as_ref(),
            business,
            &self.catalog,
            input,
            now,
        )?;
        self.store_production(&production)?;
        self.store_player(&player)?;
        self.store_inventory(player_id, &inventory)?;
        Ok(ProductionStartReceipt { player, production })
    }

    fn collect_production(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<CollectReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::CollectProduction)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let mut production = self
            .load_production(player_id, business_id)?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("production: {}:{}", player_id, business_id))
            })?;
        let mut inventory = self.load_inventory(player_id)?;
        let reward = ops::collect_production(&mut player, &mut inventory, &mut production, now)?;
        // The collected flag persists in the same section as the payout, so
        // a second collect can never pay again.
        self.store_production(&production)?;
        self.store_player(&player)?;
        self.store_inventory(player_id, &inventory)?;
        Ok(CollectReceipt { player, reward })
    }

    fn upgrade_business(
        &self,
        player_id: &str,
        business_id: &str,
    ) -> Result<UpgradeReceipt, LedgerError> {
        self.check_procedure(ProcedureKind::UpgradeBusiness)?;
        let _guard = self.write_lock.lock().expect("ledger write lock poisoned");
        let business = self
            .catalog
            .business(business_id)
            .ok_or_else(|| LedgerError::NotFound(format!("business: {}", business_id)))?;
        let now = Utc::now();
        let mut player = self.normalized_player(player_id, now)?;
        let mut owned = self.load_owned_business(player_id, business_id)?;
        let cost = ops::upgrade_business(&mut player, &mut owned, business, now)?;
        self.put_owned_business(&owned)?;
        self.store_player(&player)?;
        Ok(UpgradeReceipt {
            player,
            business: owned,
            cost,
        })
    }
}
