//! Session-scoped orchestration of every economy operation.
//!
//! The simulator owns one player's working state: the local copy of the
//! player record and its collections, the reconciliation guard, and the
//! countdown board. Every operation follows the same shape: check
//! preconditions locally as a fast path, commit through the gateway (the
//! ledger re-checks as the authority), fold the authoritative result back
//! into the session, stamp the guard, and refresh the countdowns.
//! Previews never mutate anything.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::engine::combat;
use crate::engine::errors::EngineError;
use crate::engine::history::{CrimeAttemptEntry, HistoryJournal};
use crate::engine::lifecycle::{self, LifecycleState};
use crate::engine::penalty::{self, BribeQuote};
use crate::engine::reconciler::{MergeOutcome, Reconciler};
use crate::engine::timers::{CountdownKind, TimerBoard};
use crate::engine::types::{
    BrothelRecord, HiredWorkerRecord, ItemKind, Outcome, OwnedBusinessRecord, PendingReward,
    PlayerRecord, ProductionRecord, Skill, StatView, TransferDirection,
};
use crate::ledger::{
    Gateway, LeaderboardEntry, Ledger, LedgerError, MutationPath, PlayerSummary, ProcedureKind,
    ProductionInput,
};
use crate::metrics;

/// Working copy of everything the UI renders for one player.
#[derive(Debug, Clone)]
pub struct Session {
    pub player: PlayerRecord,
    pub inventory: HashMap<String, u32>,
    pub businesses: Vec<OwnedBusinessRecord>,
    pub productions: Vec<ProductionRecord>,
    pub workers: Vec<HiredWorkerRecord>,
    pub brothel: BrothelRecord,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Read-only snapshot handed to the UI collaborator.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub player: PlayerRecord,
    pub state: LifecycleState,
    pub power: StatView,
    pub intelligence: StatView,
    pub defense: StatView,
    pub combat_power: f64,
    pub countdowns: Vec<(CountdownKind, chrono::Duration)>,
}

/// Preview of a crime before attempting it.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimePreview {
    pub crime_id: String,
    pub chance: f64,
    pub base_reward: i64,
    pub max_reward: i64,
    pub stamina_cost: i64,
}

/// Result of a committed crime attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimeReport {
    pub success: bool,
    pub reward: i64,
    pub xp_gained: i64,
    pub jail_minutes: i64,
    pub hospitalized: bool,
    pub drops: Vec<(String, u32)>,
    pub leveled_up: bool,
    pub message: Outcome,
}

/// One batch of polled authoritative state.
#[derive(Debug, Clone)]
pub enum PollUpdate {
    Player(PlayerRecord),
    Inventory(HashMap<String, u32>),
    Holdings {
        businesses: Vec<OwnedBusinessRecord>,
        productions: Vec<ProductionRecord>,
        workers: Vec<HiredWorkerRecord>,
        brothel: BrothelRecord,
    },
    Leaderboard(Vec<LeaderboardEntry>),
}

pub struct EconomySimulator {
    catalog: Arc<Catalog>,
    config: Config,
    ledger: Arc<dyn Ledger>,
    gateway: Gateway,
    reconciler: Reconciler,
    timers: TimerBoard,
    history: HistoryJournal,
    session: Session,
}

impl EconomySimulator {
    /// Open a session, creating the player row (with the starting grant) on
    /// first interaction.
    pub fn start(
        ledger: Arc<dyn Ledger>,
        catalog: Arc<Catalog>,
        config: Config,
        player_id: &str,
        display_name: &str,
    ) -> Result<Self, EngineError> {
        let player = ledger.ensure_player(player_id, display_name)?;
        let inventory = ledger.inventory_by_player(player_id)?;
        let businesses = ledger.owned_businesses(player_id)?;
        let productions = ledger.productions(player_id)?;
        let workers = ledger.hired_workers(player_id)?;
        let brothel = ledger.brothel(player_id)?;
        let gateway = Gateway::new(
            Arc::clone(&ledger),
            Arc::clone(&catalog),
            config.game.clone(),
        );
        let history = HistoryJournal::new(config.ledger.data_dir.clone());
        let mut timers = TimerBoard::new();
        timers.rebuild(&player, &productions, Utc::now());
        Ok(Self {
            catalog,
            reconciler: Reconciler::new(config.polling.guard_window_ms),
            config,
            ledger,
            gateway,
            timers,
            history,
            session: Session {
                player,
                inventory,
                businesses,
                productions,
                workers,
                brothel,
                leaderboard: Vec::new(),
            },
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn player_id(&self) -> &str {
        &self.session.player.id
    }

    /// Snapshot for the UI: base stats, derived equipment bonuses, current
    /// lifecycle state, countdown remainders.
    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        let player = &self.session.player;
        let bonus = self.catalog.equipment_bonus(player);
        SessionView {
            player: player.clone(),
            state: lifecycle::lifecycle_state(player, now),
            power: StatView {
                base: player.power,
                bonus: bonus.power,
            },
            intelligence: StatView {
                base: player.intelligence,
                bonus: 0,
            },
            defense: StatView {
                base: player.defense,
                bonus: bonus.defense,
            },
            combat_power: combat::power_score(player, bonus),
            countdowns: self.timers.snapshot(now),
        }
    }

    // --- local precondition helpers (UX fast path; the ledger re-checks) --

    fn check_free(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        lifecycle::ensure_free(&self.session.player, now)
    }

    fn check_stamina(&self, need: i64) -> Result<(), EngineError> {
        let have = self.session.player.stamina;
        if have < need {
            return Err(EngineError::InsufficientStamina { need, have });
        }
        Ok(())
    }

    fn check_cash(&self, need: i64) -> Result<(), EngineError> {
        let have = self.session.player.cash;
        if have < need {
            return Err(EngineError::InsufficientCash { need, have });
        }
        Ok(())
    }

    fn check_level(&self, required: u32) -> Result<(), EngineError> {
        let actual = self.session.player.level;
        if actual < required {
            return Err(EngineError::LevelTooLow { required, actual });
        }
        Ok(())
    }

    /// Fold an authoritative player record into the session after a
    /// committed mutation, stamp the guard, refresh countdowns.
    fn absorb_player(&mut self, player: PlayerRecord, now: DateTime<Utc>) {
        self.session.player = player;
        self.reconciler.mark_action(now);
        self.timers
            .rebuild(&self.session.player, &self.session.productions, now);
    }

    fn ledger_failure(error: LedgerError, path: MutationPath) -> EngineError {
        metrics::inc_procedure_failures();
        match (error, path) {
            (LedgerError::CapacityExceeded { requested, available }, _) => {
                EngineError::CapacityConflict(format!(
                    "requested {}, available {}",
                    requested, available
                ))
            }
            (e @ LedgerError::Rejected(_), MutationPath::DirectWrite)
            | (e @ LedgerError::InsufficientFunds, MutationPath::DirectWrite)
            | (e @ LedgerError::InsufficientStamina, MutationPath::DirectWrite) => {
                EngineError::FallbackRejected(e.to_string())
            }
            (LedgerError::Rejected(message), MutationPath::Procedure) => {
                EngineError::Precondition(message)
            }
            (LedgerError::InsufficientFunds, MutationPath::Procedure) => {
                EngineError::Precondition("not enough cash".to_string())
            }
            (LedgerError::InsufficientStamina, MutationPath::Procedure) => {
                EngineError::Precondition("not enough stamina".to_string())
            }
            (other, _) => EngineError::Ledger(other),
        }
    }

    // --- crimes -----------------------------------------------------------

    /// The number shown in the UI; computed by the same formula the outcome
    /// roll uses.
    pub fn preview_crime(&self, crime_id: &str) -> Result<CrimePreview, EngineError> {
        let crime = self
            .catalog
            .crime(crime_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "crime",
                id: crime_id.to_string(),
            })?;
        Ok(CrimePreview {
            crime_id: crime.id.clone(),
            chance: penalty::success_chance(&self.session.player, crime),
            base_reward: crime.base_reward,
            max_reward: crime.max_reward,
            stamina_cost: crime.stamina_cost,
        })
    }

    pub fn attempt_crime(&mut self, crime_id: &str) -> Result<CrimeReport, EngineError> {
        let crime = self
            .catalog
            .crime(crime_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "crime",
                id: crime_id.to_string(),
            })?
            .clone();
        let now = Utc::now();
        self.check_free(now)?;
        self.check_stamina(crime.stamina_cost)?;

        metrics::inc_crime_attempts();
        let (strategy, path) = self.gateway.strategy(ProcedureKind::CrimeOutcome);
        let outcome = strategy
            .execute_crime_outcome(self.player_id(), crime_id)
            .map_err(|e| Self::ledger_failure(e, path))?;

        if outcome.success {
            metrics::inc_crime_successes();
        }
        let entry = CrimeAttemptEntry::new(
            &outcome.player.id,
            crime_id,
            outcome.success,
            outcome.reward,
            outcome.xp_gained,
            outcome.jail_minutes,
            now,
        );
        if let Err(e) = self.history.append(entry) {
            log::warn!("history append failed for {}: {}", self.player_id(), e);
        }

        for (item_id, quantity) in &outcome.drops {
            *self.session.inventory.entry(item_id.clone()).or_insert(0) += quantity;
        }
        self.absorb_player(outcome.player, now);

        let message = if outcome.success {
            let mut text = format!("{} paid out ${}.", crime.name, outcome.reward);
            if outcome.leveled_up {
                text.push_str(&format!(" Level {}!", self.session.player.level));
            }
            Outcome::success(text)
        } else if outcome.hospitalized {
            Outcome::error(format!("{} went bad. You woke up in the ER.", crime.name))
        } else {
            Outcome::error(format!(
                "Busted on {}. {} minutes behind bars.",
                crime.name, outcome.jail_minutes
            ))
        };
        log::debug!(
            "crime {} for {}: success={} reward={}",
            crime_id,
            self.player_id(),
            outcome.success,
            outcome.reward
        );
        Ok(CrimeReport {
            success: outcome.success,
            reward: outcome.reward,
            xp_gained: outcome.xp_gained,
            jail_minutes: outcome.jail_minutes,
            hospitalized: outcome.hospitalized,
            drops: outcome.drops,
            leveled_up: outcome.leveled_up,
            message,
        })
    }

    pub fn crime_history(&self) -> Vec<CrimeAttemptEntry> {
        self.history.read(self.player_id())
    }

    // --- bank -------------------------------------------------------------

    pub fn bank_deposit(&mut self, amount: i64) -> Result<Outcome, EngineError> {
        self.bank_transfer(amount, TransferDirection::Deposit)
    }

    pub fn bank_withdraw(&mut self, amount: i64) -> Result<Outcome, EngineError> {
        self.bank_transfer(amount, TransferDirection::Withdraw)
    }

    fn bank_transfer(
        &mut self,
        amount: i64,
        direction: TransferDirection,
    ) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        lifecycle::ensure_bank_allowed(
            &self.session.player,
            now,
            self.config.game.allow_bank_while_jailed,
        )?;
        if amount <= 0 {
            return Err(EngineError::Precondition("amount must be positive".to_string()));
        }
        match direction {
            TransferDirection::Deposit => self.check_cash(amount)?,
            TransferDirection::Withdraw => {
                let have = self.session.player.bank_balance;
                if have < amount {
                    return Err(EngineError::InsufficientBank { need: amount, have });
                }
            }
        }
        let (strategy, path) = self.gateway.strategy(ProcedureKind::BankTransfer);
        let receipt = strategy
            .bank_transfer(self.player_id(), amount, direction)
            .map_err(|e| Self::ledger_failure(e, path))?;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!(
            "Cash ${} / bank ${}.",
            receipt.new_cash, receipt.new_bank
        )))
    }

    // --- businesses -------------------------------------------------------

    pub fn buy_business(&mut self, business_id: &str) -> Result<Outcome, EngineError> {
        let business = self
            .catalog
            .business(business_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "business",
                id: business_id.to_string(),
            })?
            .clone();
        let now = Utc::now();
        self.check_free(now)?;
        self.check_level(business.min_level_required)?;
        self.check_cash(business.purchase_price)?;

        let (strategy, path) = self.gateway.strategy(ProcedureKind::PurchaseBusiness);
        let receipt = strategy
            .purchase_business(self.player_id(), business_id)
            .map_err(|e| Self::ledger_failure(e, path))?;
        self.session.businesses.push(receipt.business);
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!("{} is yours.", business.name)))
    }

    pub fn start_production(
        &mut self,
        business_id: &str,
        input: Option<ProductionInput>,
    ) -> Result<Outcome, EngineError> {
        let business = self
            .catalog
            .business(business_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "business",
                id: business_id.to_string(),
            })?
            .clone();
        let now = Utc::now();
        self.check_free(now)?;
        self.check_stamina(business.stamina_cost)?;
        if let Some(input) = &input {
            let held = self.session.inventory.get(&input.item_id).copied().unwrap_or(0);
            if held < input.quantity {
                return Err(EngineError::MissingItems {
                    item_id: input.item_id.clone(),
                    need: input.quantity,
                    have: held,
                });
            }
        }

        let (strategy, path) = self.gateway.strategy(ProcedureKind::StartProduction);
        let receipt = strategy
            .start_production(self.player_id(), business_id, input.clone())
            .map_err(|e| Self::ledger_failure(e, path))?;
        if let Some(input) = input {
            let held = self.session.inventory.get(&input.item_id).copied().unwrap_or(0);
            let left = held.saturating_sub(input.quantity);
            if left == 0 {
                self.session.inventory.remove(&input.item_id);
            } else {
                self.session.inventory.insert(input.item_id, left);
            }
        }
        self.session
            .productions
            .retain(|p| p.business_id != business_id);
        self.session.productions.push(receipt.production.clone());
        self.absorb_player(receipt.player, now);
        Ok(Outcome::info(format!(
            "{} is running; done in {} minutes.",
            business.name, business.duration_minutes
        )))
    }

    pub fn collect_production(&mut self, business_id: &str) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        self.check_free(now)?;
        let running = self
            .session
            .productions
            .iter()
            .find(|p| p.business_id == business_id && !p.collected);
        match running {
            None => {
                return Err(EngineError::Precondition(
                    "nothing to collect there".to_string(),
                ))
            }
            Some(p) if !p.is_ready(now) => {
                return Err(EngineError::Precondition(
                    "production still running".to_string(),
                ))
            }
            Some(_) => {}
        }

        let (strategy, path) = self.gateway.strategy(ProcedureKind::CollectProduction);
        let receipt = strategy
            .collect_production(self.player_id(), business_id)
            .map_err(|e| Self::ledger_failure(e, path))?;
        if let Some(p) = self
            .session
            .productions
            .iter_mut()
            .find(|p| p.business_id == business_id)
        {
            p.collected = true;
        }
        let message = match &receipt.reward {
            PendingReward::Cash { amount } => {
                Outcome::success(format!("Collected ${}.", amount))
            }
            PendingReward::Items { item_id, quantity } => {
                *self.session.inventory.entry(item_id.clone()).or_insert(0) += quantity;
                let name = self
                    .catalog
                    .item(item_id)
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| item_id.clone());
                Outcome::success(format!("Collected {} x {}.", quantity, name))
            }
        };
        self.absorb_player(receipt.player, now);
        Ok(message)
    }

    pub fn upgrade_business(&mut self, business_id: &str) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        self.check_free(now)?;
        let owned = self
            .session
            .businesses
            .iter()
            .find(|b| b.business_id == business_id)
            .ok_or_else(|| EngineError::Precondition("business not owned".to_string()))?;
        let business = self
            .catalog
            .business(business_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "business",
                id: business_id.to_string(),
            })?;
        if let Some(cost) = penalty::business_upgrade_cost(business.purchase_price, owned.upgrade_level)
        {
            self.check_cash(cost)?;
        } else {
            return Err(EngineError::Precondition(
                "already fully upgraded".to_string(),
            ));
        }

        let (strategy, path) = self.gateway.strategy(ProcedureKind::UpgradeBusiness);
        let receipt = strategy
            .upgrade_business(self.player_id(), business_id)
            .map_err(|e| Self::ledger_failure(e, path))?;
        let new_level = receipt.business.upgrade_level;
        if let Some(b) = self
            .session
            .businesses
            .iter_mut()
            .find(|b| b.business_id == business_id)
        {
            *b = receipt.business;
        }
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!(
            "Upgraded to level {} for ${}.",
            new_level, receipt.cost
        )))
    }

    // --- workers ----------------------------------------------------------

    pub fn hire_workers(&mut self, worker_id: &str, quantity: u32) -> Result<Outcome, EngineError> {
        let worker = self
            .catalog
            .worker(worker_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "worker",
                id: worker_id.to_string(),
            })?
            .clone();
        let now = Utc::now();
        self.check_free(now)?;
        self.check_level(worker.min_level_required)?;
        self.check_cash(worker.hire_cost * quantity as i64)?;
        // Local capacity check is only the fast path; the ledger re-checks
        // against its own count right before the insert.
        let total_slots = self.session.brothel.total_slots();
        let hired_count = self.session.workers.len() as u32;
        if hired_count + quantity > total_slots {
            return Err(EngineError::CapacityConflict(format!(
                "requested {}, available {}",
                quantity,
                total_slots.saturating_sub(hired_count)
            )));
        }

        let (strategy, path) = self.gateway.strategy(ProcedureKind::HireWorkers);
        let receipt = strategy
            .hire_workers(self.player_id(), worker_id, quantity)
            .map_err(|e| Self::ledger_failure(e, path))?;
        self.session.workers.extend(receipt.hired.iter().cloned());
        self.session.brothel = receipt.brothel;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!(
            "Hired {} x {}.",
            quantity, worker.name
        )))
    }

    pub fn sell_workers(&mut self, worker_id: &str, quantity: u32) -> Result<Outcome, EngineError> {
        let worker = self
            .catalog
            .worker(worker_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "worker",
                id: worker_id.to_string(),
            })?
            .clone();
        let now = Utc::now();
        self.check_free(now)?;
        let have = self
            .session
            .workers
            .iter()
            .filter(|w| w.worker_id == worker_id)
            .count() as u32;
        if have < quantity {
            return Err(EngineError::Precondition(format!(
                "only {} {} on the roster",
                have, worker.name
            )));
        }

        let (strategy, path) = self.gateway.strategy(ProcedureKind::SellWorkers);
        let receipt = strategy
            .sell_workers(self.player_id(), worker_id, quantity)
            .map_err(|e| Self::ledger_failure(e, path))?;
        // Refresh the roster from the ledger so the removed instances match
        // exactly what the store removed.
        self.session.workers = self.ledger.hired_workers(self.player_id())?;
        self.session.brothel = receipt.brothel;
        let refund = receipt.refund;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!(
            "Sold {} x {} for ${}.",
            quantity, worker.name, refund
        )))
    }

    pub fn collect_brothel_income(&mut self) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        self.check_free(now)?;
        let (strategy, path) = self.gateway.strategy(ProcedureKind::BrothelIncome);
        let receipt = strategy
            .collect_brothel_income(self.player_id())
            .map_err(|e| Self::ledger_failure(e, path))?;
        self.session.brothel = receipt.brothel;
        let collected = receipt.collected;
        self.absorb_player(receipt.player, now);
        if collected > 0 {
            Ok(Outcome::success(format!("Collected ${}.", collected)))
        } else {
            Ok(Outcome::info("Nothing accrued yet.".to_string()))
        }
    }

    // --- skills, stamina, bonus ------------------------------------------

    pub fn skill_upgrade_cost(&self, skill: Skill) -> i64 {
        penalty::skill_upgrade_cost(self.session.player.skill_level(skill))
    }

    pub fn upgrade_skill(&mut self, skill: Skill) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        self.check_free(now)?;
        let level = self.session.player.skill_level(skill);
        if !penalty::skill_upgradeable(level) {
            return Err(EngineError::Precondition(format!(
                "{} is already at the cap",
                skill.label()
            )));
        }
        self.check_cash(penalty::skill_upgrade_cost(level))?;

        let (strategy, path) = self.gateway.strategy(ProcedureKind::SkillUpgrade);
        let receipt = strategy
            .upgrade_skill(self.player_id(), skill)
            .map_err(|e| Self::ledger_failure(e, path))?;
        let new_level = receipt.new_level;
        let cost = receipt.cost;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!(
            "{} is now {} (${} spent).",
            skill.label(),
            new_level,
            cost
        )))
    }

    pub fn refill_stamina(&mut self) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        let (strategy, path) = self.gateway.strategy(ProcedureKind::StaminaRefill);
        let receipt = strategy
            .refill_stamina(self.player_id())
            .map_err(|e| Self::ledger_failure(e, path))?;
        let gained = receipt.gained;
        self.absorb_player(receipt.player, now);
        if gained > 0 {
            Ok(Outcome::info(format!("Recovered {} stamina.", gained)))
        } else {
            Ok(Outcome::info("No stamina recovered yet.".to_string()))
        }
    }

    pub fn claim_daily_bonus(&mut self) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        let (strategy, path) = self.gateway.strategy(ProcedureKind::DailyBonus);
        let receipt = strategy
            .claim_daily_bonus(self.player_id())
            .map_err(|e| Self::ledger_failure(e, path))?;
        let amount = receipt.amount;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!("Daily bonus: ${}.", amount)))
    }

    // --- jail and hospital ------------------------------------------------

    /// Quote shown before paying; recomputed by the procedure at commit.
    pub fn bribe_preview(&self, now: DateTime<Utc>) -> Result<BribeQuote, EngineError> {
        match lifecycle::lifecycle_state(&self.session.player, now) {
            LifecycleState::Jailed { until } => Ok(penalty::bribe_quote(
                &self.session.player,
                lifecycle::remaining(until, now).num_minutes(),
            )),
            state => Err(EngineError::WrongLifecycle {
                state: state.label(),
            }),
        }
    }

    pub fn bribe_out(&mut self) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        let quote = self.bribe_preview(now)?;
        if self.session.player.total_wealth() < quote.amount {
            return Err(EngineError::InsufficientCash {
                need: quote.amount,
                have: self.session.player.total_wealth(),
            });
        }
        let (strategy, path) = self.gateway.strategy(ProcedureKind::JailBribe);
        let receipt = strategy
            .execute_jail_bribe(self.player_id())
            .map_err(|e| Self::ledger_failure(e, path))?;
        let paid = receipt.amount_paid;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!("Paid ${} and walked.", paid)))
    }

    pub fn use_jail_free_item(&mut self, item_id: &str) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        let state = lifecycle::lifecycle_state(&self.session.player, now);
        if !matches!(state, LifecycleState::Jailed { .. }) {
            return Err(EngineError::WrongLifecycle {
                state: state.label(),
            });
        }
        let held = self.session.inventory.get(item_id).copied().unwrap_or(0);
        if held == 0 {
            return Err(EngineError::MissingItems {
                item_id: item_id.to_string(),
                need: 1,
                have: 0,
            });
        }
        let receipt = self
            .gateway
            .direct()
            .use_jail_free_item(self.player_id(), item_id)
            .map_err(|e| Self::ledger_failure(e, MutationPath::DirectWrite))?;
        let left = held - 1;
        if left == 0 {
            self.session.inventory.remove(item_id);
        } else {
            self.session.inventory.insert(item_id.to_string(), left);
        }
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success("The charges evaporated.".to_string()))
    }

    pub fn emergency_recovery(&mut self) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        let state = lifecycle::lifecycle_state(&self.session.player, now);
        if !matches!(state, LifecycleState::Hospitalized { .. }) {
            return Err(EngineError::WrongLifecycle {
                state: state.label(),
            });
        }
        let receipt = self
            .gateway
            .direct()
            .emergency_recovery(self.player_id())
            .map_err(|e| Self::ledger_failure(e, MutationPath::DirectWrite))?;
        let fee = receipt.amount_paid;
        self.absorb_player(receipt.player, now);
        Ok(Outcome::success(format!(
            "Discharged early for ${}.",
            fee
        )))
    }

    // --- PvP --------------------------------------------------------------

    /// Win probability preview against a live opponent snapshot.
    pub fn preview_attack(&self, defender_id: &str) -> Result<f64, EngineError> {
        let defender = self.ledger.fetch_player(defender_id)?;
        let mine = combat::power_score(
            &self.session.player,
            self.catalog.equipment_bonus(&self.session.player),
        );
        let theirs = combat::power_score(&defender, self.catalog.equipment_bonus(&defender));
        Ok(combat::win_probability(mine, theirs))
    }

    pub fn attack(&mut self, defender_id: &str) -> Result<Outcome, EngineError> {
        let now = Utc::now();
        combat::check_attack_requirements(&self.session.player, now)?;
        let (strategy, path) = self.gateway.strategy(ProcedureKind::PvpAttack);
        let outcome = strategy
            .execute_pvp_attack(self.player_id(), defender_id)
            .map_err(|e| Self::ledger_failure(e, path))?;
        let won = outcome.attacker_won;
        let taken = outcome.cash_taken;
        self.absorb_player(outcome.attacker, now);
        if won {
            Ok(Outcome::success(format!(
                "You put them down and took ${}.",
                taken
            )))
        } else {
            Ok(Outcome::error(format!(
                "They put you down and took ${}.",
                taken
            )))
        }
    }

    pub fn online_players(&self) -> Result<Vec<PlayerSummary>, EngineError> {
        Ok(self.ledger.online_players(Utc::now())?)
    }

    // --- equipment --------------------------------------------------------

    pub fn equip_weapon(&mut self, item_id: &str) -> Result<Outcome, EngineError> {
        self.equip(item_id, true)
    }

    pub fn equip_gear(&mut self, item_id: &str) -> Result<Outcome, EngineError> {
        self.equip(item_id, false)
    }

    fn equip(&mut self, item_id: &str, weapon: bool) -> Result<Outcome, EngineError> {
        let item = self
            .catalog
            .item(item_id)
            .ok_or_else(|| EngineError::UnknownCatalogId {
                entity: "item",
                id: item_id.to_string(),
            })?;
        let kind_ok = match (&item.kind, weapon) {
            (ItemKind::Weapon { .. }, true) | (ItemKind::Gear { .. }, false) => true,
            _ => false,
        };
        if !kind_ok {
            return Err(EngineError::Precondition(format!(
                "{} cannot be equipped there",
                item.name
            )));
        }
        if self.session.inventory.get(item_id).copied().unwrap_or(0) == 0 {
            return Err(EngineError::MissingItems {
                item_id: item_id.to_string(),
                need: 1,
                have: 0,
            });
        }
        let now = Utc::now();
        // Only the reference changes; the bonus stays derived at read time.
        if weapon {
            self.session.player.equipped_weapon_id = Some(item_id.to_string());
        } else {
            self.session.player.equipped_gear_id = Some(item_id.to_string());
        }
        self.session.player.touch();
        self.ledger.put_player(&self.session.player)?;
        self.reconciler.mark_action(now);
        Ok(Outcome::success(format!("{} equipped.", item.name)))
    }

    // --- reconciliation and timers ---------------------------------------

    /// Merge one polled batch. The player record honors the guard window;
    /// independent collections always take the remote side.
    pub fn apply_poll(&mut self, update: PollUpdate, now: DateTime<Utc>) {
        match update {
            PollUpdate::Player(remote) => {
                let local = self.session.player.clone();
                let (merged, outcome) = self.reconciler.merge_player(local, remote, now);
                match outcome {
                    MergeOutcome::AppliedRemote => {
                        metrics::inc_polls_applied();
                        self.session.player = merged;
                        self.timers
                            .rebuild(&self.session.player, &self.session.productions, now);
                    }
                    MergeOutcome::KeptLocal => {
                        metrics::inc_polls_discarded();
                        log::debug!(
                            "discarded stale player poll for {} inside guard window",
                            self.player_id()
                        );
                    }
                }
            }
            PollUpdate::Inventory(remote) => {
                self.session.inventory = remote;
                metrics::inc_polls_applied();
            }
            PollUpdate::Holdings {
                businesses,
                productions,
                workers,
                brothel,
            } => {
                self.session.businesses = businesses;
                self.session.productions = productions;
                self.session.workers = workers;
                self.session.brothel = brothel;
                self.timers
                    .rebuild(&self.session.player, &self.session.productions, now);
                metrics::inc_polls_applied();
            }
            PollUpdate::Leaderboard(remote) => {
                self.session.leaderboard = remote;
                metrics::inc_polls_applied();
            }
        }
    }

    /// Display tick: drop expired countdowns and report the transitions the
    /// clock has already made true. State is derived from timestamps; the
    /// countdown expiring is only the occasion to look.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Outcome> {
        let mut events = Vec::new();
        for kind in self.timers.drain_expired(now) {
            match kind {
                CountdownKind::JailRelease => {
                    if !matches!(
                        lifecycle::lifecycle_state(&self.session.player, now),
                        LifecycleState::Jailed { .. }
                    ) {
                        events.push(Outcome::info("Released from jail.".to_string()));
                    }
                }
                CountdownKind::HospitalRelease => {
                    if !matches!(
                        lifecycle::lifecycle_state(&self.session.player, now),
                        LifecycleState::Hospitalized { .. }
                    ) {
                        events.push(Outcome::info("Discharged from the hospital.".to_string()));
                    }
                }
                CountdownKind::Production { business_id } => {
                    let ready = self
                        .session
                        .productions
                        .iter()
                        .any(|p| p.business_id == business_id && !p.collected && p.is_ready(now));
                    if ready {
                        let name = self
                            .catalog
                            .business(&business_id)
                            .map(|b| b.name.clone())
                            .unwrap_or(business_id);
                        events.push(Outcome::info(format!("{} is ready to collect.", name)));
                    }
                }
                CountdownKind::StaminaTick => {}
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SledLedgerBuilder;
    use tempfile::TempDir;

    fn simulator(dir: &TempDir) -> EconomySimulator {
        let store = SledLedgerBuilder::new(dir.path().join("ledger"))
            .with_roll_seed(7)
            .open()
            .expect("store");
        let mut config = Config::default();
        config.ledger.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        EconomySimulator::start(
            Arc::new(store),
            Arc::new(Catalog::standard()),
            config,
            "u1",
            "Vinny",
        )
        .expect("simulator")
    }

    #[test]
    fn preview_matches_roll_formula() {
        let dir = TempDir::new().expect("tempdir");
        let sim = simulator(&dir);
        let preview = sim.preview_crime("pickpocket").expect("preview");
        assert_eq!(
            preview.chance,
            penalty::success_chance(
                &sim.session().player,
                Catalog::standard().crime("pickpocket").unwrap()
            )
        );
    }

    #[test]
    fn attempt_writes_history_and_updates_session() {
        let dir = TempDir::new().expect("tempdir");
        let mut sim = simulator(&dir);
        let report = sim.attempt_crime("pickpocket").expect("attempt");
        assert_eq!(sim.session().player.total_robberies, 1);
        let history = sim.crime_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].success, report.success);
        // Stamina always spent.
        assert_eq!(sim.session().player.stamina, 50 - 2);
    }

    #[test]
    fn stale_player_poll_is_discarded_inside_guard() {
        let dir = TempDir::new().expect("tempdir");
        let mut sim = simulator(&dir);
        sim.attempt_crime("pickpocket").expect("attempt");
        let fresh_cash = sim.session().player.cash;

        // A snapshot fetched before the attempt committed.
        let mut stale = sim.session().player.clone();
        stale.cash = 999_999;
        stale.total_robberies = 0;
        sim.apply_poll(PollUpdate::Player(stale), Utc::now());
        assert_eq!(sim.session().player.cash, fresh_cash);
        assert_eq!(sim.session().player.total_robberies, 1);
    }

    #[test]
    fn inventory_polls_apply_even_inside_guard() {
        let dir = TempDir::new().expect("tempdir");
        let mut sim = simulator(&dir);
        sim.attempt_crime("pickpocket").expect("attempt");
        let mut remote = HashMap::new();
        remote.insert("gold_watch".to_string(), 2);
        sim.apply_poll(PollUpdate::Inventory(remote), Utc::now());
        assert_eq!(sim.session().inventory.get("gold_watch"), Some(&2));
    }

    #[test]
    fn equip_requires_owning_the_item() {
        let dir = TempDir::new().expect("tempdir");
        let mut sim = simulator(&dir);
        assert!(matches!(
            sim.equip_weapon("pistol"),
            Err(EngineError::MissingItems { .. })
        ));
        sim.session.inventory.insert("pistol".to_string(), 1);
        sim.equip_weapon("pistol").expect("equip");
        let view = sim.view(Utc::now());
        assert_eq!(view.power.bonus, 15);
        assert_eq!(view.power.base, 1);
        // Gear slot rejects weapons.
        assert!(sim.equip_gear("pistol").is_err());
    }

    #[test]
    fn fast_path_rejects_without_ledger_calls() {
        let dir = TempDir::new().expect("tempdir");
        let mut sim = simulator(&dir);
        sim.session.player.stamina = 0;
        let err = sim.attempt_crime("pickpocket").unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStamina { .. }));
        // Nothing was recorded.
        assert!(sim.crime_history().is_empty());
        assert_eq!(sim.session().player.total_robberies, 0);
    }

    #[test]
    fn bank_roundtrip_and_policy() {
        let dir = TempDir::new().expect("tempdir");
        let mut sim = simulator(&dir);
        sim.bank_deposit(100).expect("deposit");
        assert_eq!(sim.session().player.cash, 150);
        assert_eq!(sim.session().player.bank_balance, 100);
        sim.bank_withdraw(40).expect("withdraw");
        assert_eq!(sim.session().player.bank_balance, 60);
        assert!(matches!(
            sim.bank_withdraw(10_000),
            Err(EngineError::InsufficientBank { .. })
        ));
    }
}
