//! Procedure bodies shared by the atomic store and the fallback path.
//!
//! Each function validates against the records it is handed and mutates
//! them in place; the caller decides how those records were loaded and how
//! they get persisted. [`store::SledLedger`] runs these under its write
//! lock; [`gateway::DirectLedgerWrite`] re-reads fresh records immediately
//! before calling in and rejects when invariants no longer hold. Nothing
//! here performs IO.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::GameConfig;
use crate::engine::combat;
use crate::engine::lifecycle::{self, lifecycle_state, LifecycleState};
use crate::engine::penalty;
use crate::engine::timers::stamina_regen;
use crate::engine::types::{
    BrothelRecord, BusinessDef, BusinessReward, CrimeDef, HiredWorkerRecord, ItemEffect,
    ItemKind, OwnedBusinessRecord, PendingReward, PlayerRecord, ProductionCost,
    ProductionRecord, WorkerDef, MAX_BUSINESS_LEVEL, MAX_SKILL_LEVEL, PRODUCTION_SCHEMA_VERSION,
    WORKER_SCHEMA_VERSION,
};
use crate::engine::types::{Skill, TransferDirection};
use crate::ledger::{LedgerError, ProductionInput};

fn ensure_free(player: &PlayerRecord, now: DateTime<Utc>) -> Result<(), LedgerError> {
    match lifecycle_state(player, now) {
        LifecycleState::Free => Ok(()),
        state => Err(LedgerError::Rejected(format!(
            "player is {}",
            state.label()
        ))),
    }
}

/// Clear release timestamps that have passed. A completed hospital stay
/// also puts the player back on their feet at full HP. Returns true when
/// anything changed. Run at the top of every procedure so stored state
/// catches up with the clock-derived lifecycle.
pub fn sweep_releases(player: &mut PlayerRecord, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    if let Some(until) = player.jail_until {
        if now >= until {
            player.jail_until = None;
            changed = true;
        }
    }
    if let Some(until) = player.hospital_until {
        if now >= until {
            player.hospital_until = None;
            player.hp = player.max_hp;
            changed = true;
        }
    }
    changed
}

/// Outcome summary of a crime attempt; the caller attaches the updated
/// player record.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimeResolution {
    pub success: bool,
    pub reward: i64,
    pub xp_gained: i64,
    pub jail_minutes: i64,
    pub hospitalized: bool,
    pub drops: Vec<(String, u32)>,
    pub leveled_up: bool,
}

/// Resolve one crime attempt. Stamina is deducted no matter the outcome;
/// the roll uses the same chance formula shown in previews.
pub fn run_crime(
    player: &mut PlayerRecord,
    inventory: &mut HashMap<String, u32>,
    crime: &CrimeDef,
    game: &GameConfig,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<CrimeResolution, LedgerError> {
    ensure_free(player, now)?;
    if player.stamina < crime.stamina_cost {
        return Err(LedgerError::InsufficientStamina);
    }

    let chance = penalty::success_chance(player, crime);
    let roll: f64 = rng.gen_range(0.0..100.0);
    let success = penalty::is_success(roll, chance);

    player.stamina -= crime.stamina_cost;
    player.total_robberies += 1;

    let mut resolution = CrimeResolution {
        success,
        reward: 0,
        xp_gained: 0,
        jail_minutes: 0,
        hospitalized: false,
        drops: Vec::new(),
        leveled_up: false,
    };

    if success {
        let reward = if crime.max_reward > crime.base_reward {
            rng.gen_range(crime.base_reward..crime.max_reward)
        } else {
            crime.base_reward
        };
        player.cash += reward;
        player.xp += crime.xp_reward;
        player.successful_robberies += 1;
        resolution.reward = reward;
        resolution.xp_gained = crime.xp_reward;

        // Each drop is an independent roll.
        for drop in &crime.drops {
            let drop_roll: f64 = rng.gen_range(0.0..100.0);
            if drop_roll < drop.chance {
                let quantity = if drop.max_quantity > drop.min_quantity {
                    rng.gen_range(drop.min_quantity..=drop.max_quantity)
                } else {
                    drop.min_quantity
                };
                *inventory.entry(drop.item_id.clone()).or_insert(0) += quantity;
                resolution.drops.push((drop.item_id.clone(), quantity));
            }
        }
    } else {
        // The sentence is computed from the pre-damage state the chance was
        // quoted against, then the damage lands.
        let sentence = penalty::jail_minutes(player, crime);
        player.hp = (player.hp - crime.hp_loss_on_fail).max(0);
        if player.hp == 0 {
            lifecycle::send_to_hospital(player, game.hospital_stay_minutes, now);
            resolution.hospitalized = true;
        } else {
            lifecycle::send_to_jail(player, sentence, now);
            resolution.jail_minutes = sentence;
        }
        player.reset_daily_catches_if_stale(now);
        player.daily_catches += 1;
        let xp = crime.xp_reward / 2;
        player.xp += xp;
        resolution.xp_gained = xp;
    }

    resolution.leveled_up = player.check_level_up();
    player.touch();
    Ok(resolution)
}

/// Fails when the resulting cash would be negative.
pub fn adjust_cash(player: &mut PlayerRecord, delta: i64) -> Result<i64, LedgerError> {
    let new_cash = player.cash + delta;
    if new_cash < 0 {
        return Err(LedgerError::InsufficientFunds);
    }
    player.cash = new_cash;
    player.touch();
    Ok(new_cash)
}

pub fn bank_transfer(
    player: &mut PlayerRecord,
    amount: i64,
    direction: TransferDirection,
    game: &GameConfig,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::Rejected("amount must be positive".to_string()));
    }
    lifecycle::ensure_bank_allowed(player, now, game.allow_bank_while_jailed)
        .map_err(|e| LedgerError::Rejected(e.to_string()))?;
    match direction {
        TransferDirection::Deposit => {
            if player.cash < amount {
                return Err(LedgerError::InsufficientFunds);
            }
            player.cash -= amount;
            player.bank_balance += amount;
        }
        TransferDirection::Withdraw => {
            if player.bank_balance < amount {
                return Err(LedgerError::InsufficientFunds);
            }
            player.bank_balance -= amount;
            player.cash += amount;
        }
    }
    player.touch();
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PvpResolution {
    pub attacker_won: bool,
    pub cash_taken: i64,
}

/// Resolve one attack, mutating both fighters. The loser is zeroed and
/// hospitalized; the winner takes a cut of the loser's pocket cash.
pub fn run_pvp(
    attacker: &mut PlayerRecord,
    defender: &mut PlayerRecord,
    catalog: &Catalog,
    game: &GameConfig,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<PvpResolution, LedgerError> {
    combat::check_attack_requirements(attacker, now)
        .map_err(|e| LedgerError::Rejected(e.to_string()))?;
    if !lifecycle_state(defender, now).is_free() {
        return Err(LedgerError::Rejected(format!(
            "target is {}",
            lifecycle_state(defender, now).label()
        )));
    }

    attacker.stamina -= combat::ATTACK_MIN_STAMINA;

    let my_power = combat::power_score(attacker, catalog.equipment_bonus(attacker));
    let their_power = combat::power_score(defender, catalog.equipment_bonus(defender));
    let chance = combat::win_probability(my_power, their_power);
    let roll: f64 = rng.gen_range(0.0..100.0);
    let attacker_won = roll < chance;

    let (winner, loser) = if attacker_won {
        (&mut *attacker, &mut *defender)
    } else {
        (&mut *defender, &mut *attacker)
    };
    let cash_taken = loser.cash * game.pvp_steal_percent / 100;
    loser.cash -= cash_taken;
    winner.cash += cash_taken;
    loser.hp = 0;
    lifecycle::send_to_hospital(loser, game.hospital_stay_minutes, now);
    winner.pvp_wins += 1;
    loser.pvp_losses += 1;

    attacker.touch();
    defender.touch();
    Ok(PvpResolution {
        attacker_won,
        cash_taken,
    })
}

/// Pay the quoted bribe and walk. Cash is drained before the bank.
pub fn pay_bribe(player: &mut PlayerRecord, now: DateTime<Utc>) -> Result<i64, LedgerError> {
    let until = match lifecycle_state(player, now) {
        LifecycleState::Jailed { until } => until,
        state => {
            return Err(LedgerError::Rejected(format!(
                "not in jail (player is {})",
                state.label()
            )))
        }
    };
    let remaining = lifecycle::remaining(until, now).num_minutes();
    let quote = penalty::bribe_quote(player, remaining);
    if player.total_wealth() < quote.amount {
        return Err(LedgerError::InsufficientFunds);
    }
    let from_cash = quote.amount.min(player.cash);
    player.cash -= from_cash;
    player.bank_balance -= quote.amount - from_cash;
    lifecycle::release_from_jail(player);
    player.touch();
    Ok(quote.amount)
}

/// Consume a jail-free item and walk.
pub fn use_jail_free_item(
    player: &mut PlayerRecord,
    inventory: &mut HashMap<String, u32>,
    catalog: &Catalog,
    item_id: &str,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    if !matches!(lifecycle_state(player, now), LifecycleState::Jailed { .. }) {
        return Err(LedgerError::Rejected("not in jail".to_string()));
    }
    let item = catalog
        .item(item_id)
        .ok_or_else(|| LedgerError::NotFound(format!("item: {}", item_id)))?;
    if !matches!(
        item.kind,
        ItemKind::Consumable {
            effect: ItemEffect::JailFree
        }
    ) {
        return Err(LedgerError::Rejected(format!(
            "{} will not get anyone out of jail",
            item.name
        )));
    }
    let held = inventory.get(item_id).copied().unwrap_or(0);
    if held == 0 {
        return Err(LedgerError::Rejected(format!("no {} held", item.name)));
    }
    if held == 1 {
        inventory.remove(item_id);
    } else {
        inventory.insert(item_id.to_string(), held - 1);
    }
    lifecycle::release_from_jail(player);
    player.touch();
    Ok(())
}

/// Pay 15% of total wealth to leave the hospital early.
pub fn pay_emergency_recovery(
    player: &mut PlayerRecord,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    if !matches!(
        lifecycle_state(player, now),
        LifecycleState::Hospitalized { .. }
    ) {
        return Err(LedgerError::Rejected("not in the hospital".to_string()));
    }
    let fee = lifecycle::emergency_recovery_fee(player);
    let from_cash = fee.min(player.cash);
    player.cash -= from_cash;
    player.bank_balance -= fee - from_cash;
    lifecycle::release_from_hospital(player);
    player.hp = player.max_hp / 2;
    player.touch();
    Ok(fee)
}

pub fn upgrade_skill(
    player: &mut PlayerRecord,
    skill: Skill,
    now: DateTime<Utc>,
) -> Result<(u32, i64), LedgerError> {
    ensure_free(player, now)?;
    let level = player.skill_level(skill);
    if level >= MAX_SKILL_LEVEL {
        return Err(LedgerError::Rejected(format!(
            "{} is already at the cap",
            skill.label()
        )));
    }
    let cost = penalty::skill_upgrade_cost(level);
    if player.cash < cost {
        return Err(LedgerError::InsufficientFunds);
    }
    player.cash -= cost;
    player.set_skill_level(skill, level + 1);
    player.touch();
    Ok((level + 1, cost))
}

/// Regenerate stamina from elapsed real time. Never driven by tick counts.
pub fn refill_stamina(
    player: &mut PlayerRecord,
    game: &GameConfig,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    let regen = stamina_regen(
        player.stamina,
        player.max_stamina,
        player.last_stamina_refill,
        now,
        game.stamina_per_hour,
    );
    player.stamina = regen.new_stamina;
    player.last_stamina_refill = regen.new_last_refill;
    if regen.gained > 0 {
        player.touch();
    }
    Ok(regen.gained)
}

pub fn collect_brothel_income(
    player: &mut PlayerRecord,
    brothel: &mut BrothelRecord,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    ensure_free(player, now)?;
    let pending = brothel.pending_income(now);
    brothel.last_collection = now;
    if pending > 0 {
        player.cash += pending;
        player.touch();
    }
    Ok(pending)
}

pub fn claim_daily_bonus(
    player: &mut PlayerRecord,
    game: &GameConfig,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    if let Some(last) = player.last_daily_bonus {
        if last.date_naive() >= now.date_naive() {
            return Err(LedgerError::Rejected(
                "daily bonus already claimed today".to_string(),
            ));
        }
    }
    let amount = game.daily_bonus_base + player.level as i64 * game.daily_bonus_per_level;
    player.cash += amount;
    player.last_daily_bonus = Some(now);
    player.touch();
    Ok(amount)
}

/// Capacity-guarded hire. `current_count` must be read in the same atomic
/// section (or re-read immediately beforehand on the fallback path).
pub fn hire_workers(
    player: &mut PlayerRecord,
    brothel: &mut BrothelRecord,
    current_count: u32,
    worker: &WorkerDef,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<Vec<HiredWorkerRecord>, LedgerError> {
    ensure_free(player, now)?;
    if quantity == 0 {
        return Err(LedgerError::Rejected("quantity must be positive".to_string()));
    }
    if player.level < worker.min_level_required {
        return Err(LedgerError::Rejected(format!(
            "{} requires level {}",
            worker.name, worker.min_level_required
        )));
    }
    let total_slots = brothel.total_slots();
    if current_count + quantity > total_slots {
        return Err(LedgerError::CapacityExceeded {
            requested: quantity,
            available: total_slots.saturating_sub(current_count),
        });
    }
    let cost = worker.hire_cost * quantity as i64;
    if player.cash < cost {
        return Err(LedgerError::InsufficientFunds);
    }
    player.cash -= cost;
    brothel.income_per_hour += worker.income_per_hour * quantity as i64;
    let hired = (0..quantity)
        .map(|_| HiredWorkerRecord {
            instance_id: Uuid::new_v4().to_string(),
            player_id: player.id.clone(),
            worker_id: worker.id.clone(),
            hired_at: now,
            schema_version: WORKER_SCHEMA_VERSION,
        })
        .collect();
    player.touch();
    Ok(hired)
}

/// Mirror of hire: removes instances and decrements the income bookkeeping
/// by exactly the sold instances' contribution.
pub fn sell_workers(
    player: &mut PlayerRecord,
    brothel: &mut BrothelRecord,
    roster: &[HiredWorkerRecord],
    worker: &WorkerDef,
    quantity: u32,
    game: &GameConfig,
    now: DateTime<Utc>,
) -> Result<(Vec<String>, i64), LedgerError> {
    ensure_free(player, now)?;
    if quantity == 0 {
        return Err(LedgerError::Rejected("quantity must be positive".to_string()));
    }
    let matching: Vec<&HiredWorkerRecord> = roster
        .iter()
        .filter(|w| w.worker_id == worker.id)
        .collect();
    if (matching.len() as u32) < quantity {
        return Err(LedgerError::Rejected(format!(
            "only {} {} on the roster",
            matching.len(),
            worker.name
        )));
    }
    let removed: Vec<String> = matching
        .iter()
        .take(quantity as usize)
        .map(|w| w.instance_id.clone())
        .collect();
    let refund = worker.hire_cost * game.worker_sell_refund_percent / 100 * quantity as i64;
    brothel.income_per_hour -= worker.income_per_hour * quantity as i64;
    player.cash += refund;
    player.touch();
    Ok((removed, refund))
}

pub fn purchase_business(
    player: &mut PlayerRecord,
    owned: &[OwnedBusinessRecord],
    business: &BusinessDef,
    now: DateTime<Utc>,
) -> Result<OwnedBusinessRecord, LedgerError> {
    ensure_free(player, now)?;
    if owned.iter().any(|b| b.business_id == business.id) {
        return Err(LedgerError::Rejected(format!(
            "{} is already owned",
            business.name
        )));
    }
    if player.level < business.min_level_required {
        return Err(LedgerError::Rejected(format!(
            "{} requires level {}",
            business.name, business.min_level_required
        )));
    }
    if player.cash < business.purchase_price {
        return Err(LedgerError::InsufficientFunds);
    }
    player.cash -= business.purchase_price;
    player.touch();
    Ok(OwnedBusinessRecord::new(&player.id, &business.id, now))
}

/// Cash reward scaling by upgrade level.
pub fn scaled_cash_reward(profit: i64, upgrade_level: u8) -> i64 {
    (profit as f64 * (1.0 + (upgrade_level as f64 - 1.0) * 0.3)).floor() as i64
}

/// Item-quantity reward scaling by upgrade level.
pub fn scaled_item_reward(quantity: u32, upgrade_level: u8) -> u32 {
    (quantity as f64 * (1.0 + (upgrade_level as f64 - 1.0) * 0.5)).floor() as u32
}

/// Start a production run. The pending reward is fixed here; collection
/// only hands it over once the clock says so.
pub fn start_production(
    player: &mut PlayerRecord,
    inventory: &mut HashMap<String, u32>,
    owned: &OwnedBusinessRecord,
    existing: Option<&ProductionRecord>,
    business: &BusinessDef,
    catalog: &Catalog,
    input: Option<ProductionInput>,
    now: DateTime<Utc>,
) -> Result<ProductionRecord, LedgerError> {
    ensure_free(player, now)?;
    if let Some(running) = existing {
        if !running.collected {
            return Err(LedgerError::Rejected(format!(
                "{} already has a run going",
                business.name
            )));
        }
    }
    if player.stamina < business.stamina_cost {
        return Err(LedgerError::InsufficientStamina);
    }

    let reward = match (&business.cost, &business.reward) {
        (ProductionCost::Cash { amount }, reward) => {
            if player.cash < *amount {
                return Err(LedgerError::InsufficientFunds);
            }
            player.cash -= amount;
            match reward {
                BusinessReward::Cash { profit } => PendingReward::Cash {
                    amount: scaled_cash_reward(*profit, owned.upgrade_level),
                },
                BusinessReward::Items { item_id, quantity } => PendingReward::Items {
                    item_id: item_id.clone(),
                    quantity: scaled_item_reward(*quantity, owned.upgrade_level),
                },
                BusinessReward::ConvertedInput => {
                    return Err(LedgerError::Rejected(format!(
                        "{} needs goods, not cash",
                        business.name
                    )))
                }
            }
        }
        (ProductionCost::Contraband { max_input_value }, _) => {
            let input = input.ok_or_else(|| {
                LedgerError::Rejected(format!("{} needs goods to process", business.name))
            })?;
            if input.quantity == 0 {
                return Err(LedgerError::Rejected("quantity must be positive".to_string()));
            }
            let item = catalog
                .item(&input.item_id)
                .ok_or_else(|| LedgerError::NotFound(format!("item: {}", input.item_id)))?;
            if !item.is_contraband() {
                return Err(LedgerError::Rejected(format!(
                    "{} will not take {}",
                    business.name, item.name
                )));
            }
            let held = inventory.get(&input.item_id).copied().unwrap_or(0);
            if held < input.quantity {
                return Err(LedgerError::Rejected(format!(
                    "need {} x {}, have {}",
                    input.quantity, item.name, held
                )));
            }
            let remaining = held - input.quantity;
            if remaining == 0 {
                inventory.remove(&input.item_id);
            } else {
                inventory.insert(input.item_id.clone(), remaining);
            }
            // Cap the input value first, then take the fee off the cap.
            let raw_value = item.base_value * input.quantity as i64;
            let capped = raw_value.min(*max_input_value);
            let fee = business.conversion_rate.unwrap_or(0.0);
            PendingReward::Cash {
                amount: (capped as f64 * (1.0 - fee)).floor() as i64,
            }
        }
    };

    player.stamina -= business.stamina_cost;
    player.touch();
    Ok(ProductionRecord {
        player_id: player.id.clone(),
        business_id: business.id.clone(),
        started_at: now,
        completed_at: now + chrono::Duration::minutes(business.duration_minutes),
        reward,
        collected: false,
        schema_version: PRODUCTION_SCHEMA_VERSION,
    })
}

/// Hand over a finished run exactly once. The collected flag flips in the
/// same mutation as the reward grant.
pub fn collect_production(
    player: &mut PlayerRecord,
    inventory: &mut HashMap<String, u32>,
    production: &mut ProductionRecord,
    now: DateTime<Utc>,
) -> Result<PendingReward, LedgerError> {
    ensure_free(player, now)?;
    if production.collected {
        return Err(LedgerError::Rejected("already collected".to_string()));
    }
    if !production.is_ready(now) {
        return Err(LedgerError::Rejected("production still running".to_string()));
    }
    match &production.reward {
        PendingReward::Cash { amount } => {
            player.cash += amount;
        }
        PendingReward::Items { item_id, quantity } => {
            *inventory.entry(item_id.clone()).or_insert(0) += quantity;
        }
    }
    production.collected = true;
    player.touch();
    Ok(production.reward.clone())
}

pub fn upgrade_business(
    player: &mut PlayerRecord,
    owned: &mut OwnedBusinessRecord,
    business: &BusinessDef,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    ensure_free(player, now)?;
    if owned.upgrade_level >= MAX_BUSINESS_LEVEL {
        return Err(LedgerError::Rejected(format!(
            "{} is already fully upgraded",
            business.name
        )));
    }
    let cost = penalty::business_upgrade_cost(business.purchase_price, owned.upgrade_level)
        .expect("level below cap");
    if player.cash < cost {
        return Err(LedgerError::InsufficientFunds);
    }
    player.cash -= cost;
    owned.upgrade_level += 1;
    player.touch();
    Ok(cost)
}
