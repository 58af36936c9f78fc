//! Success-chance, jail-time, bribe, and upgrade-cost formulas.
//!
//! One implementation serves both the UI preview and the outcome roll, so
//! the number a player sees is exactly the number the roll is compared
//! against. All functions here are pure.

use crate::engine::types::{CrimeDef, PlayerRecord, MAX_BUSINESS_LEVEL, MAX_SKILL_LEVEL};

/// Lower and upper clamp for displayed/rolled success chance.
pub const MIN_SUCCESS_CHANCE: f64 = 10.0;
pub const MAX_SUCCESS_CHANCE: f64 = 85.0;

/// Jail stays never drop below this many minutes.
pub const MIN_JAIL_MINUTES: i64 = 5;

/// Wealth threshold above which the rich-player penalties kick in.
const WEALTH_PENALTY_FLOOR: f64 = 1_000_000.0;

/// Crime-tier bonus/penalty by required level bracket.
fn tier_chance_adjust(min_level_required: u32) -> f64 {
    match min_level_required {
        0..=10 => 5.0,
        11..=30 => 0.0,
        31..=60 => -3.0,
        61..=100 => -6.0,
        _ => -10.0,
    }
}

/// Crime-tier jail multiplier by required level bracket.
fn tier_jail_factor(min_level_required: u32) -> f64 {
    match min_level_required {
        0..=10 => 0.7,
        11..=30 => 1.0,
        31..=60 => 1.2,
        61..=100 => 1.4,
        _ => 1.7,
    }
}

/// Dynamic success chance for a player attempting a crime, in
/// [MIN_SUCCESS_CHANCE, MAX_SUCCESS_CHANCE].
pub fn success_chance(player: &PlayerRecord, crime: &CrimeDef) -> f64 {
    let mut chance = crime.success_rate;

    chance += tier_chance_adjust(crime.min_level_required);

    // Level difference: over-leveled players gain a capped edge, while
    // under-leveled players pay 5 points per missing level.
    let delta = player.level as f64 - crime.min_level_required as f64;
    if delta > 0.0 {
        chance += (2.0 * delta).min(10.0);
    } else if delta < 0.0 {
        chance += 5.0 * delta;
    }

    // Hurt players work worse.
    let hp_pct = player.hp_fraction();
    if hp_pct < 0.5 {
        chance -= (0.5 - hp_pct) * 20.0;
    }

    // Being caught repeatedly today draws heat.
    chance -= (3.0 * player.daily_catches as f64).min(15.0);

    // Wealthy players are watched more closely.
    let wealth = player.total_wealth() as f64;
    if wealth > WEALTH_PENALTY_FLOOR {
        let penalty = ((wealth / WEALTH_PENALTY_FLOOR).log10() + 1.0).floor().min(5.0);
        chance -= penalty;
    }

    // Notoriety past level 20.
    if player.level > 20 {
        let penalty = ((player.level - 20) as f64 * 0.1).floor().min(5.0);
        chance -= penalty;
    }

    chance.clamp(MIN_SUCCESS_CHANCE, MAX_SUCCESS_CHANCE)
}

/// Success/failure classification for a uniform roll in [0, 100). Kept
/// separate from the RNG so a fixed roll always classifies the same way.
pub fn is_success(roll: f64, chance: f64) -> bool {
    roll < chance
}

/// Jail sentence in minutes for a failed crime. Bounded by
/// [MIN_JAIL_MINUTES, 3 x the crime's base sentence].
pub fn jail_minutes(player: &PlayerRecord, crime: &CrimeDef) -> i64 {
    let mut multiplier = tier_jail_factor(crime.min_level_required);

    if player.level < crime.min_level_required {
        let deficit = (crime.min_level_required - player.level) as f64;
        multiplier += 0.3 * deficit;
    }

    let hp_pct = player.hp_fraction();
    if hp_pct < 0.5 {
        multiplier += (0.5 - hp_pct) * 0.5;
    }

    multiplier += (0.1 * player.daily_catches as f64).min(0.3);

    let wealth = player.total_wealth() as f64;
    if wealth > WEALTH_PENALTY_FLOOR {
        multiplier += ((wealth / WEALTH_PENALTY_FLOOR).log10() * 0.1).min(0.3);
    }

    if player.level > 30 {
        multiplier += ((player.level - 30) as f64 * 0.002).min(0.25);
    }

    let raw = (crime.jail_time_minutes as f64 * multiplier).floor() as i64;
    let hi = (3 * crime.jail_time_minutes).max(MIN_JAIL_MINUTES);
    raw.clamp(MIN_JAIL_MINUTES, hi)
}

/// A bribe quote: the percentage of total wealth demanded and the
/// resulting amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BribeQuote {
    pub percentage: i64,
    pub amount: i64,
}

/// Bribe demanded to walk out of jail early. The percentage scales with
/// remaining sentence; the amount never drops below 100.
pub fn bribe_quote(player: &PlayerRecord, remaining_jail_minutes: i64) -> BribeQuote {
    let percentage = (5 + 2 * (remaining_jail_minutes.max(0) / 30)).min(50);
    let amount = (player.total_wealth() * percentage / 100).max(100);
    BribeQuote { percentage, amount }
}

/// Cost to raise a skill from `level` to `level + 1`.
pub fn skill_upgrade_cost(level: u32) -> i64 {
    (500.0 * 1.15f64.powi(level as i32)).floor() as i64
}

/// Whether a skill can still be raised.
pub fn skill_upgradeable(level: u32) -> bool {
    level < MAX_SKILL_LEVEL
}

/// Cost to upgrade a business from `level` to `level + 1`, following the
/// generalized doubling curve. Returns None at the level cap.
pub fn business_upgrade_cost(purchase_price: i64, level: u8) -> Option<i64> {
    if level >= MAX_BUSINESS_LEVEL {
        return None;
    }
    let cost = purchase_price as f64 * 2.0 * 1.8f64.powi(level as i32 - 1);
    Some(cost.floor() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn crime(min_level: u32, success_rate: f64, jail: i64) -> CrimeDef {
        CrimeDef {
            id: "test".into(),
            name: "Test".into(),
            min_level_required: min_level,
            stamina_cost: 5,
            base_reward: 10,
            max_reward: 50,
            xp_reward: 20,
            hp_loss_on_fail: 10,
            jail_time_minutes: jail,
            success_rate,
            drops: Vec::new(),
        }
    }

    fn player(level: u32) -> PlayerRecord {
        let mut p = PlayerRecord::new("u1", "Vinny", 0, Utc::now());
        p.level = level;
        p
    }

    #[test]
    fn worked_example_level_ten() {
        // level 10 vs a level-10 crime at full HP, no catches, no wealth:
        // base 50 + tier 5, everything else zero.
        let p = player(10);
        let c = crime(10, 50.0, 30);
        assert_eq!(success_chance(&p, &c), 55.0);
    }

    #[test]
    fn chance_always_within_bounds() {
        // Pathological inputs from every direction.
        let mut broke_rookie = player(1);
        broke_rookie.hp = 0;
        let brutal = crime(200, 50.0, 60);
        let chance = success_chance(&broke_rookie, &brutal);
        assert!((MIN_SUCCESS_CHANCE..=MAX_SUCCESS_CHANCE).contains(&chance));

        let mut tycoon = player(90);
        tycoon.cash = 500_000_000;
        tycoon.bank_balance = 500_000_000;
        let trivial = crime(1, 99.0, 5);
        let chance = success_chance(&tycoon, &trivial);
        assert!((MIN_SUCCESS_CHANCE..=MAX_SUCCESS_CHANCE).contains(&chance));
    }

    #[test]
    fn over_level_bonus_caps_at_ten() {
        let p = player(30);
        let c = crime(5, 40.0, 30);
        // tier +5, over-level bonus capped at +10, level 30 -> notoriety
        // floor((30-20)*0.1) = 1.
        assert_eq!(success_chance(&p, &c), 40.0 + 5.0 + 10.0 - 1.0);
    }

    #[test]
    fn under_level_penalty_is_five_per_level() {
        let p = player(8);
        let c = crime(12, 60.0, 30);
        // tier (<=30) +0, delta -4 -> -20.
        assert_eq!(success_chance(&p, &c), 40.0);
    }

    #[test]
    fn low_hp_and_catches_reduce_chance() {
        let mut p = player(10);
        p.hp = 25; // 25% -> (0.5-0.25)*20 = 5 point penalty
        p.daily_catches = 2; // -6
        let c = crime(10, 50.0, 30);
        assert_eq!(success_chance(&p, &c), 55.0 - 5.0 - 6.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let p = player(10);
        let c = crime(10, 50.0, 30);
        let chance = success_chance(&p, &c);
        for _ in 0..3 {
            assert!(is_success(chance - 0.01, chance));
            assert!(!is_success(chance, chance));
            assert!(!is_success(chance + 0.01, chance));
        }
    }

    #[test]
    fn jail_minutes_respects_bounds() {
        let mut p = player(1);
        p.hp = 1;
        p.daily_catches = 50;
        p.cash = 2_000_000_000;
        let c = crime(150, 30.0, 60);
        let m = jail_minutes(&p, &c);
        assert!(m >= MIN_JAIL_MINUTES);
        assert!(m <= 3 * c.jail_time_minutes);

        let easy = crime(1, 90.0, 10);
        let veteran = player(100);
        let m = jail_minutes(&veteran, &easy);
        assert!((MIN_JAIL_MINUTES..=30).contains(&m));
    }

    #[test]
    fn jail_minutes_baseline_tiers() {
        let p = player(20);
        assert_eq!(jail_minutes(&p, &crime(20, 50.0, 30)), 30); // x1.0
        assert_eq!(jail_minutes(&p, &crime(5, 50.0, 30)), 21); // x0.7
    }

    #[test]
    fn worked_example_bribe() {
        let mut p = player(10);
        p.cash = 10_000;
        let quote = bribe_quote(&p, 90);
        assert_eq!(quote.percentage, 11);
        assert_eq!(quote.amount, 1_100);
    }

    #[test]
    fn bribe_amount_has_a_floor() {
        let p = player(1); // broke
        let quote = bribe_quote(&p, 15);
        assert_eq!(quote.percentage, 5);
        assert_eq!(quote.amount, 100);
    }

    #[test]
    fn bribe_percentage_caps_at_fifty() {
        let mut p = player(10);
        p.bank_balance = 1_000;
        let quote = bribe_quote(&p, 100_000);
        assert_eq!(quote.percentage, 50);
        assert_eq!(quote.amount, 500);
    }

    #[test]
    fn skill_cost_curve() {
        assert_eq!(skill_upgrade_cost(0), 500);
        assert_eq!(skill_upgrade_cost(1), 575);
        assert_eq!(skill_upgrade_cost(2), 661);
        assert!(skill_upgradeable(99));
        assert!(!skill_upgradeable(100));
    }

    #[test]
    fn business_upgrade_cost_curve() {
        assert_eq!(business_upgrade_cost(1_000, 1), Some(2_000));
        assert_eq!(business_upgrade_cost(1_000, 2), Some(3_600));
        assert_eq!(business_upgrade_cost(1_000, 3), Some(6_480));
        assert_eq!(business_upgrade_cost(1_000, MAX_BUSINESS_LEVEL), None);
    }
}
