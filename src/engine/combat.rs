//! PvP power scores and win probability.
//!
//! Only the preview lives here. The actual outcome roll, the cash steal,
//! and the HP zeroing happen inside a server-validated ledger procedure so
//! a doctored client cannot decide its own fights.

use chrono::{DateTime, Utc};

use crate::engine::errors::EngineError;
use crate::engine::lifecycle::{lifecycle_state, LifecycleState};
use crate::engine::types::{EquipmentBonus, PlayerRecord};

/// Minimum stamina to start an attack.
pub const ATTACK_MIN_STAMINA: i64 = 3;
/// Minimum HP to start an attack.
pub const ATTACK_MIN_HP: i64 = 20;

/// Displayed win probability is clamped into this band so no fight ever
/// reads as a certainty.
pub const MIN_WIN_CHANCE: f64 = 5.0;
pub const MAX_WIN_CHANCE: f64 = 95.0;

/// Combat power score. Equipment bonuses count here because they are part
/// of the player's effective stats; they are still never persisted.
pub fn power_score(player: &PlayerRecord, bonus: EquipmentBonus) -> f64 {
    let power = (player.power + bonus.power) as f64;
    let intelligence = player.intelligence as f64;
    let defense = (player.defense + bonus.defense) as f64;
    let base = power * 2.0 + intelligence * 1.5 + defense + player.level as f64 * 10.0;

    let hp_pct = player.hp_fraction();
    let hp_multiplier = if hp_pct < 0.5 { hp_pct * 2.0 } else { 1.0 };
    base * hp_multiplier
}

/// Win probability shown to the attacker, in [MIN_WIN_CHANCE, MAX_WIN_CHANCE].
pub fn win_probability(my_power: f64, their_power: f64) -> f64 {
    let total = my_power + their_power;
    if total <= 0.0 {
        return 50.0;
    }
    (my_power / total * 100.0).clamp(MIN_WIN_CHANCE, MAX_WIN_CHANCE)
}

/// Local precondition check before an attack is sent to the ledger.
/// Incarcerated players cannot start fights from either institution.
pub fn check_attack_requirements(
    attacker: &PlayerRecord,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    match lifecycle_state(attacker, now) {
        LifecycleState::Free => {}
        state => {
            return Err(EngineError::WrongLifecycle {
                state: state.label(),
            })
        }
    }
    if attacker.stamina < ATTACK_MIN_STAMINA {
        return Err(EngineError::InsufficientStamina {
            need: ATTACK_MIN_STAMINA,
            have: attacker.stamina,
        });
    }
    if attacker.hp < ATTACK_MIN_HP {
        return Err(EngineError::Precondition(format!(
            "too hurt to fight: need {} HP, have {}",
            ATTACK_MIN_HP, attacker.hp
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lifecycle::send_to_hospital;

    fn fighter(level: u32, power: u32, intelligence: u32, defense: u32) -> PlayerRecord {
        let mut p = PlayerRecord::new("u1", "Vinny", 0, Utc::now());
        p.level = level;
        p.power = power;
        p.intelligence = intelligence;
        p.defense = defense;
        p
    }

    #[test]
    fn power_formula() {
        let p = fighter(5, 10, 4, 6);
        // 10*2 + 4*1.5 + 6 + 5*10 = 82 at full HP.
        assert_eq!(power_score(&p, EquipmentBonus::default()), 82.0);
    }

    #[test]
    fn equipment_bonus_counts_toward_power() {
        let p = fighter(5, 10, 4, 6);
        let armed = power_score(
            &p,
            EquipmentBonus {
                power: 5,
                defense: 3,
            },
        );
        // +5 power doubles, +3 defense is flat.
        assert_eq!(armed, 82.0 + 10.0 + 3.0);
    }

    #[test]
    fn low_hp_halves_and_below() {
        let mut p = fighter(5, 10, 4, 6);
        p.hp = 25; // 25% -> multiplier 0.5
        assert_eq!(power_score(&p, EquipmentBonus::default()), 41.0);
        p.hp = 50; // exactly 50% -> full power
        assert_eq!(power_score(&p, EquipmentBonus::default()), 82.0);
    }

    #[test]
    fn win_probability_is_clamped() {
        assert_eq!(win_probability(1.0, 10_000.0), MIN_WIN_CHANCE);
        assert_eq!(win_probability(10_000.0, 1.0), MAX_WIN_CHANCE);
        assert_eq!(win_probability(100.0, 100.0), 50.0);
        assert_eq!(win_probability(0.0, 0.0), 50.0);
    }

    #[test]
    fn attack_requirements() {
        let now = Utc::now();
        let mut p = fighter(5, 10, 4, 6);
        assert!(check_attack_requirements(&p, now).is_ok());

        p.stamina = 2;
        assert!(matches!(
            check_attack_requirements(&p, now),
            Err(EngineError::InsufficientStamina { .. })
        ));

        p.stamina = 50;
        p.hp = 19;
        assert!(check_attack_requirements(&p, now).is_err());

        p.hp = 100;
        send_to_hospital(&mut p, 30, now);
        assert!(matches!(
            check_attack_requirements(&p, now),
            Err(EngineError::WrongLifecycle { .. })
        ));
    }
}
