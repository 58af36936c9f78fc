//! Formula properties: chance bounds, jail bounds, worked examples.
use chrono::Utc;

use thelife::engine::types::{CrimeDef, PlayerRecord};
use thelife::engine::{bribe_quote, jail_minutes, success_chance};

fn crime(min_level: u32, success_rate: f64, jail: i64) -> CrimeDef {
    CrimeDef {
        id: "c".to_string(),
        name: "C".to_string(),
        min_level_required: min_level,
        stamina_cost: 1,
        base_reward: 10,
        max_reward: 20,
        xp_reward: 10,
        hp_loss_on_fail: 5,
        jail_time_minutes: jail,
        success_rate,
        drops: Vec::new(),
    }
}

fn player(level: u32) -> PlayerRecord {
    let mut p = PlayerRecord::new("u", "U", 0, Utc::now());
    p.level = level;
    p
}

#[test]
fn chance_bounded_for_pathological_inputs() {
    // level 1 against a level-200 requirement, hp 0, wealth 0.
    let mut p = player(1);
    p.hp = 0;
    let c = crime(200, 50.0, 60);
    let chance = success_chance(&p, &c);
    assert!((10.0..=85.0).contains(&chance));
    assert_eq!(chance, 10.0, "everything stacked against the player floors out");

    // Absurdly favorable inputs cap out at 85.
    let mut p = player(15);
    p.hp = p.max_hp;
    let c = crime(10, 99.0, 60);
    assert_eq!(success_chance(&p, &c), 85.0);
}

#[test]
fn chance_bounds_hold_across_a_grid() {
    for level in [1u32, 5, 20, 50, 120] {
        for min_level in [1u32, 10, 30, 60, 100, 150] {
            for rate in [0.0f64, 25.0, 50.0, 99.0] {
                for hp in [0i64, 30, 100] {
                    for catches in [0u32, 3, 20] {
                        for wealth in [0i64, 2_000_000, 900_000_000] {
                            let mut p = player(level);
                            p.hp = hp;
                            p.daily_catches = catches;
                            p.bank_balance = wealth;
                            let chance = success_chance(&p, &crime(min_level, rate, 30));
                            assert!(
                                (10.0..=85.0).contains(&chance),
                                "chance {} out of bounds (level {}, req {}, rate {})",
                                chance,
                                level,
                                min_level,
                                rate
                            );
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn worked_example_from_the_product_sheet() {
    // level 10, level-10 crime, full hp, no catches, no wealth, 50% base:
    // tier bonus +5 and nothing else.
    let p = player(10);
    let c = crime(10, 50.0, 30);
    assert_eq!(success_chance(&p, &c), 55.0);
}

#[test]
fn jail_minutes_bounds_hold_across_a_grid() {
    for level in [1u32, 10, 40, 90] {
        for min_level in [1u32, 25, 55, 90, 140] {
            for base in [5i64, 30, 120] {
                for hp in [0i64, 40, 100] {
                    for catches in [0u32, 10] {
                        let mut p = player(level);
                        p.hp = hp;
                        p.daily_catches = catches;
                        p.cash = 50_000_000;
                        let m = jail_minutes(&p, &crime(min_level, 50.0, base));
                        assert!(m >= 5, "sentence {} under floor", m);
                        assert!(
                            m <= 3 * base,
                            "sentence {} over 3x base {} (level {}, req {})",
                            m,
                            base,
                            level,
                            min_level
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn bribe_worked_example() {
    // cash 10000, no bank, 90 minutes remaining: 5 + 2*3 = 11% -> 1100.
    let mut p = player(10);
    p.cash = 10_000;
    let quote = bribe_quote(&p, 90);
    assert_eq!(quote.percentage, 11);
    assert_eq!(quote.amount, 1_100);
}
