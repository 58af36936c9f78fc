//! Business production: start, derived readiness, single collection,
//! conversion capping, upgrades.
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use thelife::catalog::Catalog;
use thelife::config::Config;
use thelife::engine::types::PendingReward;
use thelife::engine::{EconomySimulator, EngineError};
use thelife::ledger::{Ledger, ProductionInput, SledLedgerBuilder};

struct Fixture {
    ledger: Arc<dyn Ledger>,
    sim: EconomySimulator,
}

fn fixture(dir: &TempDir, level: u32, cash: i64) -> Fixture {
    let ledger: Arc<dyn Ledger> = Arc::new(
        SledLedgerBuilder::new(dir.path().join("ledger"))
            .open()
            .expect("store"),
    );
    let mut player = ledger.ensure_player("u1", "Vinny").unwrap();
    player.level = level;
    player.cash = cash;
    ledger.put_player(&player).unwrap();
    let mut config = Config::default();
    config.ledger.data_dir = dir.path().join("data").to_string_lossy().into_owned();
    let sim = EconomySimulator::start(
        Arc::clone(&ledger),
        Arc::new(Catalog::standard()),
        config,
        "u1",
        "Vinny",
    )
    .expect("simulator");
    Fixture { ledger, sim }
}

#[test]
fn collect_before_completion_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut f = fixture(&dir, 5, 50_000);
    f.sim.buy_business("hotdog_stand").expect("buy");
    f.sim.start_production("hotdog_stand", None).expect("start");

    assert!(matches!(
        f.sim.collect_production("hotdog_stand"),
        Err(EngineError::Precondition(_))
    ));
    // Starting again while a run is live is also rejected.
    assert!(f.sim.start_production("hotdog_stand", None).is_err());
}

#[test]
fn collect_exactly_once() {
    let dir = TempDir::new().expect("tempdir");
    let mut f = fixture(&dir, 5, 50_000);
    f.sim.buy_business("hotdog_stand").expect("buy");
    f.sim.start_production("hotdog_stand", None).expect("start");

    // Move the completion stamp into the past, then reload the session the
    // way a poll would.
    let mut production = f.ledger.productions("u1").unwrap().pop().unwrap();
    production.completed_at = Utc::now() - Duration::minutes(1);
    f.ledger.put_production(&production).unwrap();
    let mut sim = {
        let mut config = Config::default();
        config.ledger.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        EconomySimulator::start(
            Arc::clone(&f.ledger),
            Arc::new(Catalog::standard()),
            config,
            "u1",
            "Vinny",
        )
        .expect("simulator")
    };

    let cash_before = sim.session().player.cash;
    sim.collect_production("hotdog_stand").expect("collect");
    assert_eq!(sim.session().player.cash, cash_before + 260);

    // Second collection: rejected, no double reward, locally and in the
    // store.
    assert!(sim.collect_production("hotdog_stand").is_err());
    assert_eq!(f.ledger.fetch_player("u1").unwrap().cash, cash_before + 260);

    // A finished, collected run frees the slot for the next one.
    sim.start_production("hotdog_stand", None).expect("restart");
}

#[test]
fn conversion_business_caps_value_then_takes_the_fee() {
    let dir = TempDir::new().expect("tempdir");
    let mut f = fixture(&dir, 40, 500_000);
    f.ledger.put_inventory_entry("u1", "uncut_diamond", 5).unwrap();
    let mut sim = {
        let mut config = Config::default();
        config.ledger.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        EconomySimulator::start(
            Arc::clone(&f.ledger),
            Arc::new(Catalog::standard()),
            config,
            "u1",
            "Vinny",
        )
        .expect("simulator")
    };

    sim.buy_business("laundromat").expect("buy");
    // 5 diamonds = 30,000 raw value; the laundromat caps input at 20,000
    // and then takes its 25%: the pending reward is 15,000, not 22,500.
    sim.start_production(
        "laundromat",
        Some(ProductionInput {
            item_id: "uncut_diamond".to_string(),
            quantity: 5,
        }),
    )
    .expect("start");

    let production = f.ledger.productions("u1").unwrap().pop().unwrap();
    assert_eq!(production.reward, PendingReward::Cash { amount: 15_000 });
    // The input was consumed.
    assert!(f.ledger.inventory_by_player("u1").unwrap().is_empty());
}

#[test]
fn conversion_business_rejects_non_contraband_and_shortages() {
    let dir = TempDir::new().expect("tempdir");
    let mut f = fixture(&dir, 40, 500_000);
    f.sim.buy_business("laundromat").expect("buy");

    // Not holding enough.
    assert!(matches!(
        f.sim.start_production(
            "laundromat",
            Some(ProductionInput {
                item_id: "gold_watch".to_string(),
                quantity: 2,
            }),
        ),
        Err(EngineError::MissingItems { .. })
    ));
    // No input at all.
    assert!(f.sim.start_production("laundromat", None).is_err());
}

#[test]
fn item_reward_scales_with_upgrade_level() {
    let dir = TempDir::new().expect("tempdir");
    let mut f = fixture(&dir, 15, 5_000_000);
    f.sim.buy_business("grow_house").expect("buy");
    // 1 -> 2 costs 2x purchase, 2 -> 3 costs 2x1.8x.
    f.sim.upgrade_business("grow_house").expect("upgrade");
    f.sim.upgrade_business("grow_house").expect("upgrade");
    assert_eq!(
        f.sim
            .session()
            .businesses
            .iter()
            .find(|b| b.business_id == "grow_house")
            .unwrap()
            .upgrade_level,
        3
    );

    f.sim.start_production("grow_house", None).expect("start");
    let production = f.ledger.productions("u1").unwrap().pop().unwrap();
    // Base 4 packages x (1 + 2*0.5) = 8 at level 3.
    assert_eq!(
        production.reward,
        PendingReward::Items {
            item_id: "street_package".to_string(),
            quantity: 8
        }
    );
}

#[test]
fn purchase_requires_level_and_cash() {
    let dir = TempDir::new().expect("tempdir");
    let mut f = fixture(&dir, 1, 1_000);
    assert!(matches!(
        f.sim.buy_business("nightclub"),
        Err(EngineError::LevelTooLow { .. })
    ));
    assert!(matches!(
        f.sim.buy_business("hotdog_stand"),
        Err(EngineError::InsufficientCash { .. })
    ));
}
