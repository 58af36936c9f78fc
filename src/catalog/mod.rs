//! Static game catalogs: crimes, businesses, workers, items.
//!
//! Catalog entries are immutable for the life of a session. The seed
//! functions below are the canonical content set; the ledger and the
//! simulator both resolve ids against the same `Catalog` so previews and
//! outcomes can never disagree about a definition.

use std::collections::HashMap;

use crate::engine::types::{
    BusinessDef, BusinessReward, CrimeDef, EquipmentBonus, ItemDef, ItemDrop, ItemEffect,
    ItemKind, PlayerRecord, ProductionCost, WorkerDef,
};

/// Indexed view over the seeded catalogs.
#[derive(Debug, Clone)]
pub struct Catalog {
    crimes: HashMap<String, CrimeDef>,
    businesses: HashMap<String, BusinessDef>,
    workers: HashMap<String, WorkerDef>,
    items: HashMap<String, ItemDef>,
}

impl Catalog {
    pub fn standard() -> Self {
        Self::from_parts(
            seed_crimes(),
            seed_businesses(),
            seed_workers(),
            seed_items(),
        )
    }

    pub fn from_parts(
        crimes: Vec<CrimeDef>,
        businesses: Vec<BusinessDef>,
        workers: Vec<WorkerDef>,
        items: Vec<ItemDef>,
    ) -> Self {
        Self {
            crimes: crimes.into_iter().map(|c| (c.id.clone(), c)).collect(),
            businesses: businesses.into_iter().map(|b| (b.id.clone(), b)).collect(),
            workers: workers.into_iter().map(|w| (w.id.clone(), w)).collect(),
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    pub fn crime(&self, id: &str) -> Option<&CrimeDef> {
        self.crimes.get(id)
    }

    pub fn business(&self, id: &str) -> Option<&BusinessDef> {
        self.businesses.get(id)
    }

    pub fn worker(&self, id: &str) -> Option<&WorkerDef> {
        self.workers.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&ItemDef> {
        self.items.get(id)
    }

    pub fn crimes(&self) -> impl Iterator<Item = &CrimeDef> {
        self.crimes.values()
    }

    pub fn businesses(&self) -> impl Iterator<Item = &BusinessDef> {
        self.businesses.values()
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerDef> {
        self.workers.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemDef> {
        self.items.values()
    }

    /// Derived stat bonuses from the player's equipped items. Recomputed on
    /// every read; the result is never written back into base stats.
    pub fn equipment_bonus(&self, player: &PlayerRecord) -> EquipmentBonus {
        let mut bonus = EquipmentBonus::default();
        if let Some(id) = &player.equipped_weapon_id {
            if let Some(ItemDef {
                kind: ItemKind::Weapon { power_bonus },
                ..
            }) = self.items.get(id)
            {
                bonus.power += power_bonus;
            }
        }
        if let Some(id) = &player.equipped_gear_id {
            if let Some(ItemDef {
                kind: ItemKind::Gear { defense_bonus },
                ..
            }) = self.items.get(id)
            {
                bonus.defense += defense_bonus;
            }
        }
        bonus
    }

    /// Contraband items the player holds in at least the given quantity;
    /// the qualifying set presented when a conversion business starts.
    pub fn qualifying_contraband<'a>(
        &'a self,
        inventory: &'a HashMap<String, u32>,
    ) -> Vec<(&'a ItemDef, u32)> {
        let mut matches: Vec<(&ItemDef, u32)> = inventory
            .iter()
            .filter(|(_, qty)| **qty > 0)
            .filter_map(|(id, qty)| self.items.get(id).map(|item| (item, *qty)))
            .filter(|(item, _)| item.is_contraband())
            .collect();
        matches.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        matches
    }
}

fn crime(
    id: &str,
    name: &str,
    min_level: u32,
    stamina: i64,
    rewards: (i64, i64),
    xp: i64,
    hp_loss: i64,
    jail: i64,
    rate: f64,
    drops: Vec<ItemDrop>,
) -> CrimeDef {
    CrimeDef {
        id: id.to_string(),
        name: name.to_string(),
        min_level_required: min_level,
        stamina_cost: stamina,
        base_reward: rewards.0,
        max_reward: rewards.1,
        xp_reward: xp,
        hp_loss_on_fail: hp_loss,
        jail_time_minutes: jail,
        success_rate: rate,
        drops,
    }
}

fn loot(item_id: &str, chance: f64, min_quantity: u32, max_quantity: u32) -> ItemDrop {
    ItemDrop {
        item_id: item_id.to_string(),
        chance,
        min_quantity,
        max_quantity,
    }
}

/// The crime board, cheapest first.
pub fn seed_crimes() -> Vec<CrimeDef> {
    vec![
        crime(
            "pickpocket",
            "Pickpocket a Tourist",
            1,
            2,
            (20, 80),
            10,
            5,
            10,
            70.0,
            vec![loot("stolen_wallet", 25.0, 1, 1)],
        ),
        crime(
            "shoplift",
            "Shoplift the Corner Store",
            3,
            3,
            (50, 160),
            16,
            8,
            15,
            62.0,
            vec![loot("stolen_phone", 15.0, 1, 2)],
        ),
        crime(
            "car_break_in",
            "Break Into a Parked Car",
            8,
            4,
            (120, 320),
            25,
            10,
            20,
            55.0,
            vec![loot("car_stereo", 20.0, 1, 1), loot("stolen_phone", 10.0, 1, 1)],
        ),
        crime(
            "mugging",
            "Mug a Late-Night Commuter",
            14,
            5,
            (250, 600),
            40,
            15,
            30,
            48.0,
            vec![loot("gold_watch", 12.0, 1, 1)],
        ),
        crime(
            "chop_shop_run",
            "Steal a Car for the Chop Shop",
            22,
            7,
            (600, 1_400),
            65,
            20,
            45,
            42.0,
            vec![loot("car_stereo", 35.0, 1, 2)],
        ),
        crime(
            "warehouse_job",
            "Hit a Dockside Warehouse",
            35,
            9,
            (1_500, 3_600),
            100,
            25,
            60,
            38.0,
            vec![loot("contraband_crate", 30.0, 1, 3), loot("gold_watch", 10.0, 1, 1)],
        ),
        crime(
            "jewelry_heist",
            "Rob the Jewelry Exchange",
            55,
            12,
            (4_000, 9_000),
            160,
            30,
            90,
            33.0,
            vec![loot("uncut_diamond", 18.0, 1, 2)],
        ),
        crime(
            "bank_job",
            "Crack the First National Vault",
            80,
            15,
            (10_000, 24_000),
            250,
            40,
            150,
            28.0,
            vec![loot("bearer_bond", 15.0, 1, 2), loot("uncut_diamond", 8.0, 1, 1)],
        ),
    ]
}

/// Businesses, from corner hustle to laundering front.
pub fn seed_businesses() -> Vec<BusinessDef> {
    vec![
        BusinessDef {
            id: "hotdog_stand".to_string(),
            name: "Hot Dog Stand".to_string(),
            purchase_price: 2_000,
            cost: ProductionCost::Cash { amount: 100 },
            stamina_cost: 2,
            duration_minutes: 30,
            reward: BusinessReward::Cash { profit: 260 },
            min_level_required: 2,
            conversion_rate: None,
        },
        BusinessDef {
            id: "grow_house".to_string(),
            name: "Basement Grow House".to_string(),
            purchase_price: 12_000,
            cost: ProductionCost::Cash { amount: 400 },
            stamina_cost: 4,
            duration_minutes: 120,
            reward: BusinessReward::Items {
                item_id: "street_package".to_string(),
                quantity: 4,
            },
            min_level_required: 12,
            conversion_rate: None,
        },
        BusinessDef {
            id: "chop_shop".to_string(),
            name: "Riverside Chop Shop".to_string(),
            purchase_price: 45_000,
            cost: ProductionCost::Cash { amount: 1_500 },
            stamina_cost: 6,
            duration_minutes: 240,
            reward: BusinessReward::Cash { profit: 5_200 },
            min_level_required: 25,
            conversion_rate: None,
        },
        BusinessDef {
            id: "laundromat".to_string(),
            name: "Spin City Laundromat".to_string(),
            purchase_price: 80_000,
            cost: ProductionCost::Contraband {
                max_input_value: 20_000,
            },
            stamina_cost: 5,
            duration_minutes: 180,
            reward: BusinessReward::ConvertedInput,
            min_level_required: 35,
            conversion_rate: Some(0.25),
        },
        BusinessDef {
            id: "nightclub".to_string(),
            name: "The Velvet Room".to_string(),
            purchase_price: 250_000,
            cost: ProductionCost::Cash { amount: 8_000 },
            stamina_cost: 8,
            duration_minutes: 480,
            reward: BusinessReward::Cash { profit: 30_000 },
            min_level_required: 50,
            conversion_rate: None,
        },
    ]
}

/// Hireable workers for the brothel roster.
pub fn seed_workers() -> Vec<WorkerDef> {
    vec![
        WorkerDef {
            id: "street_worker".to_string(),
            name: "Street Worker".to_string(),
            hire_cost: 1_000,
            income_per_hour: 60,
            min_level_required: 5,
        },
        WorkerDef {
            id: "escort".to_string(),
            name: "Escort".to_string(),
            hire_cost: 5_000,
            income_per_hour: 240,
            min_level_required: 15,
        },
        WorkerDef {
            id: "madam".to_string(),
            name: "Madam".to_string(),
            hire_cost: 20_000,
            income_per_hour: 800,
            min_level_required: 30,
        },
        WorkerDef {
            id: "fixer".to_string(),
            name: "Fixer".to_string(),
            hire_cost: 75_000,
            income_per_hour: 2_600,
            min_level_required: 50,
        },
    ]
}

fn item(id: &str, name: &str, kind: ItemKind, base_value: i64) -> ItemDef {
    ItemDef {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        base_value,
    }
}

/// Item catalog: equipment, contraband loot, and consumables.
pub fn seed_items() -> Vec<ItemDef> {
    vec![
        item("brass_knuckles", "Brass Knuckles", ItemKind::Weapon { power_bonus: 3 }, 800),
        item("switchblade", "Switchblade", ItemKind::Weapon { power_bonus: 7 }, 3_500),
        item("pistol", "9mm Pistol", ItemKind::Weapon { power_bonus: 15 }, 18_000),
        item("leather_jacket", "Leather Jacket", ItemKind::Gear { defense_bonus: 4 }, 1_200),
        item("kevlar_vest", "Kevlar Vest", ItemKind::Gear { defense_bonus: 12 }, 15_000),
        item("stolen_wallet", "Stolen Wallet", ItemKind::Contraband, 40),
        item("stolen_phone", "Stolen Phone", ItemKind::Contraband, 120),
        item("car_stereo", "Car Stereo", ItemKind::Contraband, 300),
        item("gold_watch", "Gold Watch", ItemKind::Contraband, 900),
        item("street_package", "Street Package", ItemKind::Contraband, 450),
        item("contraband_crate", "Contraband Crate", ItemKind::Contraband, 1_500),
        item("uncut_diamond", "Uncut Diamond", ItemKind::Contraband, 6_000),
        item("bearer_bond", "Bearer Bond", ItemKind::Contraband, 12_000),
        item(
            "crooked_lawyer",
            "Crooked Lawyer's Card",
            ItemKind::Consumable {
                effect: ItemEffect::JailFree,
            },
            25_000,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn seeded_ids_are_unique_and_resolvable() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.crimes().count(), seed_crimes().len());
        assert_eq!(catalog.businesses().count(), seed_businesses().len());
        assert_eq!(catalog.workers().count(), seed_workers().len());
        assert_eq!(catalog.items().count(), seed_items().len());
        assert!(catalog.crime("pickpocket").is_some());
        assert!(catalog.business("laundromat").is_some());
        assert!(catalog.worker("escort").is_some());
        assert!(catalog.item("kevlar_vest").is_some());
    }

    #[test]
    fn every_crime_drop_references_a_real_item() {
        let catalog = Catalog::standard();
        for crime in catalog.crimes() {
            for drop in &crime.drops {
                assert!(
                    catalog.item(&drop.item_id).is_some(),
                    "crime {} drops unknown item {}",
                    crime.id,
                    drop.item_id
                );
                assert!(drop.min_quantity <= drop.max_quantity);
                assert!((0.0..=100.0).contains(&drop.chance));
            }
        }
    }

    #[test]
    fn crime_reward_ranges_are_sane() {
        for crime in seed_crimes() {
            assert!(crime.base_reward < crime.max_reward, "{}", crime.id);
            assert!(crime.jail_time_minutes >= 5, "{}", crime.id);
            assert!((0.0..=100.0).contains(&crime.success_rate), "{}", crime.id);
        }
    }

    #[test]
    fn equipment_bonus_derives_from_equipped_ids() {
        let catalog = Catalog::standard();
        let mut player = PlayerRecord::new("u1", "Vinny", 0, Utc::now());
        assert_eq!(catalog.equipment_bonus(&player), EquipmentBonus::default());

        player.equipped_weapon_id = Some("pistol".to_string());
        player.equipped_gear_id = Some("kevlar_vest".to_string());
        let bonus = catalog.equipment_bonus(&player);
        assert_eq!(bonus.power, 15);
        assert_eq!(bonus.defense, 12);

        // Base stats are untouched by derivation.
        assert_eq!(player.power, 1);
        assert_eq!(player.defense, 1);
    }

    #[test]
    fn qualifying_contraband_filters_kind_and_quantity() {
        let catalog = Catalog::standard();
        let mut inventory = HashMap::new();
        inventory.insert("gold_watch".to_string(), 3);
        inventory.insert("kevlar_vest".to_string(), 1); // gear, not contraband
        inventory.insert("stolen_wallet".to_string(), 0); // empty entry

        let qualifying = catalog.qualifying_contraband(&inventory);
        assert_eq!(qualifying.len(), 1);
        assert_eq!(qualifying[0].0.id, "gold_watch");
        assert_eq!(qualifying[0].1, 3);
    }
}
