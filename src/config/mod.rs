//! Configuration management.
//!
//! TOML-backed, type-safe configuration with defaults and validation.
//! Sections:
//!
//! - [`GameConfig`] - economy tunables (starting grant, regen rates, policy flags)
//! - [`LedgerConfig`] - where the local ledger and journals live
//! - [`PollingConfig`] - authoritative refresh cadences and the guard window
//! - [`LoggingConfig`] - log level
//!
//! Poll cadences trade staleness for ledger read cost; correctness only
//! requires the guard window to exceed the round-trip of a mutating call.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Economy tunables and product policy flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Cash granted when a player row is first created.
    #[serde(default = "default_starting_cash")]
    pub starting_cash: i64,
    /// Stamina regenerated per elapsed real hour.
    #[serde(default = "default_stamina_per_hour")]
    pub stamina_per_hour: i64,
    /// Hospital stay for knockouts, in minutes.
    #[serde(default = "default_hospital_minutes")]
    pub hospital_stay_minutes: i64,
    /// Whether bank transfers are allowed from jail.
    #[serde(default = "default_true")]
    pub allow_bank_while_jailed: bool,
    /// Flat part of the daily bonus.
    #[serde(default = "default_daily_bonus_base")]
    pub daily_bonus_base: i64,
    /// Per-level part of the daily bonus.
    #[serde(default = "default_daily_bonus_per_level")]
    pub daily_bonus_per_level: i64,
    /// Percentage of the loser's pocket cash taken by a PvP winner.
    #[serde(default = "default_pvp_steal_percent")]
    pub pvp_steal_percent: i64,
    /// Percentage of hire cost refunded when selling a worker.
    #[serde(default = "default_worker_refund_percent")]
    pub worker_sell_refund_percent: i64,
    /// Brothel slots every player starts with.
    #[serde(default = "default_worker_slots")]
    pub default_worker_slots: u32,
    /// How recently a player must have been active to count as online.
    #[serde(default = "default_online_window")]
    pub online_window_minutes: i64,
}

fn default_starting_cash() -> i64 {
    250
}
fn default_stamina_per_hour() -> i64 {
    10
}
fn default_hospital_minutes() -> i64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_daily_bonus_base() -> i64 {
    200
}
fn default_daily_bonus_per_level() -> i64 {
    25
}
fn default_pvp_steal_percent() -> i64 {
    10
}
fn default_worker_refund_percent() -> i64 {
    50
}
fn default_worker_slots() -> u32 {
    5
}
fn default_online_window() -> i64 {
    10
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_cash: default_starting_cash(),
            stamina_per_hour: default_stamina_per_hour(),
            hospital_stay_minutes: default_hospital_minutes(),
            allow_bank_while_jailed: default_true(),
            daily_bonus_base: default_daily_bonus_base(),
            daily_bonus_per_level: default_daily_bonus_per_level(),
            pvp_steal_percent: default_pvp_steal_percent(),
            worker_sell_refund_percent: default_worker_refund_percent(),
            default_worker_slots: default_worker_slots(),
            online_window_minutes: default_online_window(),
        }
    }
}

/// Local data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory for the sled store and the history journal.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Refresh cadences and the optimistic-mutation guard window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_player_poll")]
    pub player_secs: u64,
    #[serde(default = "default_inventory_poll")]
    pub inventory_secs: u64,
    #[serde(default = "default_catalog_poll")]
    pub catalog_secs: u64,
    #[serde(default = "default_leaderboard_poll")]
    pub leaderboard_secs: u64,
    /// Poll results for the player record arriving within this window after
    /// a local mutation are discarded.
    #[serde(default = "default_guard_window_ms")]
    pub guard_window_ms: i64,
}

fn default_player_poll() -> u64 {
    15
}
fn default_inventory_poll() -> u64 {
    10
}
fn default_catalog_poll() -> u64 {
    60
}
fn default_leaderboard_poll() -> u64 {
    30
}
fn default_guard_window_ms() -> i64 {
    3_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            player_secs: default_player_poll(),
            inventory_secs: default_inventory_poll(),
            catalog_secs: default_catalog_poll(),
            leaderboard_secs: default_leaderboard_poll(),
            guard_window_ms: default_guard_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate a configuration file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("failed to read config {}: {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("failed to parse config {}: {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Write a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)?;
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("failed to write config {}: {}", path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.game.starting_cash < 0 {
            return Err(anyhow!("game.starting_cash must be non-negative"));
        }
        if self.game.stamina_per_hour <= 0 {
            return Err(anyhow!("game.stamina_per_hour must be positive"));
        }
        if self.game.hospital_stay_minutes <= 0 {
            return Err(anyhow!("game.hospital_stay_minutes must be positive"));
        }
        if !(0..=100).contains(&self.game.pvp_steal_percent) {
            return Err(anyhow!("game.pvp_steal_percent must be within 0-100"));
        }
        if !(0..=100).contains(&self.game.worker_sell_refund_percent) {
            return Err(anyhow!(
                "game.worker_sell_refund_percent must be within 0-100"
            ));
        }
        if self.game.default_worker_slots == 0 {
            return Err(anyhow!("game.default_worker_slots must be at least 1"));
        }
        if self.polling.guard_window_ms < 0 {
            return Err(anyhow!("polling.guard_window_ms must be non-negative"));
        }
        for (name, secs) in [
            ("polling.player_secs", self.polling.player_secs),
            ("polling.inventory_secs", self.polling.inventory_secs),
            ("polling.catalog_secs", self.polling.catalog_secs),
            ("polling.leaderboard_secs", self.polling.leaderboard_secs),
        ] {
            if secs == 0 {
                return Err(anyhow!("{} must be positive", name));
            }
        }
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(anyhow!("logging.level '{}' is not a valid level", other)),
        }
    }
}
