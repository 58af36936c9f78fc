//! Background authoritative refresh.
//!
//! The ledger is polled, not pushed from: one tokio task per collection
//! re-fetches on its own cadence and hands the snapshot to the session,
//! where the reconciler decides whether it lands. Cadences are tunables;
//! correctness never depends on them, only on the guard window.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::PollingConfig;
use crate::engine::simulator::{EconomySimulator, PollUpdate};
use crate::ledger::Ledger;

const LEADERBOARD_PAGE_SIZE: usize = 25;

/// Handles for the refresh tasks of one session. Aborted on drop.
pub struct Poller {
    handles: Vec<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn(
        simulator: Arc<Mutex<EconomySimulator>>,
        ledger: Arc<dyn Ledger>,
        polling: PollingConfig,
        player_id: String,
    ) -> Self {
        let mut handles = Vec::new();

        handles.push(spawn_loop(polling.player_secs, {
            let simulator = Arc::clone(&simulator);
            let ledger = Arc::clone(&ledger);
            let player_id = player_id.clone();
            move || match ledger.fetch_player(&player_id) {
                Ok(remote) => {
                    let mut sim = simulator.lock().expect("simulator lock poisoned");
                    sim.apply_poll(PollUpdate::Player(remote), Utc::now());
                }
                Err(e) => log::warn!("player poll failed for {}: {}", player_id, e),
            }
        }));

        handles.push(spawn_loop(polling.inventory_secs, {
            let simulator = Arc::clone(&simulator);
            let ledger = Arc::clone(&ledger);
            let player_id = player_id.clone();
            move || match ledger.inventory_by_player(&player_id) {
                Ok(remote) => {
                    let mut sim = simulator.lock().expect("simulator lock poisoned");
                    sim.apply_poll(PollUpdate::Inventory(remote), Utc::now());
                }
                Err(e) => log::warn!("inventory poll failed for {}: {}", player_id, e),
            }
        }));

        handles.push(spawn_loop(polling.catalog_secs, {
            let simulator = Arc::clone(&simulator);
            let ledger = Arc::clone(&ledger);
            let player_id = player_id.clone();
            move || {
                let holdings = (|| {
                    Ok::<PollUpdate, crate::ledger::LedgerError>(PollUpdate::Holdings {
                        businesses: ledger.owned_businesses(&player_id)?,
                        productions: ledger.productions(&player_id)?,
                        workers: ledger.hired_workers(&player_id)?,
                        brothel: ledger.brothel(&player_id)?,
                    })
                })();
                match holdings {
                    Ok(update) => {
                        let mut sim = simulator.lock().expect("simulator lock poisoned");
                        sim.apply_poll(update, Utc::now());
                    }
                    Err(e) => log::warn!("holdings poll failed for {}: {}", player_id, e),
                }
            }
        }));

        handles.push(spawn_loop(polling.leaderboard_secs, {
            let simulator = Arc::clone(&simulator);
            let ledger = Arc::clone(&ledger);
            move || match ledger.leaderboard_page(0, LEADERBOARD_PAGE_SIZE) {
                Ok(remote) => {
                    let mut sim = simulator.lock().expect("simulator lock poisoned");
                    sim.apply_poll(PollUpdate::Leaderboard(remote), Utc::now());
                }
                Err(e) => log::warn!("leaderboard poll failed: {}", e),
            }
        }));

        Self { handles }
    }

    pub fn stop(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_loop(secs: u64, mut poll: impl FnMut() + Send + 'static) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The immediate first tick warms the session right after spawn.
        loop {
            interval.tick().await;
            poll();
        }
    })
}
