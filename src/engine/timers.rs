//! Per-player countdowns and the display ticker.
//!
//! Countdowns exist for UI refresh only. The authoritative transition is
//! always re-derived by comparing `now` against the stored timestamp, so a
//! client that slept past a release computes the correct state on resume.
//! Stamina regeneration is likewise computed from elapsed wall-clock time,
//! never from tick counts.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::engine::types::{PlayerRecord, ProductionRecord};

/// What a countdown is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CountdownKind {
    JailRelease,
    HospitalRelease,
    Production { business_id: String },
    StaminaTick,
}

impl CountdownKind {
    pub fn label(&self) -> String {
        match self {
            CountdownKind::JailRelease => "jail release".to_string(),
            CountdownKind::HospitalRelease => "hospital release".to_string(),
            CountdownKind::Production { business_id } => {
                format!("production: {}", business_id)
            }
            CountdownKind::StaminaTick => "stamina".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub kind: CountdownKind,
    pub expires_at: DateTime<Utc>,
}

/// The set of countdowns for one session. At most one countdown per kind;
/// scheduling a kind again replaces the previous entry.
#[derive(Debug, Clone, Default)]
pub struct TimerBoard {
    countdowns: Vec<Countdown>,
}

impl TimerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: CountdownKind, expires_at: DateTime<Utc>) {
        self.cancel(&kind);
        self.countdowns.push(Countdown { kind, expires_at });
    }

    pub fn cancel(&mut self, kind: &CountdownKind) {
        self.countdowns.retain(|c| &c.kind != kind);
    }

    /// Remaining time for a kind, floored at zero. None when nothing of
    /// that kind is scheduled.
    pub fn remaining(&self, kind: &CountdownKind, now: DateTime<Utc>) -> Option<Duration> {
        self.countdowns.iter().find(|c| &c.kind == kind).map(|c| {
            let left = c.expires_at.signed_duration_since(now);
            if left < Duration::zero() {
                Duration::zero()
            } else {
                left
            }
        })
    }

    /// Remove and return every countdown whose timestamp has passed. The
    /// caller re-derives the real state from the record timestamps.
    pub fn drain_expired(&mut self, now: DateTime<Utc>) -> Vec<CountdownKind> {
        let (expired, live): (Vec<_>, Vec<_>) = self
            .countdowns
            .drain(..)
            .partition(|c| now >= c.expires_at);
        self.countdowns = live;
        expired.into_iter().map(|c| c.kind).collect()
    }

    /// Current countdowns with their remainders, for display.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<(CountdownKind, Duration)> {
        self.countdowns
            .iter()
            .map(|c| {
                let left = c.expires_at.signed_duration_since(now);
                let left = if left < Duration::zero() {
                    Duration::zero()
                } else {
                    left
                };
                (c.kind.clone(), left)
            })
            .collect()
    }

    /// Rebuild the board from authoritative state, e.g. after a poll merge
    /// or on session resume.
    pub fn rebuild(
        &mut self,
        player: &PlayerRecord,
        productions: &[ProductionRecord],
        now: DateTime<Utc>,
    ) {
        self.countdowns.clear();
        if let Some(until) = player.jail_until {
            if until > now {
                self.schedule(CountdownKind::JailRelease, until);
            }
        }
        if let Some(until) = player.hospital_until {
            if until > now {
                self.schedule(CountdownKind::HospitalRelease, until);
            }
        }
        for production in productions {
            if !production.collected && production.completed_at > now {
                self.schedule(
                    CountdownKind::Production {
                        business_id: production.business_id.clone(),
                    },
                    production.completed_at,
                );
            }
        }
    }
}

/// Result of a stamina regeneration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaminaRegen {
    pub gained: i64,
    pub new_stamina: i64,
    pub new_last_refill: DateTime<Utc>,
}

/// Compute regenerated stamina from elapsed real time at `per_hour`. The
/// refill timestamp only advances by the time actually converted into
/// stamina, so fractional progress is never lost between calls.
pub fn stamina_regen(
    current: i64,
    max: i64,
    last_refill: DateTime<Utc>,
    now: DateTime<Utc>,
    per_hour: i64,
) -> StaminaRegen {
    let elapsed = now.signed_duration_since(last_refill).num_seconds();
    if elapsed <= 0 || per_hour <= 0 || current >= max {
        return StaminaRegen {
            gained: 0,
            new_stamina: current,
            new_last_refill: if current >= max { now } else { last_refill },
        };
    }
    let earned = elapsed * per_hour / 3600;
    let gained = earned.min(max - current);
    if gained == 0 {
        return StaminaRegen {
            gained: 0,
            new_stamina: current,
            new_last_refill: last_refill,
        };
    }
    let consumed_seconds = gained * 3600 / per_hour;
    StaminaRegen {
        gained,
        new_stamina: current + gained,
        new_last_refill: last_refill + Duration::seconds(consumed_seconds),
    }
}

/// One-second display ticker. Emits the current wall-clock instant over an
/// unbounded channel; the receiver refreshes countdown remainders and runs
/// transition checks against the stored timestamps.
pub struct DisplayTicker {
    handle: tokio::task::JoinHandle<()>,
}

impl DisplayTicker {
    pub fn spawn() -> (Self, mpsc::UnboundedReceiver<DateTime<Utc>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(Utc::now()).is_err() {
                    break;
                }
            }
        });
        (Self { handle }, rx)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for DisplayTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
