//! The simulation core: data model, outcome formulas, lifecycle and
//! countdown machinery, the optimistic-merge reconciler, and the
//! session-scoped simulator that ties them to the ledger.

pub mod combat;
pub mod errors;
pub mod history;
pub mod lifecycle;
pub mod penalty;
pub mod poller;
pub mod reconciler;
pub mod simulator;
pub mod timers;
pub mod types;

pub use combat::{check_attack_requirements, power_score, win_probability};
pub use errors::{EngineError, ErrorCategory};
pub use history::{CrimeAttemptEntry, HistoryJournal};
pub use lifecycle::{lifecycle_state, LifecycleState};
pub use penalty::{
    bribe_quote, business_upgrade_cost, jail_minutes, skill_upgrade_cost, success_chance,
    BribeQuote,
};
pub use poller::Poller;
pub use reconciler::{merge_player, MergeOutcome, Reconciler};
pub use simulator::{
    CrimePreview, CrimeReport, EconomySimulator, PollUpdate, Session, SessionView,
};
pub use timers::{stamina_regen, Countdown, CountdownKind, DisplayTicker, TimerBoard};
pub use types::*;
