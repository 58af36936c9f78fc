//! Minimal metrics scaffolding.
//! Process-local counters for operation volume and reconciliation health;
//! a later phase can export these through a metrics endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

static CRIME_ATTEMPTS: AtomicU64 = AtomicU64::new(0);
static CRIME_SUCCESSES: AtomicU64 = AtomicU64::new(0);
static POLLS_APPLIED: AtomicU64 = AtomicU64::new(0);
static POLLS_DISCARDED: AtomicU64 = AtomicU64::new(0);
static FALLBACK_WRITES: AtomicU64 = AtomicU64::new(0);
static PROCEDURE_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_crime_attempts() {
    CRIME_ATTEMPTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_crime_successes() {
    CRIME_SUCCESSES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_polls_applied() {
    POLLS_APPLIED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_polls_discarded() {
    POLLS_DISCARDED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_fallback_writes() {
    FALLBACK_WRITES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_procedure_failures() {
    PROCEDURE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub crime_attempts: u64,
    pub crime_successes: u64,
    pub polls_applied: u64,
    pub polls_discarded: u64,
    pub fallback_writes: u64,
    pub procedure_failures: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        crime_attempts: CRIME_ATTEMPTS.load(Ordering::Relaxed),
        crime_successes: CRIME_SUCCESSES.load(Ordering::Relaxed),
        polls_applied: POLLS_APPLIED.load(Ordering::Relaxed),
        polls_discarded: POLLS_DISCARDED.load(Ordering::Relaxed),
        fallback_writes: FALLBACK_WRITES.load(Ordering::Relaxed),
        procedure_failures: PROCEDURE_FAILURES.load(Ordering::Relaxed),
    }
}
