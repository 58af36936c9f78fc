use thiserror::Error;

use crate::ledger::LedgerError;

/// Broad failure classes surfaced to the UI collaborator. Precondition and
/// conflict failures are clean rejections (no mutation happened); transient
/// ledger failures are generic "try again" messages and are never retried
/// automatically for money-moving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Precondition,
    Conflict,
    TransientLedger,
    FallbackPath,
}

/// Errors produced by the simulator and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Action requires more stamina than the player has.
    #[error("not enough stamina: need {need}, have {have}")]
    InsufficientStamina { need: i64, have: i64 },

    /// Action requires more pocket cash than the player has.
    #[error("not enough cash: need {need}, have {have}")]
    InsufficientCash { need: i64, have: i64 },

    /// Action requires more bank balance than the player has.
    #[error("not enough banked cash: need {need}, have {have}")]
    InsufficientBank { need: i64, have: i64 },

    /// Player level below the catalog entry's requirement.
    #[error("requires level {required}, player is level {actual}")]
    LevelTooLow { required: u32, actual: u32 },

    /// Action rejected because of the player's current lifecycle state.
    #[error("action unavailable while {state}")]
    WrongLifecycle { state: &'static str },

    /// Action needs items the player does not hold in sufficient quantity.
    #[error("missing items: need {need} x {item_id}, have {have}")]
    MissingItems {
        item_id: String,
        need: u32,
        have: u32,
    },

    /// Generic precondition failure that fits no structured variant.
    #[error("{0}")]
    Precondition(String),

    /// A capacity re-check against the ledger failed after the local check
    /// passed (two near-simultaneous hires). No partial mutation occurred.
    #[error("capacity conflict: {0}")]
    CapacityConflict(String),

    /// Another concurrent operation already consumed the target record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown catalog id passed in by the caller.
    #[error("unknown {entity}: {id}")]
    UnknownCatalogId { entity: &'static str, id: String },

    /// Store-level failure while reading or writing the ledger.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The direct read-modify-write path rejected the operation because
    /// invariants no longer held at write time.
    #[error("fallback write rejected: {0}")]
    FallbackRejected(String),
}

impl EngineError {
    /// Map a concrete error to its broad class.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::InsufficientStamina { .. }
            | EngineError::InsufficientCash { .. }
            | EngineError::InsufficientBank { .. }
            | EngineError::LevelTooLow { .. }
            | EngineError::WrongLifecycle { .. }
            | EngineError::MissingItems { .. }
            | EngineError::UnknownCatalogId { .. }
            | EngineError::Precondition(_) => ErrorCategory::Precondition,
            EngineError::CapacityConflict(_) | EngineError::Conflict(_) => ErrorCategory::Conflict,
            EngineError::Ledger(_) => ErrorCategory::TransientLedger,
            EngineError::FallbackRejected(_) => ErrorCategory::FallbackPath,
        }
    }
}
