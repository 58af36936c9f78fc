//! Merging authoritative poll snapshots into local working state.
//!
//! Every mutation stamps the session; a poll result that lands inside the
//! guard window after a stamp is discarded for the player record, because
//! the snapshot was fetched before the mutation committed and would clobber
//! the fresher optimistic copy. Independent collections (inventory,
//! leaderboard, catalogs) always take the remote side.

use chrono::{DateTime, Duration, Utc};

use crate::engine::types::PlayerRecord;

/// What the merge decided to do with a polled player record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    AppliedRemote,
    KeptLocal,
}

/// Pure merge: keep the local record when a local action happened less than
/// `guard` ago, otherwise accept the remote snapshot.
pub fn merge_player(
    local: PlayerRecord,
    remote: PlayerRecord,
    last_action_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    guard: Duration,
) -> (PlayerRecord, MergeOutcome) {
    if let Some(stamp) = last_action_at {
        if now.signed_duration_since(stamp) < guard {
            return (local, MergeOutcome::KeptLocal);
        }
    }
    (remote, MergeOutcome::AppliedRemote)
}

/// Per-session reconciliation state: the guard width and the stamp of the
/// most recent local mutation. Lives on the session object, never in a
/// module global, so independent sessions cannot shadow each other.
#[derive(Debug, Clone)]
pub struct Reconciler {
    guard: Duration,
    last_action_at: Option<DateTime<Utc>>,
}

impl Reconciler {
    pub fn new(guard_ms: i64) -> Self {
        Self {
            guard: Duration::milliseconds(guard_ms),
            last_action_at: None,
        }
    }

    /// Record that a mutating operation just committed.
    pub fn mark_action(&mut self, now: DateTime<Utc>) {
        self.last_action_at = Some(now);
    }

    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        self.last_action_at
    }

    /// True while polls for the player record must be discarded.
    pub fn within_guard(&self, now: DateTime<Utc>) -> bool {
        match self.last_action_at {
            Some(stamp) => now.signed_duration_since(stamp) < self.guard,
            None => false,
        }
    }

    /// Merge a polled player snapshot against the local working copy.
    pub fn merge_player(
        &self,
        local: PlayerRecord,
        remote: PlayerRecord,
        now: DateTime<Utc>,
    ) -> (PlayerRecord, MergeOutcome) {
        merge_player(local, remote, self.last_action_at, now, self.guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(cash: i64) -> PlayerRecord {
        let mut p = PlayerRecord::new("u1", "Vinny", 0, Utc::now());
        p.cash = cash;
        p
    }

    #[test]
    fn stale_poll_inside_guard_is_discarded() {
        // Action at t0; a snapshot fetched just before the action arrives
        // at t0 + delta with delta < guard. Local wins.
        let t0 = Utc::now();
        let local = player(900); // post-action optimistic state
        let remote = player(1_000); // pre-action snapshot

        let (merged, outcome) = merge_player(
            local.clone(),
            remote,
            Some(t0),
            t0 + Duration::milliseconds(1_500),
            Duration::milliseconds(3_000),
        );
        assert_eq!(outcome, MergeOutcome::KeptLocal);
        assert_eq!(merged.cash, 900);
    }

    #[test]
    fn poll_after_guard_expiry_is_applied() {
        let t0 = Utc::now();
        let local = player(900);
        let remote = player(1_000);

        let (merged, outcome) = merge_player(
            local,
            remote,
            Some(t0),
            t0 + Duration::milliseconds(3_000),
            Duration::milliseconds(3_000),
        );
        assert_eq!(outcome, MergeOutcome::AppliedRemote);
        assert_eq!(merged.cash, 1_000);
    }

    #[test]
    fn poll_with_no_prior_action_is_applied() {
        let now = Utc::now();
        let (merged, outcome) = merge_player(
            player(900),
            player(1_000),
            None,
            now,
            Duration::milliseconds(3_000),
        );
        assert_eq!(outcome, MergeOutcome::AppliedRemote);
        assert_eq!(merged.cash, 1_000);
    }

    #[test]
    fn reconciler_tracks_its_own_stamp() {
        let now = Utc::now();
        let mut r = Reconciler::new(3_000);
        assert!(!r.within_guard(now));

        r.mark_action(now);
        assert!(r.within_guard(now + Duration::milliseconds(2_999)));
        assert!(!r.within_guard(now + Duration::milliseconds(3_000)));

        let (merged, outcome) =
            r.merge_player(player(900), player(1_000), now + Duration::seconds(1));
        assert_eq!(outcome, MergeOutcome::KeptLocal);
        assert_eq!(merged.cash, 900);
    }
}
