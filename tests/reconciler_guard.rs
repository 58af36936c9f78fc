//! The guard window keeps stale poll snapshots from clobbering fresh
//! optimistic mutations.
use chrono::{Duration, Utc};

use thelife::engine::types::PlayerRecord;
use thelife::engine::{merge_player, MergeOutcome, Reconciler};

fn player(cash: i64, robberies: u32) -> PlayerRecord {
    let mut p = PlayerRecord::new("u", "U", 0, Utc::now());
    p.cash = cash;
    p.total_robberies = robberies;
    p
}

#[test]
fn snapshot_fetched_before_the_action_loses_inside_the_window() {
    // Action commits at t0. A poll whose data was fetched at t0 - eps
    // arrives at t0 + delta with delta < 3000ms. The local record wins.
    let t0 = Utc::now();
    let guard = Duration::milliseconds(3_000);
    let post_action = player(900, 5);
    let stale_snapshot = player(1_000, 4);

    for delta_ms in [0i64, 500, 1_500, 2_999] {
        let (merged, outcome) = merge_player(
            post_action.clone(),
            stale_snapshot.clone(),
            Some(t0),
            t0 + Duration::milliseconds(delta_ms),
            guard,
        );
        assert_eq!(outcome, MergeOutcome::KeptLocal, "delta {}ms", delta_ms);
        assert_eq!(merged.cash, 900);
        assert_eq!(merged.total_robberies, 5);
    }
}

#[test]
fn snapshot_wins_once_the_window_closes() {
    let t0 = Utc::now();
    let guard = Duration::milliseconds(3_000);
    let (merged, outcome) = merge_player(
        player(900, 5),
        player(1_000, 4),
        Some(t0),
        t0 + Duration::milliseconds(3_000),
        guard,
    );
    assert_eq!(outcome, MergeOutcome::AppliedRemote);
    assert_eq!(merged.cash, 1_000);
}

#[test]
fn sessions_do_not_share_guard_state() {
    // Two independent sessions, one with a recent action. Only that one
    // discards the poll.
    let now = Utc::now();
    let mut busy = Reconciler::new(3_000);
    let idle = Reconciler::new(3_000);
    busy.mark_action(now);

    let (_, busy_outcome) = busy.merge_player(player(900, 1), player(1_000, 0), now);
    let (_, idle_outcome) = idle.merge_player(player(900, 1), player(1_000, 0), now);
    assert_eq!(busy_outcome, MergeOutcome::KeptLocal);
    assert_eq!(idle_outcome, MergeOutcome::AppliedRemote);
}

#[test]
fn each_new_action_reopens_the_window() {
    let t0 = Utc::now();
    let mut r = Reconciler::new(3_000);
    r.mark_action(t0);
    assert!(!r.within_guard(t0 + Duration::seconds(5)));
    r.mark_action(t0 + Duration::seconds(5));
    assert!(r.within_guard(t0 + Duration::seconds(6)));
}
