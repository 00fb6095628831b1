//! Candidate scoring and selection

use common::types::{NodeId, PeerRecord, PeerStatus};

// -------------
// | Constants |
// -------------

/// The weight on a candidate's idle cpu share
const LOAD_WEIGHT: f64 = 0.30;
/// The weight on a candidate's free memory share
const MEM_WEIGHT: f64 = 0.20;
/// The weight on a candidate's reputation
const REP_WEIGHT: f64 = 0.35;
/// The weight on a candidate's beacon freshness
const FRESHNESS_WEIGHT: f64 = 0.15;
/// The age in seconds under which a beacon counts as fully fresh
const FRESHNESS_GRACE_S: f64 = 5.;
/// The decay applied per second of staleness past the grace window
const FRESHNESS_DECAY: f64 = 0.1;
/// The bonus granted to reputable candidates for high-priority tasks
const PRIORITY_BONUS: f64 = 0.10;
/// The priority at and above which the bonus may apply
const PRIORITY_BONUS_THRESHOLD: i32 = 8;
/// The reputation a candidate must exceed to earn the bonus
const REPUTATION_BONUS_THRESHOLD: f32 = 0.7;

// -----------
// | Scoring |
// -----------

/// Score a candidate for a task of the given priority
///
/// Higher is better. Returns `None` for ineligible candidates (anything not
/// Active), which can therefore never be selected.
pub fn score_candidate(record: &PeerRecord, priority: i32, now_ms: u64) -> Option<f64> {
    if record.status != PeerStatus::Active {
        return None;
    }

    let load_score = 1. - f64::from(record.cpu_load);
    let mem_score = 1. - f64::from(record.memory_usage);
    let rep_score = f64::from(record.reputation);

    let age = record.age_seconds(now_ms);
    let freshness = if age <= FRESHNESS_GRACE_S {
        1.
    } else {
        1. / (1. + FRESHNESS_DECAY * (age - FRESHNESS_GRACE_S))
    };

    let mut score = LOAD_WEIGHT * load_score
        + MEM_WEIGHT * mem_score
        + REP_WEIGHT * rep_score
        + FRESHNESS_WEIGHT * freshness;

    if priority >= PRIORITY_BONUS_THRESHOLD && record.reputation > REPUTATION_BONUS_THRESHOLD {
        score += PRIORITY_BONUS;
    }

    Some(score)
}

/// Select the best candidate from a registry snapshot, optionally excluding
/// one peer
///
/// The snapshot is in stable registry order and ties keep the earlier
/// candidate, so repeated selections over an unchanged registry agree. The
/// local node competes under the same formula as every peer.
pub fn select_best_node(
    snapshot: &[PeerRecord],
    priority: i32,
    exclude: Option<NodeId>,
    now_ms: u64,
) -> Option<NodeId> {
    let mut best: Option<(NodeId, f64)> = None;

    for record in snapshot {
        if exclude == Some(record.node_id) {
            continue;
        }

        let Some(score) = score_candidate(record, priority, now_ms) else {
            continue;
        };

        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((record.node_id, score)),
        }
    }

    best.map(|(node_id, _)| node_id)
}

#[cfg(test)]
mod test {
    use common::types::{NodeId, PeerRecord, PeerStatus};
    use util::get_current_time_millis;

    use super::{score_candidate, select_best_node};

    /// A fresh Active record with the given counters
    fn candidate(id: u64, cpu: f32, mem: f32, rep: f32) -> PeerRecord {
        PeerRecord {
            node_id: NodeId(id),
            host_name: format!("peer-{id}"),
            address: "192.168.1.10:8889".parse().unwrap(),
            cpu_load: cpu,
            memory_usage: mem,
            reputation: rep,
            tasks_completed: 0,
            tasks_failed: 0,
            status: PeerStatus::Active,
            last_seen: get_current_time_millis(),
            is_local: false,
        }
    }

    /// Tests the weighted sum against hand-computed values
    #[test]
    fn test_score_values() {
        let now = get_current_time_millis();

        // 0.30 * 0.9 + 0.20 * 0.9 + 0.35 * 0.9 + 0.15 * 1.0 = 0.915
        let strong = candidate(1, 0.1, 0.1, 0.9);
        let score = score_candidate(&strong, 5, now).unwrap();
        assert!((score - 0.915).abs() < 1e-6);

        // 0.30 * 0.1 + 0.20 * 0.1 + 0.35 * 0.5 + 0.15 * 1.0 = 0.375
        let weak = candidate(2, 0.9, 0.9, 0.5);
        let score = score_candidate(&weak, 5, now).unwrap();
        assert!((score - 0.375).abs() < 1e-6);
    }

    /// Tests the high-priority bonus gating on both priority and reputation
    #[test]
    fn test_priority_bonus() {
        let now = get_current_time_millis();
        let reputable = candidate(1, 0.1, 0.1, 0.9);
        let ordinary = candidate(2, 0.1, 0.1, 0.6);

        let base = score_candidate(&reputable, 7, now).unwrap();
        let boosted = score_candidate(&reputable, 8, now).unwrap();
        assert!((boosted - base - 0.10).abs() < 1e-6);

        // Reputation at or under the threshold earns no bonus
        let low_base = score_candidate(&ordinary, 7, now).unwrap();
        let low_high = score_candidate(&ordinary, 8, now).unwrap();
        assert!((low_high - low_base).abs() < 1e-6);
    }

    /// Tests the freshness decay past the grace window
    #[test]
    fn test_freshness_decay() {
        let now = get_current_time_millis();
        let mut stale = candidate(1, 0., 0., 0.5);
        stale.last_seen = now - 15_000;

        // age 15s: freshness = 1 / (1 + 0.1 * 10) = 0.5
        // 0.30 + 0.20 + 0.35 * 0.5 + 0.15 * 0.5 = 0.75
        let score = score_candidate(&stale, 5, now).unwrap();
        assert!((score - 0.75).abs() < 1e-6);
    }

    /// Tests that non-Active candidates can never be selected
    #[test]
    fn test_ineligible_statuses() {
        let now = get_current_time_millis();
        for status in [
            PeerStatus::Unknown,
            PeerStatus::Busy,
            PeerStatus::Failed,
            PeerStatus::Recovering,
        ] {
            let mut record = candidate(1, 0., 0., 1.);
            record.status = status;
            assert!(score_candidate(&record, 5, now).is_none());
        }
    }

    /// Tests selection between two scored candidates
    #[test]
    fn test_select_best() {
        let now = get_current_time_millis();
        let snapshot = vec![candidate(1, 0.1, 0.1, 0.9), candidate(2, 0.9, 0.9, 0.5)];

        assert_eq!(select_best_node(&snapshot, 5, None, now), Some(NodeId(1)));
        // Excluding the winner falls through to the runner-up
        assert_eq!(select_best_node(&snapshot, 5, Some(NodeId(1)), now), Some(NodeId(2)));
    }

    /// Tests that ties resolve to the earlier registry entry
    #[test]
    fn test_tie_breaks_stable() {
        let now = get_current_time_millis();
        let snapshot = vec![candidate(5, 0.2, 0.2, 0.8), candidate(3, 0.2, 0.2, 0.8)];
        assert_eq!(select_best_node(&snapshot, 5, None, now), Some(NodeId(5)));
    }

    /// Tests selection over an empty or fully ineligible snapshot
    #[test]
    fn test_no_candidates() {
        let now = get_current_time_millis();
        assert_eq!(select_best_node(&[], 5, None, now), None);

        let mut failed = candidate(1, 0., 0., 1.);
        failed.status = PeerStatus::Failed;
        assert_eq!(select_best_node(&[failed], 5, None, now), None);
    }
}
