//! Attendance aggregation

use chrono::{DateTime, Local, TimeDelta};
use rollcall_api::{ParticipantVerdict, Snapshot};
use rollcall_util::ParticipantId;
use std::collections::{HashMap, HashSet};

/// Snapshot counts folded into verdicts
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub total_snapshots: usize,
    /// Instructors seen in any snapshot, in order of first appearance
    pub instructors_present: Vec<ParticipantId>,
    /// Everyone else, in order of first appearance
    pub verdicts: Vec<ParticipantVerdict>,
}

/// Fold snapshots into per-participant verdicts; `None` without snapshots.
///
/// A participant attended when `count / total >= minimum_rate`.
pub fn aggregate(
    snapshots: &[Snapshot],
    instructors: &[ParticipantId],
    minimum_rate: f64,
) -> Option<Aggregate> {
    if snapshots.is_empty() {
        return None;
    }

    let mut order = Vec::new();
    let mut counts: HashMap<ParticipantId, usize> = HashMap::new();
    for snapshot in snapshots {
        for id in snapshot.members() {
            let count = counts.entry(*id).or_insert_with(|| {
                order.push(*id);
                0
            });
            *count += 1;
        }
    }

    let total = snapshots.len();
    let mut instructors_present = Vec::new();
    let mut verdicts = Vec::new();

    for id in order {
        if instructors.contains(&id) {
            instructors_present.push(id);
            continue;
        }

        let attended_count = counts.get(&id).copied().unwrap_or(0);
        verdicts.push(ParticipantVerdict {
            participant: id,
            attended_count,
            attended: attended_count as f64 / total as f64 >= minimum_rate,
        });
    }

    Some(Aggregate {
        total_snapshots: total,
        instructors_present,
        verdicts,
    })
}

/// `now - total_snapshots * interval`; there are no per-snapshot timestamps
pub fn approximate_start(
    now: DateTime<Local>,
    total_snapshots: usize,
    interval_seconds: u64,
) -> DateTime<Local> {
    let seconds = (total_snapshots as i64).saturating_mul(interval_seconds as i64);
    TimeDelta::try_seconds(seconds)
        .and_then(|elapsed| now.checked_sub_signed(elapsed))
        .unwrap_or(now)
}

/// Distinct participants across all snapshots
pub fn participants_observed(snapshots: &[Snapshot]) -> usize {
    snapshots
        .iter()
        .flat_map(|s| s.members())
        .collect::<HashSet<_>>()
        .len()
}
