//! Greedy deterministic placement of ranked tasks into a bounded horizon.
//!
//! Tasks are split into blocks of at most [`SCHEDULING_GRANULARITY_MIN`]
//! minutes and laid down front-to-back, skipping reserved intervals.
//! Identical inputs produce byte-identical output, including block ids
//! (derived from the task id and block index).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::model::{ScheduledBlock, Task};

/// Minimum placement granularity, minutes.
pub const SCHEDULING_GRANULARITY_MIN: i64 = 30;

/// Default horizon length, days. Overridable via configuration.
pub const DEFAULT_HORIZON_DAYS: i64 = 7;

/// The half-open `[start, end)` range the scheduler may place into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Horizon {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Horizon of `days` days starting at `start`.
    pub fn days_from(start: DateTime<Utc>, days: i64) -> Self {
        Self {
            start,
            end: start + Duration::days(days),
        }
    }
}

/// Result of a scheduling pass.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    pub blocks: Vec<ScheduledBlock>,
    /// Tasks that did not fit in the horizon (or their flexibility
    /// window), in ranked order.
    pub overflow: Vec<Task>,
    pub start_time: Option<DateTime<Utc>>,
}

/// Place ranked tasks into the horizon.
///
/// `reservations` are `[start, end)` intervals the scheduler must not
/// overlap: external calendar events, locked blocks, recurring time
/// blocks. They may be unsorted and overlapping (overlaps behave as
/// their union); inverted or empty intervals are dropped silently.
///
/// `already_placed` holds ids of tasks with an active locked block;
/// those, and `manually_scheduled` tasks, are skipped.
pub fn schedule_tasks(
    ranked: &[Task],
    horizon: Horizon,
    reservations: &[(DateTime<Utc>, DateTime<Utc>)],
    already_placed: &HashSet<Uuid>,
) -> ScheduleOutcome {
    let reserved = normalize_reservations(reservations);

    let mut outcome = ScheduleOutcome {
        start_time: Some(horizon.start),
        ..Default::default()
    };

    let mut cursor = horizon.start;

    for task in ranked {
        if task.manually_scheduled || already_placed.contains(&task.id) {
            continue;
        }

        let duration_min = i64::from(task.estimated_duration_min.max(1));
        let blocks_needed = ((duration_min + SCHEDULING_GRANULARITY_MIN - 1) / SCHEDULING_GRANULARITY_MIN).max(1);
        let total_min = blocks_needed * SCHEDULING_GRANULARITY_MIN;

        // Earliest allowed start for this task.
        let mut task_start = cursor;
        if let Some(start_after) = task.start_after {
            let earliest = start_after
                .and_hms_opt(0, 0, 0)
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
                .unwrap_or(cursor);
            task_start = task_start.max(earliest);
        }
        if let Some(window) = task.flexibility_window {
            task_start = task_start.max(window.start);
        }

        // Quick reject: not even an unobstructed run fits.
        if task_start + Duration::minutes(total_min) > horizon.end {
            outcome.overflow.push(task.clone());
            continue;
        }

        // Tentatively emit, committing only if every block lands inside
        // the horizon (and the flexibility window, when present).
        let mut emitted: Vec<ScheduledBlock> = Vec::with_capacity(blocks_needed as usize);
        let mut t = task_start;
        let mut fits = true;

        for index in 0..blocks_needed as u32 {
            let block_min = SCHEDULING_GRANULARITY_MIN;
            t = next_available_time(t, block_min, &reserved);
            let block_end = t + Duration::minutes(block_min);

            if block_end > horizon.end {
                fits = false;
                break;
            }
            if let Some(window) = task.flexibility_window {
                if block_end > window.end {
                    fits = false;
                    break;
                }
            }

            emitted.push(ScheduledBlock::new_system(
                task.id, task.user_id, index, t, block_end,
            ));
            t = block_end;
        }

        if fits {
            cursor = t;
            outcome.blocks.extend(emitted);
        } else {
            // Overflow leaves the cursor untouched.
            outcome.overflow.push(task.clone());
        }
    }

    outcome
}

/// Drop invalid intervals and sort by start. Overlaps are kept; the
/// placement loop treats them as their union.
fn normalize_reservations(
    reservations: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut reserved: Vec<_> = reservations
        .iter()
        .copied()
        .filter(|(start, end)| end > start)
        .collect();
    reserved.sort_by_key(|&(start, _)| start);
    reserved
}

/// Earliest start at/after `t` where a `duration_min`-long block fits
/// without overlapping a reservation.
///
/// Inside a reservation the cursor jumps to its end; a candidate block
/// that would cross into a reservation jumps past that reservation.
fn next_available_time(
    mut t: DateTime<Utc>,
    duration_min: i64,
    reserved: &[(DateTime<Utc>, DateTime<Utc>)],
) -> DateTime<Utc> {
    if reserved.is_empty() {
        return t;
    }
    loop {
        let mut moved = false;
        let block_end = t + Duration::minutes(duration_min);
        for &(res_start, res_end) in reserved {
            // Already past this reservation.
            if res_end <= t {
                continue;
            }
            if res_start <= t && t < res_end {
                t = res_end;
                moved = true;
                break;
            }
            // Not enough gap before the reservation for this block.
            if t < res_start && block_end > res_start {
                t = res_end;
                moved = true;
                break;
            }
        }
        if !moved {
            return t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn task(minutes: u32) -> Task {
        Task::new(Uuid::new_v4(), "api", "t", at(0, 0)).with_duration(minutes)
    }

    #[test]
    fn single_task_starts_at_horizon_start() {
        let t = task(30);
        let out = schedule_tasks(
            &[t.clone()],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &HashSet::new(),
        );
        assert_eq!(out.blocks.len(), 1);
        assert!(out.overflow.is_empty());
        assert_eq!(out.blocks[0].entity_id, t.id);
        assert_eq!(out.blocks[0].start_time, at(10, 0));
        assert_eq!(out.blocks[0].end_time, at(10, 30));
    }

    #[test]
    fn long_task_splits_into_contiguous_blocks() {
        let t = task(90);
        let out = schedule_tasks(
            &[t.clone()],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &HashSet::new(),
        );
        assert_eq!(out.blocks.len(), 3);
        for pair in out.blocks.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
        let total: i64 = out.blocks.iter().map(|b| b.duration_min()).sum();
        assert_eq!(total, 90);
    }

    #[test]
    fn duration_rounds_up_to_granularity() {
        let t = task(40);
        let out = schedule_tasks(
            &[t],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &HashSet::new(),
        );
        // 40 minutes rounds up to two full 30-minute granules.
        assert_eq!(out.blocks.len(), 2);
        let total: i64 = out.blocks.iter().map(|b| b.duration_min()).sum();
        assert_eq!(total, 60);
        // Both blocks sit on the 30-minute grid relative to the horizon.
        assert_eq!(out.blocks[0].start_time, at(10, 0));
        assert_eq!(out.blocks[1].start_time, at(10, 30));
    }

    #[test]
    fn overflow_when_horizon_too_short() {
        // Horizon of 90 minutes, two 60-minute tasks: the second overflows.
        let t1 = task(60);
        let t2 = task(60);
        let horizon = Horizon::new(at(0, 0), at(1, 30));
        let out = schedule_tasks(&[t1.clone(), t2.clone()], horizon, &[], &HashSet::new());

        let t1_blocks: Vec<_> = out.blocks.iter().filter(|b| b.entity_id == t1.id).collect();
        assert_eq!(t1_blocks.len(), 2);
        assert_eq!(t1_blocks[0].start_time, at(0, 0));
        assert_eq!(t1_blocks[0].end_time, at(0, 30));
        assert_eq!(t1_blocks[1].end_time, at(1, 0));

        assert_eq!(out.overflow.len(), 1);
        assert_eq!(out.overflow[0].id, t2.id);
    }

    #[test]
    fn reservation_pushes_placement_past_it() {
        // Horizon [10:00, 12:00), reservation [10:15, 11:15), 60-minute
        // task: no 30-minute slot fits before the reservation, and the
        // second block would cross the horizon end.
        let t = task(60);
        let reservation = (at(10, 15), at(11, 15));
        let out = schedule_tasks(
            &[t.clone()],
            Horizon::new(at(10, 0), at(12, 0)),
            &[reservation],
            &HashSet::new(),
        );
        assert!(out.blocks.is_empty());
        assert_eq!(out.overflow.len(), 1);

        // With the horizon extended to 12:30 the task fits right after
        // the reservation.
        let out = schedule_tasks(
            &[t.clone()],
            Horizon::new(at(10, 0), at(12, 30)),
            &[reservation],
            &HashSet::new(),
        );
        let blocks: Vec<_> = out.blocks.iter().filter(|b| b.entity_id == t.id).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start_time, at(11, 15));
        assert_eq!(blocks[0].end_time, at(11, 45));
        assert_eq!(blocks[1].start_time, at(11, 45));
        assert_eq!(blocks[1].end_time, at(12, 15));
        assert!(out.overflow.is_empty());
    }

    #[test]
    fn inverted_and_empty_reservations_are_dropped() {
        let t = task(30);
        let out = schedule_tasks(
            &[t],
            Horizon::days_from(at(10, 0), 7),
            &[(at(11, 0), at(10, 0)), (at(10, 0), at(10, 0))],
            &HashSet::new(),
        );
        assert_eq!(out.blocks[0].start_time, at(10, 0));
    }

    #[test]
    fn overlapping_reservations_behave_as_union() {
        let t = task(30);
        let out = schedule_tasks(
            &[t],
            Horizon::days_from(at(10, 0), 7),
            &[(at(10, 0), at(11, 0)), (at(10, 30), at(11, 30))],
            &HashSet::new(),
        );
        assert_eq!(out.blocks[0].start_time, at(11, 30));
    }

    #[test]
    fn manually_scheduled_and_locked_tasks_are_skipped() {
        let mut manual = task(30);
        manual.manually_scheduled = true;
        let locked = task(30);
        let normal = task(30);

        let mut placed = HashSet::new();
        placed.insert(locked.id);

        let out = schedule_tasks(
            &[manual.clone(), locked.clone(), normal.clone()],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &placed,
        );
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].entity_id, normal.id);
        // The normal task takes the front of the horizon.
        assert_eq!(out.blocks[0].start_time, at(10, 0));
        assert!(out.overflow.is_empty());
    }

    #[test]
    fn start_after_is_a_lower_bound() {
        let t = task(30).with_start_after(Some(
            chrono::NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        ));
        let out = schedule_tasks(
            &[t],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &HashSet::new(),
        );
        assert_eq!(
            out.blocks[0].start_time,
            Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn flexibility_window_constrains_placement() {
        use crate::model::FlexibilityWindow;
        let window = FlexibilityWindow {
            start: at(14, 0),
            end: at(15, 0),
        };
        let fits = task(60).with_flexibility_window(Some(window));
        let out = schedule_tasks(
            &[fits.clone()],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &HashSet::new(),
        );
        assert_eq!(out.blocks[0].start_time, at(14, 0));
        assert_eq!(out.blocks.last().unwrap().end_time, at(15, 0));

        // A window too small for the task overflows it.
        let cramped = task(90).with_flexibility_window(Some(window));
        let out = schedule_tasks(
            &[cramped.clone()],
            Horizon::days_from(at(10, 0), 7),
            &[],
            &HashSet::new(),
        );
        assert!(out.blocks.is_empty());
        assert_eq!(out.overflow[0].id, cramped.id);
    }

    #[test]
    fn no_emitted_block_overlaps_a_reservation() {
        let tasks: Vec<Task> = (0..6).map(|_| task(45)).collect();
        let reservations = vec![
            (at(10, 0), at(10, 45)),
            (at(12, 0), at(13, 0)),
            (at(9, 0), at(9, 10)),
        ];
        let out = schedule_tasks(
            &tasks,
            Horizon::days_from(at(8, 0), 7),
            &reservations,
            &HashSet::new(),
        );
        for block in &out.blocks {
            for &(rs, re) in &reservations {
                assert!(
                    !(block.start_time < re && rs < block.end_time),
                    "block {:?} overlaps reservation ({rs}, {re})",
                    block
                );
            }
        }
        // And no two blocks overlap each other.
        for (i, a) in out.blocks.iter().enumerate() {
            for b in &out.blocks[i + 1..] {
                assert!(!a.overlaps(b.start_time, b.end_time));
            }
        }
    }

    #[test]
    fn identical_inputs_yield_identical_blocks() {
        let tasks: Vec<Task> = (0..5).map(|i| task(30 + i * 15)).collect();
        let reservations = vec![(at(11, 0), at(12, 0))];
        let horizon = Horizon::days_from(at(9, 0), 7);

        let a = schedule_tasks(&tasks, horizon, &reservations, &HashSet::new());
        let b = schedule_tasks(&tasks, horizon, &reservations, &HashSet::new());

        assert_eq!(a.blocks, b.blocks);
        let ids_a: Vec<_> = a.blocks.iter().map(|blk| blk.id).collect();
        let ids_b: Vec<_> = b.blocks.iter().map(|blk| blk.id).collect();
        assert_eq!(ids_a, ids_b);
    }
}
