//! Habit materialization — recurring series → concrete open tasks.
//!
//! Non-accumulating: a series never has more than one open occurrence.
//! Overdue open occurrences roll to `Missed` first, then the next
//! occurrence (and only the next) is created. Each insert is its own
//! transaction; the recurrence unique constraint makes reruns and
//! concurrent runs idempotent.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use qzwhatnext_foundation::persistence::{PersistenceError, SeriesStore, Store, TaskStore};
use qzwhatnext_kernel::model::{Task, TaskStatus};
use qzwhatnext_kernel::recurrence::{flexibility_window_for_day, next_occurrence};

use crate::error::RuntimeResult;

/// Create missing occurrences for `user_id` within
/// `[window_start, window_end)`. Returns the number created.
pub async fn materialize_recurring_tasks(
    store: &dyn Store,
    user_id: Uuid,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RuntimeResult<usize> {
    // Roll-forward: open occurrences whose window has already passed are
    // missed, not carried.
    let overdue = store
        .open_recurrence_tasks_before(user_id, window_start)
        .await?;
    for task in overdue {
        let missed = Task {
            status: TaskStatus::Missed,
            updated_at: now,
            ..task
        };
        if let Err(e) = store.update_task(&missed).await {
            // One bad row must not sink the pass.
            warn!(user_id = %user_id, task_id = %missed.id, error = %e, "failed to roll occurrence to missed");
        }
    }

    let series_rows = store.list_active_series(user_id).await?;
    let start_day = window_start.date_naive();
    let end_day = window_end.date_naive();

    let mut created = 0usize;
    for series in series_rows {
        // Habit: at most one open occurrence per series.
        let open = store.open_tasks_for_series(user_id, series.id).await?;
        if !open.is_empty() {
            continue;
        }

        let Some(day) = next_occurrence(&series.recurrence_preset, start_day, end_day) else {
            continue;
        };
        let occurrence_start = day.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();

        let window = series
            .recurrence_preset
            .time_of_day_window
            .map(|w| flexibility_window_for_day(day, w));

        let task = Task::new(user_id, "recurrence", series.title_template.clone(), now)
            .with_notes(series.notes_template.clone())
            .with_duration(series.estimated_duration_min_default)
            .with_category(series.category_default)
            .with_ai_excluded(series.ai_excluded)
            .with_flexibility_window(window)
            .with_recurrence(series.id, occurrence_start);

        match store.create_task(&task).await {
            Ok(()) => {
                debug!(user_id = %user_id, series_id = %series.id, day = %day, "materialized occurrence");
                created += 1;
            }
            // Lost a race with another pass; the constraint keeps us
            // idempotent.
            Err(PersistenceError::Constraint(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(created)
}
