//! AI exclusion enforcement.
//!
//! Certain tasks must never be sent to an AI service. This gate is
//! trust-critical: every inference call site consults it first, so an
//! excluded task never leaves the process for inference. Excluded tasks
//! are still scheduled deterministically.

use crate::model::Task;

/// A task is AI-excluded iff its title begins with `.` or it carries the
/// explicit flag.
pub fn is_ai_excluded(task: &Task) -> bool {
    task.title.starts_with('.') || task.ai_excluded
}

/// Split tasks into (allowed, excluded), preserving input order in both
/// partitions.
pub fn partition_ai_excluded(tasks: &[Task]) -> (Vec<&Task>, Vec<&Task>) {
    let mut allowed = Vec::new();
    let mut excluded = Vec::new();
    for task in tasks {
        if is_ai_excluded(task) {
            excluded.push(task);
        } else {
            allowed.push(task);
        }
    }
    (allowed, excluded)
}
