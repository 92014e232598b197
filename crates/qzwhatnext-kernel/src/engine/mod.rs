//! The tiering + ranking + scheduling engine.
//!
//! All functions here are pure: same inputs, same outputs, no I/O, no
//! hidden clock reads.

pub mod exclusion;
pub mod ranking;
pub mod scheduler;
pub mod tiering;

pub use exclusion::{is_ai_excluded, partition_ai_excluded};
pub use ranking::stack_rank;
pub use scheduler::{schedule_tasks, Horizon, ScheduleOutcome, SCHEDULING_GRANULARITY_MIN};
pub use tiering::assign_tier;
