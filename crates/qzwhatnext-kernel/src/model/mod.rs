//! Domain models shared across the workspace.
//!
//! Enum-valued fields serialize as narrow lowercase string codes at the
//! wire and database boundary; legacy codes are accepted on read and
//! current codes emitted on write.

pub mod block;
pub mod recurrence;
pub mod task;
pub mod user;

pub use block::{EntityType, ScheduledBlock, ScheduledBy};
pub use recurrence::{
    RecurFrequency, RecurrencePreset, RecurringTaskSeries, RecurringTimeBlock, TimeOfDayWindow,
    Weekday,
};
pub use task::{EnergyIntensity, FlexibilityWindow, Task, TaskCategory, TaskStatus};
pub use user::{OAuthToken, User, PRODUCT_CALENDAR, PROVIDER_GOOGLE};
