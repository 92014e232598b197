//! Recurrence subsystem: deterministic capture parsing, occurrence
//! enumeration, and one-way RRULE export.

pub mod occurrence;
pub mod parser;
pub mod rrule;

pub use occurrence::{
    choose_n_days_in_week, flexibility_window_for_day, next_occurrence, occurs_on_day,
};
pub use parser::{parse_capture_instruction, CaptureAction, ParsedCapture};
pub use rrule::preset_to_rrule;
