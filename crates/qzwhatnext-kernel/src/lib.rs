//! qzWhatNext kernel — the pure core of the planner.
//!
//! Everything in this crate is deterministic and free of I/O: domain
//! models, the fixed 9-tier classifier, stack ranking, the greedy horizon
//! scheduler, and the recurrence subsystem (deterministic instruction
//! parser, occurrence enumeration, one-way RRULE export). Persistence,
//! the calendar gateway, and the HTTP surface live in the sibling crates.
//!
//! Functions that depend on "now" take it as an explicit argument (or a
//! [`clock::Clock`]) so that callers — and tests — control time.

// domain models
pub mod model;

// injectable time source
pub mod clock;

// error module
pub mod error;

// tiering / ranking / scheduling engine
pub mod engine;

// recurrence parser, occurrence enumeration, RRULE export
pub mod recurrence;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{KernelError, ParseError};
