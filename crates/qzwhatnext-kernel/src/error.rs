//! Crate-level error types for `qzwhatnext-kernel`.
//!
//! Pure functions in this crate never panic on bad input; they return
//! typed errors in-band. Each parse error carries a stable machine code
//! that the HTTP layer maps onto responses unchanged.

use thiserror::Error;

/// Structured error from the deterministic capture parser.
///
/// Identical input always yields the identical variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The instruction was empty or whitespace.
    #[error("instruction is required")]
    MissingInstruction,

    /// An hour or minute literal was out of range.
    #[error("invalid time")]
    InvalidTime,

    /// A time block was requested without a resolvable start time.
    #[error("time block needs a start time")]
    MissingTimeStart,

    /// A weekly time block was requested without any weekday.
    #[error("weekly time block needs a weekday")]
    MissingByWeekday,
}

impl ParseError {
    /// Stable code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::MissingInstruction => "PARSE_MISSING_FIELD",
            ParseError::InvalidTime => "PARSE_INVALID_TIME",
            ParseError::MissingTimeStart => "PARSE_MISSING_FIELD",
            ParseError::MissingByWeekday => "PARSE_MISSING_FIELD",
        }
    }

    /// Field names the instruction was missing, if any.
    pub fn missing(&self) -> &'static [&'static str] {
        match self {
            ParseError::MissingInstruction => &["instruction"],
            ParseError::MissingTimeStart => &["time_start"],
            ParseError::MissingByWeekday => &["by_weekday"],
            ParseError::InvalidTime => &[],
        }
    }
}

/// Crate-level error type for `qzwhatnext-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A capture instruction failed to parse.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A model-level validation failure (e.g. `until_date < start_date`).
    #[error("validation error: {0}")]
    Validation(String),
}

pub type KernelResult<T> = Result<T, KernelError>;
