//! Runtime error type with the stable codes the HTTP layer surfaces.

use thiserror::Error;

use qzwhatnext_foundation::calendar::CalendarError;
use qzwhatnext_foundation::persistence::PersistenceError;
use qzwhatnext_foundation::security::CryptoError;
use qzwhatnext_kernel::error::ParseError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// A capture instruction failed to parse.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Calendar gateway / OAuth failure.
    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// Storage failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Token sealing/unsealing failure.
    #[error("token encryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// No open tasks to schedule.
    #[error("no tasks available")]
    NoTasks,

    /// A referenced entity does not exist for this user.
    #[error("not found: {0}")]
    NotFound(String),

    /// A one-off instruction resolved to an instant already in the past.
    #[error("requested time is in the past")]
    Past,

    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}

impl RuntimeError {
    /// Stable machine code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::Parse(e) => e.code(),
            RuntimeError::Calendar(e) => e.code(),
            RuntimeError::Persistence(PersistenceError::NotFound(_)) => "NOT_FOUND",
            RuntimeError::Persistence(PersistenceError::Constraint(_)) => "DUPLICATE_RECURRENCE",
            RuntimeError::Persistence(_) => "VALIDATION",
            RuntimeError::Crypto(e) => e.code(),
            RuntimeError::NoTasks => "NO_TASKS",
            RuntimeError::NotFound(_) => "NOT_FOUND",
            RuntimeError::Past => "PARSE_PAST",
            RuntimeError::Validation(_) => "VALIDATION",
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
