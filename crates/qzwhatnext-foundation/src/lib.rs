//! qzWhatNext foundation — the I/O building blocks under the runtime.
//!
//! Persistence (trait-abstracted, SQLite + in-memory backends), secret
//! handling (AEAD token sealing, JWTs, shortcut-token hashes), the
//! calendar gateway (trait + Google client + OAuth), and the classifier
//! seam the AI-exclusion gate fronts.

// persistence module
pub mod persistence;

// secrets: AEAD, JWT, shortcut tokens
pub mod security;

// calendar gateway + Google implementation + OAuth
pub mod calendar;

// AI classifier seam
pub mod inference;

pub use persistence::{PersistenceError, PersistenceResult};
