//! Data persistence.
//!
//! Core traits define what a storage backend must provide; backends are
//! interchangeable behind [`traits::Store`]:
//!
//! - [`SqliteStore`] — embedded single-file / in-memory SQLite via sqlx,
//!   WAL and foreign keys on, migrations at connect.
//! - [`MemoryStore`] — process-local maps, for tests and development.
//!
//! All operations are user-scoped and all timestamps are UTC.

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    ApiTokenStore, BlockStore, BulkOutcome, PersistenceError, PersistenceResult, SeriesStore,
    SharedStore, Store, TaskStore, TimeBlockStore, TokenStore, UserStore,
};
