//! Per-user advisory locks.
//!
//! Two concurrent plan rebuilds (or reconciles) for the same user
//! serialize here; the second caller simply observes the first caller's
//! committed result once it acquires the lock.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct UserLocks {
    inner: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `user_id`; lock it across the critical section.
    pub fn for_user(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.inner
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
