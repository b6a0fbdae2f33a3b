//! Per-job attempt locks.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::job::JobId;

/// Held for the whole lifetime of one crawl attempt, including the wait for
/// a worker-pool permit.
pub type AttemptGuard = OwnedMutexGuard<()>;

/// One async mutex per job; at most one attempt per job in flight.
#[derive(Default)]
pub struct JobLocks {
    locks: DashMap<JobId, Arc<Mutex<()>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: JobId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Take the lock without waiting. `None` while an attempt holds it.
    pub fn try_acquire(&self, id: JobId) -> Option<AttemptGuard> {
        self.slot(id).try_lock_owned().ok()
    }

    pub fn is_locked(&self, id: JobId) -> bool {
        self.locks
            .get(&id)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Forget a deleted job's lock.
    pub fn remove(&self, id: JobId) {
        self.locks.remove(&id);
    }
}
