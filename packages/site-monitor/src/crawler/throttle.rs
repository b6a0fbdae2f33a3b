//! Per-host request serialization.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Serializes fetches per host and spaces them by a delay.
///
/// A [`HostPermit`] is held for the duration of one fetch; the next permit
/// for the same host is granted no earlier than `delay` after the previous
/// one was released.
#[derive(Default)]
pub struct HostThrottle {
    hosts: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl HostThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, host: &str, delay: Duration) -> HostPermit {
        let slot = self
            .hosts
            .entry(host.to_ascii_lowercase())
            .or_default()
            .clone();

        let guard = slot.lock_owned().await;
        if let Some(released) = *guard {
            tokio::time::sleep_until(released + delay).await;
        }
        HostPermit { guard }
    }
}

/// Exclusive right to fetch from one host.
pub struct HostPermit {
    guard: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for HostPermit {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}
