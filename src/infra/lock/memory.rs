//! In-memory lock with per-entry expiry.
//!
//! An entry whose owner died without releasing it expires after the TTL, so
//! a crashed worker cannot lock a resource forever. A live owner keeps its
//! entry with `prolong`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::{DistributedLock, SchedulerError};

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// Process-local implementation of [`DistributedLock`].
#[derive(Debug)]
pub struct InMemoryLock {
    ttl: Duration,
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl InMemoryLock {
    /// Lock whose entries expire `ttl` after acquisition.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Owner currently holding `key`.
    #[must_use]
    pub fn owner(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.owner.clone())
    }

    /// Drop expired entries and return how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(&self, key: &str, owner: &str) -> Result<bool, SchedulerError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
            debug!(key, previous_owner = %entry.owner, "taking over expired lock");
        }
        entries.insert(
            key.to_owned(),
            LockEntry {
                owner: owner.to_owned(),
                expires_at: now + self.ttl,
            },
        );
        Ok(true)
    }

    async fn prolong(&self, key: &str, owner: &str) -> Result<bool, SchedulerError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.owner == owner => {
                entry.expires_at = Instant::now() + self.ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        let holder = entries.get(key).map(|e| e.owner.clone());
        match holder.as_deref() {
            Some(holder) if holder == owner => {
                entries.remove(key);
            }
            Some(holder) => debug!(key, owner, holder, "not releasing a lock held by another owner"),
            None => {}
        }
        Ok(())
    }

    async fn is_locked(&self, key: &str) -> Result<bool, SchedulerError> {
        Ok(self.owner(key).is_some())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
