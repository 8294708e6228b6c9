//! Pool utilization between two collections.
//!
//! Utilization estimates the share of wall time a pool spent running tasks:
//! `completed tasks since last collection × mean run time / elapsed time`.
//! A pool with more than one slot can exceed 1.0.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::core::{PoolStats, WorkerPoolManager};

#[derive(Debug, Clone, Copy)]
struct Sample {
    finished: u64,
}

/// Keeps the previous collection of every pool.
#[derive(Debug)]
pub struct UtilizationTracker {
    last_collected: Instant,
    samples: BTreeMap<String, Sample>,
}

impl Default for UtilizationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UtilizationTracker {
    /// Tracker whose first window starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_collected: Instant::now(),
            samples: BTreeMap::new(),
        }
    }

    /// Utilization of every pool of `manager` since the previous call.
    pub fn collect(&mut self, manager: &WorkerPoolManager) -> BTreeMap<String, f64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_collected);
        self.last_collected = now;
        manager
            .stats()
            .into_iter()
            .map(|(id, stats)| {
                let value = self.observe(&id, &stats, elapsed);
                (id, value)
            })
            .collect()
    }

    /// Record `stats` for `pool` and return its utilization over `elapsed`.
    pub fn observe(&mut self, pool: &str, stats: &PoolStats, elapsed: Duration) -> f64 {
        let finished = stats.finished_tasks();
        let previous = self
            .samples
            .insert(pool.to_owned(), Sample { finished })
            .map_or(0, |s| s.finished);
        utilization(finished.saturating_sub(previous), stats.mean_run_time(), elapsed)
    }
}

#[allow(clippy::cast_precision_loss)]
fn utilization(finished: u64, mean_run_time: Duration, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    finished as f64 * mean_run_time.as_secs_f64() / elapsed.as_secs_f64()
}
