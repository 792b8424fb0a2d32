//! API call statistics, shared across tasks

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-scoped call counters. Cheap to share behind an `Arc` and
/// updated from the retry loop without locks.
#[derive(Debug, Default)]
pub struct CallStats {
    total: AtomicU64,
    successful: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            total_calls: self.total.load(Ordering::Relaxed),
            successful_calls: self.successful.load(Ordering::Relaxed),
            retried_calls: self.retried.load(Ordering::Relaxed),
            failed_calls: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub retried_calls: u64,
    pub failed_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = CallStats::new();
        stats.record_attempt();
        stats.record_attempt();
        stats.record_retry();
        stats.record_success();
        let snap = stats.snapshot();
        assert_eq!(snap.total_calls, 2);
        assert_eq!(snap.retried_calls, 1);
        assert_eq!(snap.successful_calls, 1);
        assert_eq!(snap.failed_calls, 0);
    }
}
