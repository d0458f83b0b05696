//! # Fibonacci Backoff
//!
//! Delay before a failed key is handed back to the reconciler. Delays follow
//! the Fibonacci sequence scaled by a base interval and capped at a maximum:
//! with a 5s base and a 300s cap the sequence is 5s, 5s, 10s, 15s, 25s, 40s,
//! 65s, 105s, 170s, 275s, 300s, 300s, ...
//!
//! The reconciler itself never waits or retries; the work queue asks this
//! module how long to hold a key after each failure and forgets the key's
//! history once a pass succeeds.

use cluster_client::ObjectKey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Stateless Fibonacci delay calculator.
#[derive(Debug, Clone, Copy)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    /// # Arguments
    ///
    /// * `min_secs` - Delay for the first two failures
    /// * `max_secs` - Upper bound for any delay
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Delay after the `failures`-th consecutive failure (1-based; 0 is
    /// treated as 1).
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let mut prev = 0u64;
        let mut current = self.min_secs;

        for _ in 1..failures.max(1) {
            let next = prev.saturating_add(current);
            prev = current;
            current = next;
            if current >= self.max_secs {
                break;
            }
        }

        Duration::from_secs(current.min(self.max_secs))
    }
}

/// Per-key consecutive failure counts feeding a [`FibonacciBackoff`].
#[derive(Debug)]
pub struct KeyedBackoff {
    policy: FibonacciBackoff,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl KeyedBackoff {
    pub fn new(policy: FibonacciBackoff) -> Self {
        Self {
            policy,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `key` and returns how long to wait before retrying.
    pub fn record_failure(&self, key: &ObjectKey) -> Duration {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.policy.delay_for(*count)
    }

    /// Clears the failure history of `key` after a successful pass.
    pub fn reset(&self, key: &ObjectKey) {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }
}
