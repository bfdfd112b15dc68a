//! Execution counters and the bounded error log.
//!
//! The error log is a capped ring buffer with time-based expiry and a
//! per-minute admission rate limit, so a failure storm cannot grow memory
//! without bound. Errors dropped by the rate limiter are still reflected
//! in the aggregate counters.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// Hard cap on stored error messages.
pub const MAX_STORED_ERRORS: usize = 500;

/// Stored errors older than this are expired.
pub const ERROR_TTL: Duration = Duration::from_secs(600);

/// At most this many errors are admitted to storage per rolling minute.
pub const ERRORS_PER_MINUTE: usize = 30;

const ADMISSION_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct ErrorEntry {
    at: Instant,
    message: String,
}

/// Mutable execution counters, owned by the engine and reset on each start.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    total: u64,
    succeeded: u64,
    failed: u64,
    rate_limited: u64,
    errors: VecDeque<ErrorEntry>,
    admissions: VecDeque<Instant>,
}

/// Read-only copy of the stats, for tooltips, logs and tests.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Errors dropped by the per-minute admission limit.
    pub rate_limited: u64,
    pub success_rate: f64,
    /// Stored error messages, oldest first.
    pub recent_errors: Vec<String>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all counters and stored errors.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    /// Record a failed firing. The message is admitted to the error log
    /// subject to the rate limit; the counters are updated regardless.
    pub fn record_failure(&mut self, message: String, now: Instant) {
        self.total += 1;
        self.failed += 1;
        self.admit(message, now);
    }

    /// Record an operational error that is not tied to a firing.
    pub fn record_error(&mut self, message: String, now: Instant) {
        self.admit(message, now);
    }

    fn admit(&mut self, message: String, now: Instant) {
        self.expire(now);
        while let Some(front) = self.admissions.front() {
            if now.duration_since(*front) >= ADMISSION_WINDOW {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
        if self.admissions.len() >= ERRORS_PER_MINUTE {
            self.rate_limited += 1;
            debug!("error log admission rate limit hit, message dropped");
            return;
        }
        self.admissions.push_back(now);
        self.errors.push_back(ErrorEntry { at: now, message });
        while self.errors.len() > MAX_STORED_ERRORS {
            self.errors.pop_front();
        }
    }

    fn expire(&mut self, now: Instant) {
        while let Some(front) = self.errors.front() {
            if now.duration_since(front.at) >= ERROR_TTL {
                self.errors.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take a snapshot, expiring stale errors first.
    pub fn snapshot(&mut self, now: Instant) -> StatsSnapshot {
        self.expire(now);
        let success_rate = if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        };
        StatsSnapshot {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            rate_limited: self.rate_limited,
            success_rate,
            recent_errors: self.errors.iter().map(|e| e.message.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = ExecutionStats::new();
        let now = Instant::now();
        stats.record_success();
        stats.record_success();
        stats.record_failure("boom".into(), now);

        let snap = stats.snapshot(now);
        assert_eq!(snap.total, 3);
        assert_eq!(snap.succeeded, 2);
        assert_eq!(snap.failed, 1);
        assert!((snap.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(snap.recent_errors, vec!["boom".to_string()]);
    }

    #[test]
    fn test_reset() {
        let mut stats = ExecutionStats::new();
        let now = Instant::now();
        stats.record_failure("boom".into(), now);
        stats.reset();

        let snap = stats.snapshot(now);
        assert_eq!(snap.total, 0);
        assert!(snap.recent_errors.is_empty());
        assert_eq!(snap.success_rate, 0.0);
    }

    #[test]
    fn test_failure_storm_is_bounded() {
        let mut stats = ExecutionStats::new();
        let now = Instant::now();
        // 600 failures inside a single minute.
        for i in 0..600u64 {
            stats.record_failure(format!("fail {i}"), now + Duration::from_millis(i));
        }

        let snap = stats.snapshot(now + Duration::from_secs(1));
        assert_eq!(snap.failed, 600);
        assert!(!snap.recent_errors.is_empty());
        assert!(snap.recent_errors.len() <= MAX_STORED_ERRORS);
        assert_eq!(snap.recent_errors.len(), ERRORS_PER_MINUTE);
        assert_eq!(snap.rate_limited, 600 - ERRORS_PER_MINUTE as u64);
    }

    #[test]
    fn test_rate_limit_window_slides() {
        let mut stats = ExecutionStats::new();
        let now = Instant::now();
        for i in 0..ERRORS_PER_MINUTE {
            stats.record_failure(format!("first {i}"), now + Duration::from_millis(i as u64));
        }
        // Window full; this one is dropped.
        stats.record_failure("dropped".into(), now + Duration::from_secs(1));
        // A minute later admissions are allowed again.
        stats.record_failure("later".into(), now + Duration::from_secs(70));

        let snap = stats.snapshot(now + Duration::from_secs(70));
        assert_eq!(snap.rate_limited, 1);
        assert!(snap.recent_errors.iter().any(|m| m == "later"));
        assert!(!snap.recent_errors.iter().any(|m| m == "dropped"));
    }

    #[test]
    fn test_time_based_expiry() {
        let mut stats = ExecutionStats::new();
        let now = Instant::now();
        stats.record_failure("old".into(), now);
        stats.record_failure("fresh".into(), now + Duration::from_secs(595));

        let snap = stats.snapshot(now + ERROR_TTL + Duration::from_secs(1));
        assert_eq!(snap.recent_errors, vec!["fresh".to_string()]);
        // Expiry only affects storage, never the counters.
        assert_eq!(snap.failed, 2);
    }
}
