//! Fingerprint-keyed memoization of built schedules.
//!
//! A schedule's relative firing order only depends on the actions'
//! schedule-relevant fields and the settings, so it can be kept across
//! runs of the same configuration. On a hit the cached order is
//! re-anchored at the new `now` and re-heapified; sorting and shuffling
//! are not repeated, which also keeps the relative order of same-interval
//! actions stable across restarts until the cache is invalidated.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::action::{Action, ScheduleSettings};
use crate::schedule::{Schedule, ScheduleBuilder};

/// Cached schedules older than this are rebuilt even on a fingerprint hit.
pub const CACHE_STALENESS: Duration = Duration::from_secs(3600);

/// Stable hash over every action's schedule-relevant fields plus the
/// settings. Two configurations with the same fingerprint produce the
/// same relative schedule.
pub fn fingerprint(actions: &[Action], settings: &ScheduleSettings) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for action in actions {
        action.id.hash(&mut hasher);
        action.interval.hash(&mut hasher);
        action.enabled.hash(&mut hasher);
    }
    settings.stagger.hash(&mut hasher);
    settings.global_cooldown.hash(&mut hasher);
    settings.order_obeyed.hash(&mut hasher);
    hasher.finish()
}

struct CacheEntry {
    fingerprint: u64,
    order: Vec<Action>,
    stagger: Duration,
    built_at: Instant,
}

/// Memoizes the output of [`ScheduleBuilder`] keyed by configuration
/// fingerprint.
#[derive(Default)]
pub struct ScheduleCache {
    entry: Option<CacheEntry>,
    rebuilds: u64,
}

impl ScheduleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a schedule for the given configuration, rebuilding only when
    /// the fingerprint changed or the cached plan went stale.
    pub fn get_or_build(
        &mut self,
        actions: &[Action],
        settings: &ScheduleSettings,
        now: Instant,
    ) -> Schedule {
        let fp = fingerprint(actions, settings);
        if let Some(entry) = &self.entry {
            if entry.fingerprint == fp && now.duration_since(entry.built_at) < CACHE_STALENESS {
                debug!(entries = entry.order.len(), "schedule cache hit");
                return ScheduleBuilder::from_order(&entry.order, entry.stagger, now);
            }
        }

        self.rebuilds += 1;
        let order = ScheduleBuilder::plan(actions, settings);
        debug!(entries = order.len(), "schedule cache rebuild");
        let schedule = ScheduleBuilder::from_order(&order, settings.stagger, now);
        self.entry = Some(CacheEntry {
            fingerprint: fp,
            order,
            stagger: settings.stagger,
            built_at: now,
        });
        schedule
    }

    /// Drop the cached plan; the next `get_or_build` rebuilds.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Number of full rebuilds performed so far.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}
