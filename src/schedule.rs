//! Schedule construction and the firing-time min-heap.
//!
//! [`ScheduleBuilder`] is pure given `now`: it decides a firing order for
//! the enabled actions and assigns staggered first firing times. The order
//! decision ([`ScheduleBuilder::plan`]) is separated from time assignment
//! ([`ScheduleBuilder::from_order`]) so the cache can re-anchor a kept
//! order at a new `now` without sorting or shuffling again.
//!
//! Ordering inside a group of actions sharing the same interval is
//! randomized and therefore not deterministic.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::time::Instant;

use crate::action::{Action, ScheduleSettings};

/// One pending firing.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub fire_at: Instant,
    /// Insertion sequence number, breaks `fire_at` ties stably.
    seq: u64,
    pub action: Action,
}

impl PartialEq for ScheduleEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for ScheduleEntry {}

impl PartialOrd for ScheduleEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduleEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of pending firings, ordered by `fire_at` then insertion order.
#[derive(Debug, Default)]
pub struct Schedule {
    heap: BinaryHeap<Reverse<ScheduleEntry>>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an action to fire at `fire_at`.
    pub fn push(&mut self, action: Action, fire_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(ScheduleEntry {
            fire_at,
            seq,
            action,
        }));
    }

    /// Remove and return the earliest entry.
    pub fn pop(&mut self) -> Option<ScheduleEntry> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// Earliest pending firing time, if any.
    pub fn peek_fire_at(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.fire_at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Builds schedules from action lists and settings.
pub struct ScheduleBuilder;

impl ScheduleBuilder {
    /// Decide the firing order for the enabled actions.
    ///
    /// With `order_obeyed` the caller-supplied order is kept. Otherwise
    /// actions are grouped by interval, groups are sorted ascending, and
    /// members of a group with more than one action are shuffled so that
    /// no action is systematically favored.
    pub fn plan(actions: &[Action], settings: &ScheduleSettings) -> Vec<Action> {
        let enabled: Vec<Action> = actions.iter().filter(|a| a.enabled).cloned().collect();
        if settings.order_obeyed {
            return enabled;
        }

        let mut groups: BTreeMap<Duration, Vec<Action>> = BTreeMap::new();
        for action in enabled {
            groups.entry(action.interval).or_default().push(action);
        }

        let mut order = Vec::new();
        for (_, mut group) in groups {
            if group.len() > 1 {
                group.shuffle(&mut rand::thread_rng());
            }
            order.extend(group);
        }
        order
    }

    /// Assign staggered firing times to an already-decided order.
    ///
    /// The k-th action (0-indexed) first fires at `now + k * stagger`.
    pub fn from_order(order: &[Action], stagger: Duration, now: Instant) -> Schedule {
        let mut schedule = Schedule::new();
        for (index, action) in order.iter().enumerate() {
            schedule.push(action.clone(), now + stagger * index as u32);
        }
        schedule
    }

    /// Build a schedule from scratch.
    pub fn build(actions: &[Action], settings: &ScheduleSettings, now: Instant) -> Schedule {
        Self::from_order(&Self::plan(actions, settings), settings.stagger, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, secs: f64) -> Action {
        Action::new(id, Duration::from_secs_f64(secs))
    }

    fn drain_ids(mut schedule: Schedule) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(entry) = schedule.pop() {
            ids.push(entry.action.id);
        }
        ids
    }

    #[test]
    fn test_pop_order_is_fire_time_order() {
        let now = Instant::now();
        let mut schedule = Schedule::new();
        schedule.push(action("late", 1.0), now + Duration::from_secs(5));
        schedule.push(action("early", 1.0), now + Duration::from_secs(1));
        schedule.push(action("mid", 1.0), now + Duration::from_secs(3));

        assert_eq!(drain_ids(schedule), vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let now = Instant::now();
        let mut schedule = Schedule::new();
        schedule.push(action("first", 1.0), now);
        schedule.push(action("second", 1.0), now);
        schedule.push(action("third", 1.0), now);

        assert_eq!(drain_ids(schedule), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_disabled_actions_are_filtered() {
        let mut disabled = action("off", 1.0);
        disabled.enabled = false;
        let actions = vec![action("on", 1.0), disabled];

        let order = ScheduleBuilder::plan(&actions, &ScheduleSettings::default());
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].id, "on");
    }

    #[test]
    fn test_order_obeyed_keeps_caller_order() {
        let actions = vec![action("c", 5.0), action("a", 1.0), action("b", 3.0)];
        let settings = ScheduleSettings {
            order_obeyed: true,
            ..Default::default()
        };

        let order = ScheduleBuilder::plan(&actions, &settings);
        let ids: Vec<_> = order.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_grouped_order_sorts_by_interval() {
        let actions = vec![action("slow", 5.0), action("fast", 1.0), action("mid", 3.0)];
        let settings = ScheduleSettings {
            order_obeyed: false,
            ..Default::default()
        };

        let order = ScheduleBuilder::plan(&actions, &settings);
        let ids: Vec<_> = order.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["fast", "mid", "slow"]);
    }

    #[test]
    fn test_interval_group_keeps_membership() {
        // a and b share an interval and may appear in either order, but
        // always before c.
        let actions = vec![action("a", 2.0), action("b", 2.0), action("c", 5.0)];
        let settings = ScheduleSettings {
            order_obeyed: false,
            ..Default::default()
        };

        for _ in 0..20 {
            let order = ScheduleBuilder::plan(&actions, &settings);
            let ids: Vec<_> = order.iter().map(|a| a.id.as_str()).collect();
            assert_eq!(ids.len(), 3);
            assert_eq!(ids[2], "c");
            assert!(ids[..2].contains(&"a"));
            assert!(ids[..2].contains(&"b"));
        }
    }

    #[test]
    fn test_stagger_assignment() {
        let now = Instant::now();
        let actions = vec![action("a", 1.0), action("b", 2.0), action("c", 3.0)];
        let settings = ScheduleSettings {
            stagger: Duration::from_millis(500),
            order_obeyed: true,
            ..Default::default()
        };

        let mut schedule = ScheduleBuilder::build(&actions, &settings, now);
        for k in 0..3u32 {
            let entry = schedule.pop().unwrap();
            assert_eq!(entry.fire_at, now + Duration::from_millis(500) * k);
        }
        assert!(schedule.is_empty());
    }
}
