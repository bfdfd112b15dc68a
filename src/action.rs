//! Action definitions and scheduling settings.
//!
//! An [`Action`] is one configured, repeatable input event with its own
//! firing interval. Actions are validated once and then treated as
//! immutable; the engine works on a snapshot taken at configure time.

use std::time::Duration;

use crate::error::{AutofireError, Result};

/// Shortest interval an action may be configured with (exclusive).
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Longest interval an action may be configured with (inclusive).
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Bounds for the per-action consecutive failure limit.
pub const MIN_CONSECUTIVE_FAILURES: u32 = 1;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 100;

/// Default consecutive failure limit applied when none is given.
pub const DEFAULT_CONSECUTIVE_FAILURES: u32 = 5;

/// One configured, repeatable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Opaque identifier handed to the action sender on each firing.
    pub id: String,
    /// Delay between successive firings of this action.
    pub interval: Duration,
    /// Disabled actions are kept in the configuration but never scheduled.
    pub enabled: bool,
    /// Advisory priority, not used by the scheduler itself.
    pub priority: i32,
    /// Number of consecutive failed sends that triggers a fail-safe stop.
    pub max_consecutive_failures: u32,
}

impl Action {
    /// Create an enabled action with default priority and failure limit.
    pub fn new(id: impl Into<String>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            interval,
            enabled: true,
            priority: 0,
            max_consecutive_failures: DEFAULT_CONSECUTIVE_FAILURES,
        }
    }

    /// Validate the action definition.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AutofireError::invalid_action(
                &self.id,
                "id cannot be empty",
            ));
        }
        if self.interval <= MIN_INTERVAL {
            return Err(AutofireError::invalid_action(
                &self.id,
                format!("interval must be greater than {MIN_INTERVAL:?}"),
            ));
        }
        if self.interval > MAX_INTERVAL {
            return Err(AutofireError::invalid_action(
                &self.id,
                format!("interval must not exceed {MAX_INTERVAL:?}"),
            ));
        }
        if self.max_consecutive_failures < MIN_CONSECUTIVE_FAILURES
            || self.max_consecutive_failures > MAX_CONSECUTIVE_FAILURES
        {
            return Err(AutofireError::invalid_action(
                &self.id,
                format!(
                    "max_consecutive_failures must be between {MIN_CONSECUTIVE_FAILURES} and {MAX_CONSECUTIVE_FAILURES}"
                ),
            ));
        }
        Ok(())
    }

    /// Whether two actions are identical in the fields that affect the
    /// built schedule (id, interval, enabled).
    pub fn schedule_eq(&self, other: &Self) -> bool {
        self.id == other.id && self.interval == other.interval && self.enabled == other.enabled
    }
}

/// Engine-wide scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Initial spacing between the first firings of successive actions.
    pub stagger: Duration,
    /// Minimum spacing enforced between any two firings, engine-wide.
    pub global_cooldown: Duration,
    /// When true, actions are scheduled in the caller-supplied order;
    /// otherwise they are grouped by interval and sorted ascending.
    pub order_obeyed: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(500),
            global_cooldown: Duration::from_millis(100),
            order_obeyed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_action() {
        let action = Action::new("loot", Duration::from_secs(2));
        assert!(action.validate().is_ok());
        assert!(action.enabled);
        assert_eq!(action.max_consecutive_failures, DEFAULT_CONSECUTIVE_FAILURES);
    }

    #[test]
    fn test_empty_id_rejected() {
        let action = Action::new("  ", Duration::from_secs(1));
        assert!(action.validate().is_err());
    }

    #[test]
    fn test_interval_bounds() {
        // Exactly at the minimum is still too fast (bound is exclusive).
        let action = Action::new("fast", MIN_INTERVAL);
        assert!(action.validate().is_err());

        let action = Action::new("fast", Duration::from_millis(101));
        assert!(action.validate().is_ok());

        let action = Action::new("slow", MAX_INTERVAL);
        assert!(action.validate().is_ok());

        let action = Action::new("too-slow", MAX_INTERVAL + Duration::from_secs(1));
        assert!(action.validate().is_err());
    }

    #[test]
    fn test_failure_limit_bounds() {
        let mut action = Action::new("loot", Duration::from_secs(1));
        action.max_consecutive_failures = 0;
        assert!(action.validate().is_err());

        action.max_consecutive_failures = 101;
        assert!(action.validate().is_err());

        action.max_consecutive_failures = 100;
        assert!(action.validate().is_ok());
    }

    #[test]
    fn test_schedule_eq_ignores_advisory_fields() {
        let a = Action::new("loot", Duration::from_secs(1));
        let mut b = a.clone();
        b.priority = 7;
        b.max_consecutive_failures = 42;
        assert!(a.schedule_eq(&b));

        b.interval = Duration::from_secs(2);
        assert!(!a.schedule_eq(&b));
    }
}
