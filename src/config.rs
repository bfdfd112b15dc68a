//! Caller-side configuration loading.
//!
//! The engine itself never touches the filesystem; this module is the
//! configuration provider used by the `autofire` binary (and available to
//! other callers). It loads a JSON file describing the actions and
//! scheduling settings, validates it, and converts it into the engine's
//! types.
//!
//! Durations are written as human-readable strings:
//!
//! ```json
//! {
//!   "actions": [
//!     {"id": "collect", "interval": "2s"},
//!     {"id": "refine", "interval": "2s"},
//!     {"id": "prestige", "interval": "5m", "max_consecutive_failures": 3}
//!   ],
//!   "stagger": "500ms",
//!   "global_cooldown": "100ms",
//!   "order_obeyed": false
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ScheduleSettings, DEFAULT_CONSECUTIVE_FAILURES};
use crate::error::{AutofireError, Result};

/// One action entry as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub id: String,
    #[serde(with = "duration_str")]
    pub interval: Duration,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default = "default_stagger", with = "duration_str")]
    pub stagger: Duration,
    #[serde(default = "default_cooldown", with = "duration_str")]
    pub global_cooldown: Duration,
    #[serde(default)]
    pub order_obeyed: bool,
    #[serde(default)]
    pub verbose: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_failures() -> u32 {
    DEFAULT_CONSECUTIVE_FAILURES
}

fn default_stagger() -> Duration {
    Duration::from_millis(500)
}

fn default_cooldown() -> Duration {
    Duration::from_millis(100)
}

impl Config {
    /// Load and parse a configuration file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AutofireError::config_load(path, e.to_string()))?;
        serde_json::from_str(&contents)
            .map_err(|e| AutofireError::config_load(path, e.to_string()))
    }

    /// Write the configuration to a file as pretty-printed JSON.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AutofireError::config_save(path, e.to_string()))?;
        fs::write(path, contents).map_err(|e| AutofireError::config_save(path, e.to_string()))
    }

    /// Validate the configuration, including every action definition.
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(AutofireError::config_validation(
                "at least one action must be configured",
            ));
        }
        let mut seen = HashSet::new();
        for entry in &self.actions {
            if !seen.insert(entry.id.as_str()) {
                return Err(AutofireError::config_validation(format!(
                    "duplicate action id '{}'",
                    entry.id
                )));
            }
        }
        for action in self.actions() {
            action.validate()?;
        }
        Ok(())
    }

    /// The configured actions as engine values.
    pub fn actions(&self) -> Vec<Action> {
        self.actions
            .iter()
            .map(|entry| Action {
                id: entry.id.clone(),
                interval: entry.interval,
                enabled: entry.enabled,
                priority: entry.priority,
                max_consecutive_failures: entry.max_consecutive_failures,
            })
            .collect()
    }

    /// The configured scheduling settings as engine values.
    pub fn settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            stagger: self.stagger,
            global_cooldown: self.global_cooldown,
            order_obeyed: self.order_obeyed,
        }
    }
}

/// Parse a duration string such as "500ms", "2s" or "5m".
///
/// A bare number is treated as milliseconds. Unit suffixes are case
/// insensitive and surrounding whitespace is ignored.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(AutofireError::invalid_duration(value, "empty string"));
    }

    let (digits, multiplier_ms) = if let Some(rest) = trimmed.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = trimmed.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = trimmed.strip_suffix('m') {
        (rest, 60_000)
    } else {
        (trimmed.as_str(), 1)
    };

    let amount: u64 = digits
        .trim()
        .parse()
        .map_err(|_| AutofireError::invalid_duration(value, "expected a non-negative number"))?;
    Ok(Duration::from_millis(amount * multiplier_ms))
}

/// Format a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis > 0 && millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis > 0 && millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
