//! # Autofire
//!
//! An interval-based action automation engine: fires a configured set of
//! actions (simulated input events) on independent per-action intervals,
//! with staggered first firings, a global minimum spacing between any two
//! firings, and a fail-safe stop on repeated delivery failures.
//!
//! ## Features
//!
//! - Independent per-action intervals with staggered rollout
//! - Engine-wide global cooldown between any two firings
//! - Fingerprint-keyed schedule cache across restarts
//! - Bounded, rate-limited error tracking
//! - Cooperative start/stop/pause/resume lifecycle with state callbacks
//! - Pluggable delivery through the [`ActionSender`] trait
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use autofire::{Action, ActionSender, AutomationEngine, ScheduleSettings};
//!
//! struct NullSender;
//!
//! impl ActionSender for NullSender {
//!     fn send(&self, _action_id: &str) -> bool {
//!         true
//!     }
//!
//!     fn is_available(&self) -> bool {
//!         true
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> autofire::Result<()> {
//!     let engine = AutomationEngine::new(Arc::new(NullSender));
//!     engine.configure(
//!         vec![
//!             Action::new("collect", Duration::from_secs(2)),
//!             Action::new("prestige", Duration::from_secs(300)),
//!         ],
//!         ScheduleSettings::default(),
//!     )?;
//!
//!     engine.start().await?;
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!     engine.stop(Duration::from_secs(5)).await?;
//!
//!     println!("{:?}", engine.stats());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The engine is configured programmatically; the companion binary loads
//! the same values from a JSON file:
//!
//! ```json
//! {
//!   "actions": [
//!     {"id": "collect", "interval": "2s"},
//!     {"id": "prestige", "interval": "5m"}
//!   ],
//!   "stagger": "500ms",
//!   "global_cooldown": "100ms"
//! }
//! ```

pub mod action;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod sender;
pub mod stats;

pub use action::{Action, ScheduleSettings};
pub use cache::ScheduleCache;
pub use config::Config;
pub use engine::{AutomationEngine, EngineState};
pub use error::{AutofireError, Result};
pub use schedule::{Schedule, ScheduleBuilder, ScheduleEntry};
pub use sender::{ActionSender, ConsoleSender};
pub use stats::{ExecutionStats, StatsSnapshot};
