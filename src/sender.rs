//! The delivery capability consumed by the engine.

use tracing::info;

/// Capability for delivering one input event per firing.
///
/// Implementations must be safe to call from the worker task. Expected
/// delivery failures are reported by returning `false`; the engine records
/// them and drives its fail-safe logic off them. Panics from `send` are
/// trapped by the engine and counted as failed sends.
pub trait ActionSender: Send + Sync {
    /// Deliver one event for the given action id. Returns `true` when the
    /// event was delivered.
    fn send(&self, action_id: &str) -> bool;

    /// Whether the sender is currently able to deliver events at all.
    /// Checked once at engine start.
    fn is_available(&self) -> bool;
}

/// Dry-run sender that logs each firing instead of injecting input.
///
/// Used by the companion binary so configurations can be exercised without
/// touching any real input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSender;

impl ActionSender for ConsoleSender {
    fn send(&self, action_id: &str) -> bool {
        info!(action = %action_id, "action dispatched");
        true
    }

    fn is_available(&self) -> bool {
        true
    }
}
