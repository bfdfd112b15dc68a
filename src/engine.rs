//! The automation engine: lifecycle state machine and worker loop.
//!
//! One engine owns at most one worker task. Control methods serialize
//! state transitions through a single lock; the worker never holds that
//! lock while waiting or delivering, so `stop()` and state reads stay
//! responsive during long sleeps. Stop and pause requests travel on a
//! `watch` channel that every wait in the worker selects against, so a
//! request is observed at wake-up latency rather than at the next
//! scheduled firing.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::action::{Action, ScheduleSettings};
use crate::cache::ScheduleCache;
use crate::error::{AutofireError, Result};
use crate::schedule::Schedule;
use crate::sender::ActionSender;
use crate::stats::{ExecutionStats, StatsSnapshot};

/// Bounded wait for the worker to confirm it is alive after spawn.
const START_CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

/// Hard cap on live heap entries; re-insertions beyond it are skipped.
const MAX_LIVE_ENTRIES: usize = 1000;

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Listener invoked synchronously with `(old, new)` on every transition.
pub type StateCallback = Box<dyn Fn(EngineState, EngineState) + Send + Sync>;

/// Signal shared between the control plane and the worker.
#[derive(Debug, Clone, Copy, Default)]
struct ControlSignal {
    stop: bool,
    paused: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the worker task.
struct Shared {
    state: Mutex<EngineState>,
    stats: Mutex<ExecutionStats>,
    callbacks: Mutex<Vec<StateCallback>>,
}

impl Shared {
    fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    /// Set the state if the current one is in `expected`, returning the
    /// previous state. Callbacks run after the state lock is released.
    fn try_transition(
        &self,
        expected: &[EngineState],
        new: EngineState,
        operation: &str,
    ) -> Result<EngineState> {
        let old = {
            let mut state = lock(&self.state);
            if !expected.contains(&*state) {
                return Err(AutofireError::invalid_state(operation, *state));
            }
            std::mem::replace(&mut *state, new)
        };
        self.notify(old, new);
        Ok(old)
    }

    /// Set the state only if it currently equals `expected`.
    fn transition_if(&self, expected: EngineState, new: EngineState) -> bool {
        let old = {
            let mut state = lock(&self.state);
            if *state != expected {
                return false;
            }
            std::mem::replace(&mut *state, new)
        };
        self.notify(old, new);
        true
    }

    /// Set the state unconditionally.
    fn force_transition(&self, new: EngineState) -> EngineState {
        let old = std::mem::replace(&mut *lock(&self.state), new);
        self.notify(old, new);
        old
    }

    /// Worker-side terminal transition: everything but an already-latched
    /// error becomes Stopped.
    fn transition_to_stopped(&self) {
        let old = {
            let mut state = lock(&self.state);
            if *state == EngineState::Error {
                return;
            }
            std::mem::replace(&mut *state, EngineState::Stopped)
        };
        self.notify(old, EngineState::Stopped);
    }

    fn notify(&self, old: EngineState, new: EngineState) {
        if old == new {
            return;
        }
        debug!(%old, %new, "engine state changed");
        let callbacks = lock(&self.callbacks);
        for callback in callbacks.iter() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(old, new))).is_err() {
                warn!(%old, %new, "state callback panicked");
            }
        }
    }
}

/// Orchestrates scheduling and delivery of configured actions.
///
/// Construction injects the [`ActionSender`] capability; everything else
/// the engine needs arrives through [`configure`](Self::configure).
/// Dropping the engine closes the control channel, which makes a worker
/// that is still alive exit on its next wait.
pub struct AutomationEngine {
    shared: Arc<Shared>,
    sender: Arc<dyn ActionSender>,
    actions: Mutex<Vec<Action>>,
    settings: Mutex<ScheduleSettings>,
    cache: Mutex<ScheduleCache>,
    control: watch::Sender<ControlSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AutomationEngine {
    pub fn new(sender: Arc<dyn ActionSender>) -> Self {
        let (control, _) = watch::channel(ControlSignal::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::Stopped),
                stats: Mutex::new(ExecutionStats::new()),
                callbacks: Mutex::new(Vec::new()),
            }),
            sender,
            actions: Mutex::new(Vec::new()),
            settings: Mutex::new(ScheduleSettings::default()),
            cache: Mutex::new(ScheduleCache::new()),
            control,
            worker: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Read-only snapshot of the execution statistics.
    pub fn stats(&self) -> StatsSnapshot {
        lock(&self.shared.stats).snapshot(Instant::now())
    }

    /// Register a listener for state transitions. Listeners are invoked
    /// synchronously on the thread causing the transition and must not
    /// block; panics are caught and logged.
    pub fn register_state_callback<F>(&self, callback: F)
    where
        F: Fn(EngineState, EngineState) + Send + Sync + 'static,
    {
        lock(&self.shared.callbacks).push(Box::new(callback));
    }

    /// Replace the configured actions and settings.
    ///
    /// Only valid while the engine is stopped (or in the error state,
    /// which reconfiguring clears). The schedule cache is invalidated
    /// only when a schedule-relevant field actually changed.
    pub fn configure(&self, actions: Vec<Action>, settings: ScheduleSettings) -> Result<()> {
        let state = self.shared.state();
        if state != EngineState::Stopped && state != EngineState::Error {
            return Err(AutofireError::invalid_state("configure", state));
        }

        for action in &actions {
            action.validate()?;
        }

        let material_change = {
            let mut current_actions = lock(&self.actions);
            let mut current_settings = lock(&self.settings);
            let changed = *current_settings != settings
                || current_actions.len() != actions.len()
                || current_actions
                    .iter()
                    .zip(actions.iter())
                    .any(|(a, b)| !a.schedule_eq(b));
            *current_actions = actions;
            *current_settings = settings;
            changed
        };

        if material_change {
            lock(&self.cache).invalidate();
            info!("configuration changed, schedule cache invalidated");
        } else {
            debug!("configuration unchanged");
        }

        if state == EngineState::Error {
            self.shared.transition_if(EngineState::Error, EngineState::Stopped);
        }
        Ok(())
    }

    /// Start the worker task.
    ///
    /// Fails when the engine is not stopped, no enabled action is
    /// configured, or the sender reports unavailable. Blocks until the
    /// worker confirms liveness (bounded wait); a confirmation timeout
    /// latches the error state.
    pub async fn start(&self) -> Result<()> {
        let actions = lock(&self.actions).clone();
        if !actions.iter().any(|a| a.enabled) {
            return Err(AutofireError::NoActionsConfigured);
        }
        if !self.sender.is_available() {
            return Err(AutofireError::SenderUnavailable);
        }

        self.shared
            .try_transition(&[EngineState::Stopped], EngineState::Starting, "start")?;

        lock(&self.shared.stats).reset();
        self.control.send_replace(ControlSignal::default());

        let settings = lock(&self.settings).clone();
        let schedule = lock(&self.cache).get_or_build(&actions, &settings, Instant::now());
        info!(
            actions = schedule.len(),
            stagger = ?settings.stagger,
            cooldown = ?settings.global_cooldown,
            "starting worker"
        );

        // A handle still present here belongs to a finished run or to a
        // worker that never confirmed startup; it must not outlive the
        // new run.
        if let Some(stale) = lock(&self.worker).take() {
            stale.abort();
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let context = WorkerContext {
            shared: Arc::clone(&self.shared),
            sender: Arc::clone(&self.sender),
            control: self.control.subscribe(),
            cooldown: settings.global_cooldown,
            schedule,
        };
        *lock(&self.worker) = Some(tokio::spawn(worker_main(context, ready_tx)));

        match tokio::time::timeout(START_CONFIRM_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                // The worker may already have finished a trivial run, in
                // which case it owns the terminal transition.
                self.shared
                    .transition_if(EngineState::Starting, EngineState::Running);
                Ok(())
            }
            Ok(Err(_)) | Err(_) => {
                error!("worker did not confirm startup");
                self.control.send_modify(|signal| signal.stop = true);
                self.shared.force_transition(EngineState::Error);
                Err(AutofireError::worker_unresponsive(START_CONFIRM_TIMEOUT))
            }
        }
    }

    /// Request a cooperative stop and wait up to `timeout` for the worker
    /// to exit. On timeout the engine stays in `Stopping`, the worker is
    /// left running, and a later `stop()` may retry the join.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        let old = {
            let mut state = lock(&self.shared.state);
            match *state {
                EngineState::Stopped => None,
                EngineState::Running | EngineState::Paused | EngineState::Stopping => {
                    Some(std::mem::replace(&mut *state, EngineState::Stopping))
                }
                other => return Err(AutofireError::invalid_state("stop", other)),
            }
        };
        let Some(old) = old else { return Ok(()) };
        self.shared.notify(old, EngineState::Stopping);
        self.control.send_modify(|signal| signal.stop = true);

        let Some(mut handle) = lock(&self.worker).take() else {
            // No handle plus an already-Stopping state means another stop()
            // owns the join; the worker's own exit settles the state.
            if old != EngineState::Stopping {
                self.shared
                    .transition_if(EngineState::Stopping, EngineState::Stopped);
            }
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(join_result) => {
                if join_result.is_err() {
                    error!("worker task was aborted or panicked outside its guard");
                    self.shared.force_transition(EngineState::Error);
                }
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, "worker did not exit in time");
                *lock(&self.worker) = Some(handle);
                Err(AutofireError::shutdown_timeout(timeout))
            }
        }
    }

    /// Stop executing actions while keeping the schedule position.
    pub fn pause(&self) -> Result<()> {
        self.shared
            .try_transition(&[EngineState::Running], EngineState::Paused, "pause")?;
        self.control.send_modify(|signal| signal.paused = true);
        info!("automation paused");
        Ok(())
    }

    /// Resume executing actions after a pause.
    pub fn resume(&self) -> Result<()> {
        self.shared
            .try_transition(&[EngineState::Paused], EngineState::Running, "resume")?;
        self.control.send_modify(|signal| signal.paused = false);
        info!("automation resumed");
        Ok(())
    }
}

/// Everything the worker owns for one run.
struct WorkerContext {
    shared: Arc<Shared>,
    sender: Arc<dyn ActionSender>,
    control: watch::Receiver<ControlSignal>,
    cooldown: Duration,
    schedule: Schedule,
}

/// Why the worker loop ended.
enum LoopExit {
    StopRequested,
    Drained,
    FailSafe { action: String },
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopRequested => f.write_str("stop requested"),
            Self::Drained => f.write_str("schedule drained"),
            Self::FailSafe { action } => {
                write!(f, "fail-safe triggered by action '{action}'")
            }
        }
    }
}

enum WaitOutcome {
    Elapsed,
    Interrupted,
}

async fn worker_main(mut context: WorkerContext, ready: oneshot::Sender<()>) {
    let _ = ready.send(());
    let shared = Arc::clone(&context.shared);
    match AssertUnwindSafe(run_loop(&mut context)).catch_unwind().await {
        Ok(exit) => {
            info!(reason = %exit, "worker exited");
            shared.transition_to_stopped();
        }
        Err(_) => {
            error!("worker panicked");
            shared.force_transition(EngineState::Error);
        }
    }
}

async fn run_loop(context: &mut WorkerContext) -> LoopExit {
    let mut consecutive_failures: HashMap<String, u32> = HashMap::new();
    let mut last_fire: Option<Instant> = None;

    loop {
        if context.control.borrow().stop {
            return LoopExit::StopRequested;
        }
        let Some(entry) = context.schedule.pop() else {
            return LoopExit::Drained;
        };

        // The global cooldown wins over the action's own schedule.
        let mut deadline = entry.fire_at;
        if let Some(last) = last_fire {
            deadline = deadline.max(last + context.cooldown);
        }
        if let WaitOutcome::Interrupted = wait_until(&mut context.control, deadline).await {
            return LoopExit::StopRequested;
        }

        let action = entry.action;
        let delivered = send_guarded(context.sender.as_ref(), &action.id);
        let now = Instant::now();

        if delivered {
            lock(&context.shared.stats).record_success();
            last_fire = Some(now);
            consecutive_failures.remove(&action.id);
            debug!(action = %action.id, "action fired");
        } else {
            lock(&context.shared.stats)
                .record_failure(format!("send failed for action '{}'", action.id), now);
            let failures = consecutive_failures.entry(action.id.clone()).or_insert(0);
            *failures += 1;
            warn!(action = %action.id, consecutive = *failures, "action send failed");
            if *failures >= action.max_consecutive_failures {
                warn!(
                    action = %action.id,
                    limit = action.max_consecutive_failures,
                    "consecutive failure limit reached, stopping automation"
                );
                return LoopExit::FailSafe { action: action.id };
            }
        }

        if context.schedule.len() >= MAX_LIVE_ENTRIES {
            warn!(
                action = %action.id,
                entries = context.schedule.len(),
                "schedule is at capacity, skipping re-insertion"
            );
        } else {
            let interval = action.interval;
            context.schedule.push(action, now + interval);
        }
    }
}

/// Deliver one event, treating a panicking sender as a failed send.
fn send_guarded(sender: &dyn ActionSender, action_id: &str) -> bool {
    std::panic::catch_unwind(AssertUnwindSafe(|| sender.send(action_id))).unwrap_or_else(|_| {
        error!(action = %action_id, "sender panicked, recording failed send");
        false
    })
}

/// The single interruptible wait shared by every suspension point.
///
/// Returns `Elapsed` once `deadline` has passed and the engine is not
/// paused; returns `Interrupted` as soon as a stop is signaled or the
/// control channel is closed (engine dropped).
async fn wait_until(
    control: &mut watch::Receiver<ControlSignal>,
    deadline: Instant,
) -> WaitOutcome {
    loop {
        let signal = *control.borrow_and_update();
        if signal.stop {
            return WaitOutcome::Interrupted;
        }
        if signal.paused {
            if control.changed().await.is_err() {
                return WaitOutcome::Interrupted;
            }
            continue;
        }
        if Instant::now() >= deadline {
            return WaitOutcome::Elapsed;
        }
        tokio::select! {
            changed = control.changed() => {
                if changed.is_err() {
                    return WaitOutcome::Interrupted;
                }
            }
            () = tokio::time::sleep_until(deadline) => {}
        }
    }
}
