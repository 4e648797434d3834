use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Poller run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Running,
    StoppedSuccess,
    StoppedTimeout,
    StoppedManual,
}

/// Result of one poll tick as judged by the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep polling
    Pending,
    /// Coordinator is available; stop with success
    Ready,
    /// Owner gave up on this run; stop without success
    Abort,
}

/// Owner of a poll run. Each call carries the run generation so late results
/// from a replaced run can be discarded.
#[async_trait]
pub trait PollTarget: Send + Sync + 'static {
    async fn poll_tick(&self, generation: u64) -> PollOutcome;

    fn poll_timed_out(&self, generation: u64, waited: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_duration: Duration::from_secs(120),
        }
    }
}

struct ActiveRun {
    generation: u64,
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

struct PollerShared {
    state: Mutex<PollerState>,
    active: Mutex<Option<ActiveRun>>,
}

impl PollerShared {
    /// End the run identified by `generation` (or whichever run is active when
    /// `None`). Returns false if that run is no longer the active one.
    fn finish(&self, generation: Option<u64>, outcome: PollerState) -> bool {
        let mut active = self.active.lock();
        let matches = match (active.as_ref(), generation) {
            (Some(run), Some(generation)) => run.generation == generation,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !matches {
            return false;
        }

        if let Some(run) = active.take() {
            run.token.cancel();
            debug!("Poll run {} finished: {:?}", run.generation, outcome);
        }
        *self.state.lock() = outcome;
        true
    }
}

/// Repeating status poll with at most one active timer
pub struct LifecyclePoller {
    settings: PollSettings,
    shared: Arc<PollerShared>,
    next_generation: AtomicU64,
}

impl LifecyclePoller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(PollerShared {
                state: Mutex::new(PollerState::Idle),
                active: Mutex::new(None),
            }),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn state(&self) -> PollerState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Start a run measured from `started_at`, replacing any active run.
    /// Returns the new run's generation.
    pub fn start(&self, target: Weak<dyn PollTarget>, started_at: Instant) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut active = self.shared.active.lock();
        if let Some(previous) = active.take() {
            debug!(
                "Stopping poll run {} before starting {}",
                previous.generation, generation
            );
            previous.token.cancel();
        }

        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            target,
            self.settings,
            generation,
            started_at,
            token.clone(),
        ));

        *active = Some(ActiveRun {
            generation,
            token,
            _handle: handle,
        });
        *self.shared.state.lock() = PollerState::Running;

        info!(
            "Polling coordinator every {:?} for up to {:?}",
            self.settings.interval, self.settings.max_duration
        );
        generation
    }

    /// Cancel the active run, if any
    pub fn stop(&self) -> bool {
        self.shared.finish(None, PollerState::StoppedManual)
    }

    /// Stop the active run because the owner already observed readiness
    pub(crate) fn stop_with_success(&self) -> bool {
        self.shared.finish(None, PollerState::StoppedSuccess)
    }
}

impl Drop for LifecyclePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    shared: Arc<PollerShared>,
    target: Weak<dyn PollTarget>,
    settings: PollSettings,
    generation: u64,
    started_at: Instant,
    token: CancellationToken,
) {
    let deadline = started_at + settings.max_duration;
    let mut ticker = interval_at(started_at + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // The deadline is a hard cutoff even when the interval does not divide it
        let mut expired = tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep_until(deadline) => true,
            _ = ticker.tick() => false,
        };

        let Some(target) = target.upgrade() else {
            shared.finish(Some(generation), PollerState::StoppedManual);
            break;
        };

        if !expired && started_at.elapsed() < settings.max_duration {
            // The next tick is not awaited until this probe resolves
            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep_until(deadline) => None,
                outcome = target.poll_tick(generation) => Some(outcome),
            };

            match outcome {
                Some(PollOutcome::Pending) => continue,
                Some(PollOutcome::Ready) => {
                    shared.finish(Some(generation), PollerState::StoppedSuccess);
                    break;
                }
                Some(PollOutcome::Abort) => {
                    shared.finish(Some(generation), PollerState::StoppedManual);
                    break;
                }
                None => expired = true,
            }
        }

        if expired || started_at.elapsed() >= settings.max_duration {
            if shared.finish(Some(generation), PollerState::StoppedTimeout) {
                target.poll_timed_out(generation, started_at.elapsed());
            }
            break;
        }
    }
}
