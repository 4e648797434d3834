use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::{HttpControlPlane, StatusProbe, WakeRequester, WakeResult};
use super::poller::{LifecyclePoller, PollOutcome, PollSettings, PollTarget, PollerState};
use super::status::{CoordinatorStatus, StatusDetail};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result, StagehandError};
use crate::events::{EventBus, LifecycleEvent, DEFAULT_EVENT_CAPACITY};

/// Outcome of a single status check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCheck {
    pub status: CoordinatorStatus,
    pub success: bool,
}

/// Read-only copy of the lifecycle state handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSnapshot {
    pub status: CoordinatorStatus,
    pub app_ready: bool,
    pub is_waking: bool,
    pub is_available: bool,
    pub error: Option<String>,
    pub detail: Option<StatusDetail>,
    pub poll_started_at: Option<DateTime<Utc>>,
    /// Rough countdown in seconds while waking. Never drives control flow.
    pub estimated_time_remaining: Option<u64>,
    pub poller: PollerState,
}

impl LifecycleSnapshot {
    /// Snapshot with only the fields route gating looks at
    pub fn from_parts(
        status: CoordinatorStatus,
        app_ready: bool,
        is_waking: bool,
        error: Option<String>,
    ) -> Self {
        Self {
            status,
            app_ready,
            is_waking,
            is_available: status == CoordinatorStatus::Online && app_ready,
            error,
            detail: None,
            poll_started_at: None,
            estimated_time_remaining: None,
            poller: if is_waking {
                PollerState::Running
            } else {
                PollerState::Idle
            },
        }
    }
}

#[derive(Debug, Clone)]
struct LifecycleSession {
    status: CoordinatorStatus,
    app_ready: bool,
    is_waking: bool,
    error: Option<String>,
    detail: Option<StatusDetail>,
    poll_started_at: Option<DateTime<Utc>>,
    poll_started: Option<Instant>,
    poll_generation: Option<u64>,
    wake_attempt: u64,
}

impl LifecycleSession {
    fn new() -> Self {
        Self {
            status: CoordinatorStatus::Unknown,
            app_ready: false,
            is_waking: false,
            error: None,
            detail: None,
            poll_started_at: None,
            poll_started: None,
            poll_generation: None,
            wake_attempt: 0,
        }
    }

    fn is_available(&self) -> bool {
        self.status == CoordinatorStatus::Online && self.app_ready
    }

    fn begin_poll_clock(&mut self) -> Instant {
        let started = Instant::now();
        self.poll_started = Some(started);
        self.poll_started_at = Some(Utc::now());
        started
    }

    fn end_wake(&mut self) {
        self.is_waking = false;
        self.poll_started = None;
        self.poll_started_at = None;
        self.poll_generation = None;
    }

    fn set_status(&mut self, status: CoordinatorStatus, events: &mut Vec<LifecycleEvent>) {
        if self.status != status {
            events.push(LifecycleEvent::StatusChanged {
                from: self.status,
                to: status,
                timestamp: SystemTime::now(),
            });
            self.status = status;
        }
    }

    fn estimated_time_remaining(&self, max_duration: Duration) -> Option<u64> {
        if !self.is_waking {
            return None;
        }
        let started = self.poll_started?;
        let remaining = max_duration.saturating_sub(started.elapsed());
        let rounded_up = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Some(rounded_up)
    }
}

/// What a probe result did to an in-flight wake
enum WakeEffect {
    None,
    Ready,
    Aborted,
}

struct LifecycleInner {
    session: RwLock<LifecycleSession>,
    probe: Arc<dyn StatusProbe>,
    waker: Arc<dyn WakeRequester>,
    poller: LifecyclePoller,
    events: EventBus,
    disposed: AtomicBool,
    this: Weak<LifecycleInner>,
}

impl LifecycleInner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn publish_all(&self, events: Vec<LifecycleEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }

    fn snapshot(&self) -> LifecycleSnapshot {
        let session = self.session.read();
        LifecycleSnapshot {
            status: session.status,
            app_ready: session.app_ready,
            is_waking: session.is_waking,
            is_available: session.is_available(),
            error: session.error.clone(),
            detail: session.detail.clone(),
            poll_started_at: session.poll_started_at,
            estimated_time_remaining: session
                .estimated_time_remaining(self.poller.settings().max_duration),
            poller: self.poller.state(),
        }
    }

    async fn check_status(&self) -> StatusCheck {
        let result = self.probe.probe().await;

        if self.is_disposed() {
            debug!("Discarding status probe result after dispose");
            return StatusCheck {
                status: self.session.read().status,
                success: result.is_ok(),
            };
        }

        let (check, effect) = self.apply_probe(result, None);
        match effect {
            WakeEffect::Ready => {
                self.poller.stop_with_success();
            }
            WakeEffect::Aborted => {
                self.poller.stop();
            }
            WakeEffect::None => {}
        }
        check
    }

    /// Fold one probe result into the session. `generation` is set for poll
    /// ticks; results from a run that is no longer current are ignored.
    fn apply_probe(
        &self,
        result: std::result::Result<StatusDetail, CoordinatorError>,
        generation: Option<u64>,
    ) -> (StatusCheck, WakeEffect) {
        let mut events = Vec::new();
        let mut session = self.session.write();

        if let Some(generation) = generation {
            if session.poll_generation != Some(generation) {
                debug!("Ignoring result from stale poll run {}", generation);
                let check = StatusCheck {
                    status: session.status,
                    success: result.is_ok(),
                };
                return (check, WakeEffect::Aborted);
            }
        }

        let mut effect = WakeEffect::None;
        let success = result.is_ok();

        match result {
            Ok(detail) => {
                let classified = detail.status();
                let app_ready = detail.app_ready && classified != CoordinatorStatus::Offline;
                debug!(
                    state = %detail.state,
                    app_ready = detail.app_ready,
                    "Coordinator classified as {}",
                    classified
                );

                session.error = None;
                session.detail = Some(detail);

                if session.is_waking {
                    if classified == CoordinatorStatus::Online && app_ready {
                        session.set_status(CoordinatorStatus::Online, &mut events);
                        session.app_ready = true;
                        session.end_wake();
                        events.push(LifecycleEvent::CoordinatorReady {
                            timestamp: SystemTime::now(),
                        });
                        effect = WakeEffect::Ready;
                    } else if session.poll_generation.is_some() {
                        // An accepted wake holds at starting until ready or timeout,
                        // even if the control plane still lags with "stopped"
                        session.set_status(CoordinatorStatus::Starting, &mut events);
                        session.app_ready = app_ready;
                    } else {
                        // Wake request still in flight: nothing accepted yet
                        session.set_status(classified, &mut events);
                        session.app_ready = app_ready;
                    }
                } else {
                    session.set_status(classified, &mut events);
                    session.app_ready = app_ready;
                }
            }
            Err(error) => {
                let message = error.to_string();
                warn!("Coordinator unreachable: {}", message);

                session.set_status(CoordinatorStatus::Offline, &mut events);
                session.app_ready = false;
                session.error = Some(message.clone());
                events.push(LifecycleEvent::ProbeFailed { error: message });

                if session.is_waking {
                    session.end_wake();
                    effect = WakeEffect::Aborted;
                }
            }
        }

        let check = StatusCheck {
            status: session.status,
            success,
        };
        drop(session);

        self.publish_all(events);
        (check, effect)
    }

    async fn wake(&self) -> std::result::Result<WakeResult, CoordinatorError> {
        let attempt = {
            let mut session = self.session.write();
            if self.is_disposed() {
                return Err(CoordinatorError::unreachable(
                    "Coordinator lifecycle has been disposed",
                ));
            }
            if session.is_waking {
                debug!("Wake already in progress, ignoring request");
                return Err(CoordinatorError::AlreadyWaking);
            }

            session.is_waking = true;
            session.error = None;
            session.begin_poll_clock();
            session.wake_attempt += 1;
            session.wake_attempt
        };

        info!("Requesting coordinator wake");
        self.events.publish(LifecycleEvent::WakeRequested {
            timestamp: SystemTime::now(),
        });

        let result = self.waker.request_wake().await;

        let mut events = Vec::new();
        let mut session = self.session.write();

        if self.is_disposed() || !session.is_waking || session.wake_attempt != attempt {
            debug!("Wake attempt {} superseded, discarding its result", attempt);
            return result;
        }

        match &result {
            Ok(wake) if wake.already_running => {
                info!("Coordinator already running");
                session.set_status(CoordinatorStatus::Online, &mut events);
                session.app_ready = true;
                session.end_wake();
                events.push(LifecycleEvent::CoordinatorReady {
                    timestamp: SystemTime::now(),
                });
            }
            Ok(wake) => {
                session.set_status(CoordinatorStatus::Starting, &mut events);
                session.app_ready = false;
                let started = session.begin_poll_clock();
                let target: Weak<dyn PollTarget> = self.this.clone();
                session.poll_generation = Some(self.poller.start(target, started));
                events.push(LifecycleEvent::WakeAccepted {
                    estimated_ready_seconds: wake.estimated_ready_seconds,
                });
            }
            Err(error) => {
                let message = error.to_string();
                session.error = Some(message.clone());
                session.end_wake();
                events.push(LifecycleEvent::WakeFailed { error: message });
            }
        }
        drop(session);

        self.publish_all(events);
        result
    }

    fn stop_polling(&self) {
        self.poller.stop();

        let was_waking = {
            let mut session = self.session.write();
            let was_waking = session.is_waking;
            session.end_wake();
            was_waking
        };

        if was_waking {
            info!("Coordinator wake polling stopped");
            self.events.publish(LifecycleEvent::PollingStopped);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.poller.stop();
        self.session.write().end_wake();
        debug!("Coordinator lifecycle disposed");
    }
}

#[async_trait]
impl PollTarget for LifecycleInner {
    async fn poll_tick(&self, generation: u64) -> PollOutcome {
        if self.is_disposed() {
            return PollOutcome::Abort;
        }

        let result = self.probe.probe().await;
        if self.is_disposed() {
            return PollOutcome::Abort;
        }

        match self.apply_probe(result, Some(generation)).1 {
            WakeEffect::None => PollOutcome::Pending,
            WakeEffect::Ready => PollOutcome::Ready,
            WakeEffect::Aborted => PollOutcome::Abort,
        }
    }

    fn poll_timed_out(&self, generation: u64, waited: Duration) {
        let message = {
            let mut session = self.session.write();
            if session.poll_generation != Some(generation) {
                return;
            }
            let message = CoordinatorError::Timeout {
                waited: self.poller.settings().max_duration,
            }
            .to_string();
            session.error = Some(message.clone());
            session.end_wake();
            message
        };

        warn!("{}", message);
        self.events.publish(LifecycleEvent::PollTimedOut {
            waited_seconds: waited.as_secs(),
        });
    }
}

/// Client-side state machine for the remote coordinator.
///
/// Owns the session exclusively; consumers read [`LifecycleSnapshot`]s or
/// subscribe to [`LifecycleEvent`]s. Dropping the lifecycle cancels any poll.
pub struct CoordinatorLifecycle {
    inner: Arc<LifecycleInner>,
}

impl CoordinatorLifecycle {
    /// Create a lifecycle and run the initial status check
    pub async fn new(
        probe: Arc<dyn StatusProbe>,
        waker: Arc<dyn WakeRequester>,
        poll_settings: PollSettings,
    ) -> Self {
        Self::with_event_capacity(probe, waker, poll_settings, DEFAULT_EVENT_CAPACITY).await
    }

    async fn with_event_capacity(
        probe: Arc<dyn StatusProbe>,
        waker: Arc<dyn WakeRequester>,
        poll_settings: PollSettings,
        event_capacity: usize,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| LifecycleInner {
            session: RwLock::new(LifecycleSession::new()),
            probe,
            waker,
            poller: LifecyclePoller::new(poll_settings),
            events: EventBus::new(event_capacity),
            disposed: AtomicBool::new(false),
            this: this.clone(),
        });

        let lifecycle = Self { inner };
        lifecycle.check_status().await;
        lifecycle
    }

    /// Create a lifecycle talking to the configured control-plane endpoints
    pub async fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        let control_plane = Arc::new(HttpControlPlane::new(config)?);
        let poll_settings = PollSettings {
            interval: config.poll_interval(),
            max_duration: config.max_poll_duration(),
        };

        info!(
            "Coordinator status endpoint: {}, wake endpoint: {}",
            control_plane.status_endpoint(),
            control_plane.wake_endpoint()
        );

        Ok(Self::new(control_plane.clone(), control_plane, poll_settings).await)
    }

    pub fn builder() -> CoordinatorLifecycleBuilder {
        CoordinatorLifecycleBuilder::new()
    }

    /// Probe once and fold the result into the session
    pub async fn check_status(&self) -> StatusCheck {
        self.inner.check_status().await
    }

    /// Ask the control plane to start the coordinator
    pub async fn wake(&self) -> std::result::Result<WakeResult, CoordinatorError> {
        self.inner.wake().await
    }

    /// Abandon an in-flight wake without touching status or error
    pub fn stop_polling(&self) {
        self.inner.stop_polling();
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.inner.snapshot()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.session.read().status
    }

    pub fn is_available(&self) -> bool {
        self.inner.session.read().is_available()
    }

    pub fn is_waking(&self) -> bool {
        self.inner.session.read().is_waking
    }

    pub fn error(&self) -> Option<String> {
        self.inner.session.read().error.clone()
    }

    pub fn estimated_time_remaining(&self) -> Option<u64> {
        self.inner
            .session
            .read()
            .estimated_time_remaining(self.inner.poller.settings().max_duration)
    }

    pub fn poller_state(&self) -> PollerState {
        self.inner.poller.state()
    }

    /// Clear the last observed detail payload
    pub fn reset_detail(&self) {
        self.inner.session.write().detail = None;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel polling and discard any results still in flight
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl Drop for CoordinatorLifecycle {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

/// Builder for [`CoordinatorLifecycle`]
pub struct CoordinatorLifecycleBuilder {
    probe: Option<Arc<dyn StatusProbe>>,
    waker: Option<Arc<dyn WakeRequester>>,
    poll_settings: PollSettings,
    event_capacity: usize,
}

impl CoordinatorLifecycleBuilder {
    pub fn new() -> Self {
        Self {
            probe: None,
            waker: None,
            poll_settings: PollSettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn status_probe(mut self, probe: Arc<dyn StatusProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn wake_requester(mut self, waker: Arc<dyn WakeRequester>) -> Self {
        self.waker = Some(waker);
        self
    }

    /// Use one control plane for both probing and waking
    pub fn control_plane<C>(self, control_plane: Arc<C>) -> Self
    where
        C: StatusProbe + WakeRequester + 'static,
    {
        self.status_probe(control_plane.clone())
            .wake_requester(control_plane)
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_settings.interval = interval;
        self
    }

    pub fn max_poll_duration(mut self, max_duration: Duration) -> Self {
        self.poll_settings.max_duration = max_duration;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the lifecycle and run the initial status check
    pub async fn build(self) -> Result<CoordinatorLifecycle> {
        let probe = self
            .probe
            .ok_or_else(|| StagehandError::system("Status probe must be specified"))?;
        let waker = self
            .waker
            .ok_or_else(|| StagehandError::system("Wake requester must be specified"))?;

        if self.poll_settings.interval.is_zero() {
            return Err(StagehandError::system("Poll interval must be greater than 0"));
        }

        Ok(CoordinatorLifecycle::with_event_capacity(
            probe,
            waker,
            self.poll_settings,
            self.event_capacity,
        )
        .await)
    }
}

impl Default for CoordinatorLifecycleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
