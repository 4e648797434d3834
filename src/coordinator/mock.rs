use super::client::{StatusProbe, WakeRequester, WakeResult};
use super::status::{RawStatusResponse, StatusDetail};
use crate::error::CoordinatorError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

type ProbeResult = Result<StatusDetail, CoordinatorError>;
type WakeResponse = Result<WakeResult, CoordinatorError>;

/// Status detail as the control plane would report it right now
pub fn status_detail(state: &str, app_ready: bool) -> StatusDetail {
    StatusDetail::from_raw(
        RawStatusResponse {
            state: state.to_string(),
            app_ready,
            ..Default::default()
        },
        Utc::now(),
    )
}

/// Scripted control plane for testing without a real coordinator.
///
/// Probes return queued results first, then the fallback.
pub struct MockControlPlane {
    queued: Mutex<VecDeque<ProbeResult>>,
    fallback: Mutex<ProbeResult>,
    wake_response: Mutex<WakeResponse>,
    probe_delay: Mutex<Duration>,
    wake_delay: Mutex<Duration>,
    probe_calls: AtomicUsize,
    wake_calls: AtomicUsize,
    probes_in_flight: AtomicUsize,
    max_probes_in_flight: AtomicUsize,
}

impl MockControlPlane {
    /// Mock reporting `fallback` on every probe and accepting wakes as pending
    pub fn new(fallback: ProbeResult) -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            wake_response: Mutex::new(Ok(WakeResult {
                already_running: false,
                estimated_ready_seconds: 75,
            })),
            probe_delay: Mutex::new(Duration::ZERO),
            wake_delay: Mutex::new(Duration::ZERO),
            probe_calls: AtomicUsize::new(0),
            wake_calls: AtomicUsize::new(0),
            probes_in_flight: AtomicUsize::new(0),
            max_probes_in_flight: AtomicUsize::new(0),
        })
    }

    /// Mock whose probes report `state`
    pub fn reporting(state: &str, app_ready: bool) -> Arc<Self> {
        Self::new(Ok(status_detail(state, app_ready)))
    }

    pub fn set_fallback(&self, result: ProbeResult) {
        *self.fallback.lock() = result;
    }

    pub fn report(&self, state: &str, app_ready: bool) {
        self.set_fallback(Ok(status_detail(state, app_ready)));
    }

    /// Serve `result` on the next probe only
    pub fn queue(&self, result: ProbeResult) {
        self.queued.lock().push_back(result);
    }

    pub fn set_wake_response(&self, response: WakeResponse) {
        *self.wake_response.lock() = response;
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock() = delay;
    }

    pub fn set_wake_delay(&self, delay: Duration) {
        *self.wake_delay.lock() = delay;
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn wake_calls(&self) -> usize {
        self.wake_calls.load(Ordering::SeqCst)
    }

    /// Highest number of probes observed running at once
    pub fn max_probes_in_flight(&self) -> usize {
        self.max_probes_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for MockControlPlane {
    async fn probe(&self) -> ProbeResult {
        let call = self.probe_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let in_flight = self.probes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_probes_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.probe_delay.lock();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.probes_in_flight.fetch_sub(1, Ordering::SeqCst);

        let queued = self.queued.lock().pop_front();
        let result = queued.unwrap_or_else(|| self.fallback.lock().clone());
        debug!("Mock status probe #{}: {:?}", call, result.as_ref().map(|d| &d.state));
        result
    }
}

#[async_trait]
impl WakeRequester for MockControlPlane {
    async fn request_wake(&self) -> WakeResponse {
        self.wake_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.wake_delay.lock();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.wake_response.lock().clone()
    }
}
