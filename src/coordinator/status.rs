use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse reachability state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorStatus {
    Online,
    Offline,
    Starting,
    Unknown,
}

impl CoordinatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorStatus::Online => "online",
            CoordinatorStatus::Offline => "offline",
            CoordinatorStatus::Starting => "starting",
            CoordinatorStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status payload as returned by the control plane
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatusResponse {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub app_ready: bool,
    pub public_ip: Option<String>,
    pub uptime: Option<f64>,
    pub idle_minutes: Option<f64>,
    pub launch_time: Option<DateTime<Utc>>,
    pub firebase: Option<String>,
    pub cached: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Last observed coordinator detail. Replaced wholesale on each successful probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetail {
    pub state: String,
    pub app_ready: bool,
    pub public_ip: Option<String>,
    pub uptime_seconds: Option<f64>,
    pub idle_minutes: Option<f64>,
    pub launch_time: Option<DateTime<Utc>>,
    pub backend_health: Option<String>,
    pub cached: Option<bool>,
    pub observed_at: DateTime<Utc>,
}

impl StatusDetail {
    /// Build a detail record, falling back to `now` when the server sent no timestamp
    pub fn from_raw(raw: RawStatusResponse, now: DateTime<Utc>) -> Self {
        Self {
            state: raw.state,
            app_ready: raw.app_ready,
            public_ip: raw.public_ip,
            uptime_seconds: raw.uptime,
            idle_minutes: raw.idle_minutes,
            launch_time: raw.launch_time,
            backend_health: raw.firebase,
            cached: raw.cached,
            observed_at: raw.timestamp.unwrap_or(now),
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        classify(&self.state, self.app_ready)
    }
}

/// Map a raw control-plane state onto a coordinator status
pub fn classify(state: &str, app_ready: bool) -> CoordinatorStatus {
    match state {
        "stopped" => CoordinatorStatus::Offline,
        "running" if app_ready => CoordinatorStatus::Online,
        "running" | "pending" => CoordinatorStatus::Starting,
        _ => CoordinatorStatus::Unknown,
    }
}
