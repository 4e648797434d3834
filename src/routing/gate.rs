use super::policy::{RouteClass, RoutePolicy};
use crate::config::RouteConfig;
use crate::coordinator::{CoordinatorStatus, LifecycleSnapshot};
use serde::Serialize;
use std::fmt;

/// What the page layer should render for a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteDecision {
    Destination,
    OfflinePrompt,
    StartingOverlay,
    CheckingOverlay,
}

impl RouteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Destination => "destination",
            RouteDecision::OfflinePrompt => "offlinePrompt",
            RouteDecision::StartingOverlay => "startingOverlay",
            RouteDecision::CheckingOverlay => "checkingOverlay",
        }
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Navigation gate over coordinator availability. Pure: no I/O.
#[derive(Debug, Clone, Default)]
pub struct RouteGate {
    policy: RoutePolicy,
}

impl RouteGate {
    pub fn new(policy: RoutePolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &RouteConfig) -> Self {
        Self::new(RoutePolicy::new(config))
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        self.policy.classify(path)
    }

    /// Decide what to render for `path`. `required` is false when the caller
    /// mounts the gate on a page that never needs the coordinator.
    pub fn decide(&self, path: &str, lifecycle: &LifecycleSnapshot, required: bool) -> RouteDecision {
        if !required || !self.classify(path).requires_coordinator() {
            return RouteDecision::Destination;
        }

        if lifecycle.status == CoordinatorStatus::Online && lifecycle.app_ready {
            return RouteDecision::Destination;
        }

        if lifecycle.status == CoordinatorStatus::Offline && !lifecycle.is_waking {
            return RouteDecision::OfflinePrompt;
        }

        if lifecycle.status == CoordinatorStatus::Starting || lifecycle.is_waking {
            return RouteDecision::StartingOverlay;
        }

        if lifecycle.status == CoordinatorStatus::Unknown {
            return RouteDecision::CheckingOverlay;
        }

        // Fail open rather than block navigation on an unclassified combination
        RouteDecision::Destination
    }
}
