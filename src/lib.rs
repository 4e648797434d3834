pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod routing;

#[cfg(feature = "http-api")]
pub mod api;

pub use config::{CoordinatorConfig, RouteConfig, ServerConfig, StagehandConfig};
pub use coordinator::{
    CoordinatorLifecycle, CoordinatorLifecycleBuilder, CoordinatorStatus, HttpControlPlane,
    LifecyclePoller, LifecycleSnapshot, MockControlPlane, PollSettings, PollerState, StatusDetail,
    StatusProbe, WakeRequester, WakeResult,
};
pub use error::{CoordinatorError, Result, StagehandError};
pub use events::{EventBus, LifecycleEvent};
pub use routing::{RouteClass, RouteDecision, RouteGate, RoutePolicy};

#[cfg(feature = "http-api")]
pub use api::{ApiServer, ApiServerBuilder, ApiState};
