mod client;
mod lifecycle;
mod mock;
mod poller;
mod status;


pub use client::{HttpControlPlane, StatusProbe, WakeRequester, WakeResult};
pub use lifecycle::{
    CoordinatorLifecycle, CoordinatorLifecycleBuilder, LifecycleSnapshot, StatusCheck,
};
pub use mock::{status_detail, MockControlPlane};
pub use poller::{LifecyclePoller, PollOutcome, PollSettings, PollTarget, PollerState};
pub use status::{classify, CoordinatorStatus, RawStatusResponse, StatusDetail};
