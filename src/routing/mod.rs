mod gate;
mod policy;


pub use gate::{RouteDecision, RouteGate};
pub use policy::{RouteClass, RoutePolicy};
