//! bus-motion: route motion engine for school bus tracking.
//!
//! Turns an ordered list of stops into a continuously moving vehicle, either
//! by simulating travel along the route or by smoothing polled positions.

pub mod traits;
pub mod haversine;
pub mod heading;
pub mod polyline;
pub mod path;
pub mod route;
pub mod dwell;
pub mod simulation;
pub mod smoother;
pub mod timer;
pub mod tracker;
pub mod remote;
pub mod fleet;
