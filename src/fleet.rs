//! Headless replay of many routes at once.
//!
//! Each route gets its own [`Simulation`] on a virtual clock, so runs are
//! independent and can go wide on the rayon pool.

use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::route::Route;
use crate::simulation::{MotionConfig, Replay, Simulation, SimulationError};

/// Upper bound on ticks per replay; roughly 33 hours at the default interval.
pub const MAX_REPLAY_TICKS: usize = 1_000_000;

/// Replay a single route to completion.
pub fn replay_route(route: &Route, config: &MotionConfig) -> Result<Replay, SimulationError> {
    let start = Instant::now();
    let mut simulation = Simulation::new(route, config.clone(), start)?;
    let replay = simulation.replay(start, MAX_REPLAY_TICKS);
    debug!(
        frames = replay.frames.len(),
        dwells = replay.dwell_intervals,
        "route replayed"
    );
    Ok(replay)
}

/// Replay every route in parallel. Results keep the input order.
pub fn replay_fleet(routes: &[Route], config: &MotionConfig) -> Vec<Result<Replay, SimulationError>> {
    routes
        .par_iter()
        .map(|route| replay_route(route, config))
        .collect()
}
