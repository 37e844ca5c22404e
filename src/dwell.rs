//! Stop dwelling.
//!
//! The bus pauses briefly at each house it passes. The controller is a
//! three-state machine evaluated once per tick against the current arc-length.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::route::RoutePath;
use crate::traits::WaypointKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Moving,
    Dwelling,
    Finished,
}

#[derive(Debug, Clone)]
pub struct DwellController {
    radius_m: f64,
    duration: Duration,
    state: MotionState,
    dwell_until: Option<Instant>,
    /// Nodes already dwelt at; a stop holds the bus once per run.
    visited: Vec<usize>,
}

impl DwellController {
    pub fn new(radius_m: f64, duration: Duration) -> Self {
        Self {
            radius_m,
            duration,
            state: MotionState::Moving,
            dwell_until: None,
            visited: Vec::new(),
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn dwell_until(&self) -> Option<Instant> {
        self.dwell_until
    }

    /// Number of dwells entered so far.
    pub fn dwell_count(&self) -> usize {
        self.visited.len()
    }

    /// State as seen at `now`, without applying any transition.
    pub fn state_at(&self, now: Instant) -> MotionState {
        match (self.state, self.dwell_until) {
            (MotionState::Dwelling, Some(until)) if now >= until => MotionState::Moving,
            (state, _) => state,
        }
    }

    pub fn is_dwelling_at(&self, now: Instant) -> bool {
        self.state_at(now) == MotionState::Dwelling
    }

    /// Release an expired dwell. Returns true while the bus must stay put.
    pub fn hold(&mut self, now: Instant) -> bool {
        if self.state != MotionState::Dwelling {
            return false;
        }
        if self.is_dwelling_at(now) {
            return true;
        }

        debug!("dwell over, moving on");
        self.state = MotionState::Moving;
        self.dwell_until = None;
        false
    }

    /// Apply `Moving -> Dwelling` and `Moving -> Finished` for arc-length `s`
    /// reached at tick time `now`.
    pub fn evaluate(&mut self, path: &RoutePath, s: f64, now: Instant) -> MotionState {
        if self.state != MotionState::Moving {
            return self.state;
        }

        if s >= path.index.total_length() {
            debug!(arc_length = s, "route finished");
            self.state = MotionState::Finished;
            self.dwell_until = None;
            return self.state;
        }

        let Some(stop) = path.nearest_stop(s) else {
            return self.state;
        };
        let should_dwell = stop.kind == WaypointKind::House
            && !path.is_terminal(stop)
            && (stop.arc_length - s).abs() < self.radius_m
            && !self.visited.contains(&stop.node);

        if should_dwell {
            debug!(stop = %stop.name, node = stop.node, "dwelling at stop");
            self.visited.push(stop.node);
            self.state = MotionState::Dwelling;
            self.dwell_until = Some(now + self.duration);
        }

        self.state
    }
}
