//! Local route simulation.
//!
//! [`Simulation`] is the caller-owned state of one simulated run. It holds no
//! timer; whoever owns it calls [`Simulation::tick`] with the wall-clock time
//! of each tick. That keeps it fully testable without threads or a renderer.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dwell::{DwellController, MotionState};
use crate::heading::bearing_deg;
use crate::route::{Route, RouteError, RoutePath};
use crate::traits::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Simulated bus speed in meters per second.
    pub speed_mps: f64,
    /// Interval of the recurring tick.
    pub tick_interval_ms: u64,
    /// Lower bound for the measured time between ticks.
    pub min_tick_ms: u64,
    /// Distance to a house stop under which the bus starts dwelling.
    pub dwell_radius_m: f64,
    /// How long a dwell lasts.
    pub dwell_ms: u64,
    /// Forward offset of the point used to orient the vehicle.
    pub lookahead_m: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_mps: 10.0,
            tick_interval_ms: 120,
            min_tick_ms: 16,
            dwell_radius_m: 6.0,
            dwell_ms: 2_000,
            lookahead_m: 12.0,
        }
    }
}

impl MotionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn min_tick(&self) -> Duration {
        Duration::from_millis(self.min_tick_ms)
    }

    pub fn dwell_duration(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    /// Reject settings that would stall the bus, run it backwards, or spin
    /// the tick timer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.speed_mps.is_finite() || self.speed_mps <= 0.0 {
            return Err(ConfigError::NonPositiveSpeed);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if !self.dwell_radius_m.is_finite() || self.dwell_radius_m < 0.0 {
            return Err(ConfigError::NegativeDwellRadius);
        }
        if !self.lookahead_m.is_finite() || self.lookahead_m < 0.0 {
            return Err(ConfigError::NegativeLookahead);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NonPositiveSpeed,
    ZeroTickInterval,
    NegativeDwellRadius,
    NegativeLookahead,
    ZeroPollInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveSpeed => write!(f, "speed_mps must be a positive number"),
            ConfigError::ZeroTickInterval => write!(f, "tick_interval_ms must be greater than 0"),
            ConfigError::NegativeDwellRadius => write!(f, "dwell_radius_m must be 0 or more"),
            ConfigError::NegativeLookahead => write!(f, "lookahead_m must be 0 or more"),
            ConfigError::ZeroPollInterval => write!(f, "poll_interval_ms must be greater than 0"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Why a simulation could not be set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationError {
    Route(RouteError),
    Config(ConfigError),
}

impl From<RouteError> for SimulationError {
    fn from(err: RouteError) -> Self {
        SimulationError::Route(err)
    }
}

impl From<ConfigError> for SimulationError {
    fn from(err: ConfigError) -> Self {
        SimulationError::Config(err)
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Route(err) => write!(f, "{}", err),
            SimulationError::Config(err) => write!(f, "invalid motion config: {}", err),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Route(err) => Some(err),
            SimulationError::Config(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Simulation {
    path: RoutePath,
    config: MotionConfig,
    dwell: DwellController,
    arc_length: f64,
    heading: f64,
    last_tick: Instant,
    last_frame: Frame,
}

impl Simulation {
    /// Prepare a run starting at the beginning of the route at time `start`.
    pub fn new(
        route: &Route,
        config: MotionConfig,
        start: Instant,
    ) -> Result<Self, SimulationError> {
        let path = route.build()?;
        Ok(Self::from_path(path, config, start)?)
    }

    pub fn from_path(
        path: RoutePath,
        config: MotionConfig,
        start: Instant,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let dwell = DwellController::new(config.dwell_radius_m, config.dwell_duration());
        let mut simulation = Self {
            path,
            config,
            dwell,
            arc_length: 0.0,
            heading: 0.0,
            last_tick: start,
            last_frame: Frame {
                position: (0.0, 0.0),
                heading: 0.0,
                arc_length: 0.0,
                dwelling: false,
                finished: false,
            },
        };
        simulation.last_frame = simulation.compute_frame(start);
        Ok(simulation)
    }

    pub fn path(&self) -> &RoutePath {
        &self.path
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn arc_length(&self) -> f64 {
        self.arc_length
    }

    pub fn state(&self) -> MotionState {
        self.dwell.state()
    }

    pub fn dwell(&self) -> &DwellController {
        &self.dwell
    }

    pub fn is_finished(&self) -> bool {
        self.dwell.state() == MotionState::Finished
    }

    /// Most recently computed frame.
    pub fn frame(&self) -> Frame {
        self.last_frame
    }

    /// Advance the run to wall-clock time `now`.
    ///
    /// Finished runs are frozen: the final frame is returned unchanged.
    pub fn tick(&mut self, now: Instant) -> Frame {
        if self.is_finished() {
            return self.last_frame;
        }

        let dt = now
            .saturating_duration_since(self.last_tick)
            .max(self.config.min_tick());
        self.last_tick = now;

        if self.dwell.hold(now) {
            return self.last_frame;
        }

        let total = self.path.index.total_length();
        self.arc_length = (self.arc_length + self.config.speed_mps * dt.as_secs_f64()).min(total);
        self.dwell.evaluate(&self.path, self.arc_length, now);
        self.last_frame = self.compute_frame(now);
        self.last_frame
    }

    fn compute_frame(&mut self, now: Instant) -> Frame {
        let index = &self.path.index;
        let s = self.arc_length;
        let position = index.sample(s).unwrap_or(self.last_frame.position);

        let ahead = index.sample(s + self.config.lookahead_m).unwrap_or(position);
        if ahead != position {
            self.heading = bearing_deg(position, ahead);
        } else {
            // Lookahead collapsed at the end of the route; look behind.
            let behind = index.sample(s - self.config.lookahead_m).unwrap_or(position);
            if behind != position {
                self.heading = bearing_deg(behind, position);
            }
        }

        Frame {
            position,
            heading: self.heading,
            arc_length: s,
            dwelling: self.dwell.is_dwelling_at(now),
            finished: self.is_finished(),
        }
    }

    /// Run to completion on a virtual clock ticking every
    /// `tick_interval_ms`, starting from the current state at `start`.
    ///
    /// Stops after `max_ticks` ticks if the route has not finished by then.
    pub fn replay(&mut self, start: Instant, max_ticks: usize) -> Replay {
        let interval = self.config.tick_interval();
        let mut frames = vec![self.last_frame];
        let mut dwell_intervals = 0;
        let mut was_dwelling = self.last_frame.dwelling;
        let mut now = start;

        for _ in 0..max_ticks {
            if self.is_finished() {
                break;
            }
            now += interval;
            let frame = self.tick(now);
            if frame.dwelling && !was_dwelling {
                dwell_intervals += 1;
            }
            was_dwelling = frame.dwelling;
            frames.push(frame);
        }

        Replay {
            frames,
            dwell_intervals,
            duration: now.saturating_duration_since(start),
            finished: self.is_finished(),
        }
    }
}

/// Outcome of a headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    /// Initial frame followed by one frame per tick.
    pub frames: Vec<Frame>,
    /// Number of separate dwelling intervals observed.
    pub dwell_intervals: usize,
    /// Virtual time elapsed.
    pub duration: Duration,
    pub finished: bool,
}
