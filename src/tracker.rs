//! One tracked bus on one map.
//!
//! [`RouteTracker`] owns the timers and decides which driver may write the
//! displayed vehicle: the local simulation or the remote position feed. Only
//! one of them is ever live, selected by [`TrackingMode`].

use std::fmt;
use std::io;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::route::{Route, RouteError};
use crate::simulation::{ConfigError, MotionConfig, Simulation, SimulationError};
use crate::smoother::{RemoteSmoother, SmootherConfig};
use crate::timer::RepeatingTimer;
use crate::traits::{Fix, Frame, FrameSink, PositionProvider, RemoteControl, RouteCommand};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub motion: MotionConfig,
    pub smoother: SmootherConfig,
    /// How often the remote position provider is polled.
    pub poll_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            smoother: SmootherConfig::default(),
            poll_interval_ms: 1_000,
        }
    }
}

/// Which driver currently owns the displayed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingMode {
    Idle,
    Simulating,
    Remote,
}

#[derive(Debug)]
pub enum TrackerError {
    Route(RouteError),
    Config(ConfigError),
    Timer(io::Error),
}

impl From<RouteError> for TrackerError {
    fn from(err: RouteError) -> Self {
        TrackerError::Route(err)
    }
}

impl From<ConfigError> for TrackerError {
    fn from(err: ConfigError) -> Self {
        TrackerError::Config(err)
    }
}

impl From<SimulationError> for TrackerError {
    fn from(err: SimulationError) -> Self {
        match err {
            SimulationError::Route(err) => TrackerError::Route(err),
            SimulationError::Config(err) => TrackerError::Config(err),
        }
    }
}

impl From<io::Error> for TrackerError {
    fn from(err: io::Error) -> Self {
        TrackerError::Timer(err)
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Route(err) => write!(f, "{}", err),
            TrackerError::Config(err) => write!(f, "invalid tracker config: {}", err),
            TrackerError::Timer(err) => write!(f, "could not start timer: {}", err),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Route(err) => Some(err),
            TrackerError::Config(err) => Some(err),
            TrackerError::Timer(err) => Some(err),
        }
    }
}

struct Shared {
    mode: TrackingMode,
    simulation: Option<Simulation>,
    smoother: RemoteSmoother,
    last_frame: Option<Frame>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The frame sink plus the lock that keeps emissions in state order.
struct Output {
    sink: Box<dyn FrameSink>,
    order: Mutex<()>,
}

impl Output {
    /// Emit `frame`, taking the emission slot before `state` is released so
    /// frames reach the sink in the order the state changed.
    fn emit(&self, state: MutexGuard<'_, Shared>, frame: &Frame) {
        let _slot = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        drop(state);
        self.sink.emit(frame);
    }
}

pub struct RouteTracker {
    config: TrackerConfig,
    shared: Arc<Mutex<Shared>>,
    output: Arc<Output>,
    remote: Option<Arc<dyn RemoteControl>>,
    ticker: Option<RepeatingTimer>,
    poller: Option<RepeatingTimer>,
}

impl RouteTracker {
    pub fn new(config: TrackerConfig, sink: impl FrameSink + 'static) -> Self {
        let smoother = RemoteSmoother::new(config.smoother.clone());
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared {
                mode: TrackingMode::Idle,
                simulation: None,
                smoother,
                last_frame: None,
            })),
            output: Arc::new(Output {
                sink: Box::new(sink),
                order: Mutex::new(()),
            }),
            remote: None,
            ticker: None,
            poller: None,
        }
    }

    /// Send best-effort start/end notifications to `remote`.
    pub fn with_remote(mut self, remote: impl RemoteControl + 'static) -> Self {
        let remote: Arc<dyn RemoteControl> = Arc::new(remote);
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn mode(&self) -> TrackingMode {
        lock(&self.shared).mode
    }

    pub fn last_frame(&self) -> Option<Frame> {
        lock(&self.shared).last_frame
    }

    /// Arc-length of the current or last simulation run.
    pub fn arc_length(&self) -> Option<f64> {
        lock(&self.shared).simulation.as_ref().map(Simulation::arc_length)
    }

    /// True while the simulation timer is alive.
    pub fn is_simulating(&self) -> bool {
        self.ticker.as_ref().is_some_and(RepeatingTimer::is_running)
    }

    /// Start simulating `route` from its beginning.
    ///
    /// A route without two usable coordinates, or an invalid motion config,
    /// is rejected and leaves any running simulation untouched. Otherwise the
    /// previous timer is cancelled before the new one is installed, and the
    /// replaced run is reported as ended.
    pub fn start(&mut self, route: &Route) -> Result<Frame, TrackerError> {
        let simulation = Simulation::new(route, self.config.motion.clone(), Instant::now())?;
        let frame = simulation.frame();

        self.cancel_ticker();
        let replaced = {
            let mut state = lock(&self.shared);
            let previous = state.mode;
            state.mode = TrackingMode::Simulating;
            state.simulation = Some(simulation);
            state.last_frame = Some(frame);
            self.output.emit(state, &frame);
            previous == TrackingMode::Simulating
        };
        info!(length_m = route_length(&self.shared), "starting route simulation");

        let shared = Arc::clone(&self.shared);
        let output = Arc::clone(&self.output);
        let ticker = RepeatingTimer::spawn(
            "route-sim",
            self.config.motion.tick_interval(),
            move || simulation_tick(&shared, &output),
        );
        match ticker {
            Ok(ticker) => self.ticker = Some(ticker),
            Err(err) => {
                lock(&self.shared).mode = TrackingMode::Idle;
                if replaced {
                    self.notify_remote(&[RouteCommand::End]);
                }
                return Err(err.into());
            }
        }

        if replaced {
            debug!("replacing running simulation");
            self.notify_remote(&[RouteCommand::End, RouteCommand::Start]);
        } else {
            self.notify_remote(&[RouteCommand::Start]);
        }
        Ok(frame)
    }

    /// Stop whatever is driving the display. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.cancel_ticker();
        self.cancel_poller();

        let was_simulating = {
            let mut state = lock(&self.shared);
            let previous = state.mode;
            state.mode = TrackingMode::Idle;
            previous == TrackingMode::Simulating
        };
        if was_simulating {
            info!("route simulation stopped");
            self.notify_remote(&[RouteCommand::End]);
        }
    }

    /// Switch to showing positions polled from `provider`.
    ///
    /// Stops any local simulation. Poll failures are logged and the last
    /// displayed position stays put.
    pub fn follow_remote(
        &mut self,
        provider: impl PositionProvider + 'static,
    ) -> Result<(), TrackerError> {
        if self.config.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval.into());
        }
        self.cancel_ticker();
        self.cancel_poller();
        {
            let mut state = lock(&self.shared);
            state.mode = TrackingMode::Remote;
            state.smoother.reset();
        }
        info!("following remote position");

        let shared = Arc::clone(&self.shared);
        let output = Arc::clone(&self.output);
        self.poller = Some(RepeatingTimer::spawn(
            "route-poll",
            Duration::from_millis(self.config.poll_interval_ms),
            move || {
                match provider.latest_fix() {
                    Ok(Some(fix)) => {
                        apply_remote_fix(&shared, &output, fix);
                    }
                    Ok(None) => debug!("no position reported yet"),
                    Err(err) => warn!(%err, "position poll failed"),
                }
                ControlFlow::Continue(())
            },
        )?);
        Ok(())
    }

    /// Push a fix received out of band.
    ///
    /// Applied only in remote mode; returns the frame shown, if any.
    pub fn apply_fix(&self, fix: Fix) -> Option<Frame> {
        apply_remote_fix(&self.shared, &self.output, fix)
    }

    fn cancel_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    fn cancel_poller(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
    }

    /// Send `commands` in order on a detached thread.
    fn notify_remote(&self, commands: &[RouteCommand]) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let commands = commands.to_vec();
        let spawned = thread::Builder::new()
            .name("route-notify".to_string())
            .spawn(move || {
                for command in commands {
                    match remote.notify(command) {
                        Ok(status) => debug!(?command, ?status, "remote notified"),
                        Err(err) => warn!(?command, %err, "remote notification failed"),
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(%err, "could not send remote notification");
        }
    }
}

impl Drop for RouteTracker {
    fn drop(&mut self) {
        self.cancel_ticker();
        self.cancel_poller();
    }
}

impl fmt::Debug for RouteTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTracker")
            .field("mode", &self.mode())
            .field("simulating", &self.is_simulating())
            .field("polling", &self.poller.is_some())
            .finish()
    }
}

fn route_length(shared: &Mutex<Shared>) -> f64 {
    lock(shared)
        .simulation
        .as_ref()
        .map_or(0.0, |simulation| simulation.path().index.total_length())
}

fn simulation_tick(shared: &Mutex<Shared>, output: &Output) -> ControlFlow<()> {
    let mut state = lock(shared);
    if state.mode != TrackingMode::Simulating {
        return ControlFlow::Break(());
    }
    let Some(simulation) = state.simulation.as_mut() else {
        return ControlFlow::Break(());
    };
    let frame = simulation.tick(Instant::now());
    state.last_frame = Some(frame);
    if frame.finished {
        state.mode = TrackingMode::Idle;
    }

    output.emit(state, &frame);
    if frame.finished {
        info!(arc_length = frame.arc_length, "route simulation finished");
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

fn apply_remote_fix(shared: &Mutex<Shared>, output: &Output, fix: Fix) -> Option<Frame> {
    let mut state = lock(shared);
    if state.mode != TrackingMode::Remote {
        debug!(mode = ?state.mode, "discarding remote fix");
        return None;
    }
    let frame = state.smoother.apply(fix)?.to_frame();
    state.last_frame = Some(frame);

    output.emit(state, &frame);
    Some(frame)
}
