//! RouteTracker driven by real timers.
//!
//! Intervals are shortened to a few milliseconds so the runs finish quickly.

mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bus_motion::remote::RemoteError;
use bus_motion::route::{Route, RouteError};
use bus_motion::simulation::{ConfigError, MotionConfig};
use bus_motion::tracker::{RouteTracker, TrackerConfig, TrackerError, TrackingMode};
use bus_motion::traits::{
    BusStatus, Fix, Frame, PositionProvider, RemoteControl, RouteCommand, Waypoint, WaypointKind,
};

use fixtures::three_stop_route;

// ============================================================================
// Test Infrastructure
// ============================================================================

#[derive(Clone, Default)]
struct Recorder {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl Recorder {
    fn sink(&self) -> impl Fn(&Frame) + Send + Sync + 'static {
        record_into(Arc::clone(&self.frames))
    }

    fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

fn record_into(frames: Arc<Mutex<Vec<Frame>>>) -> impl Fn(&Frame) + Send + Sync + 'static {
    move |frame: &Frame| frames.lock().unwrap().push(*frame)
}

#[derive(Clone, Default)]
struct MockRemote {
    commands: Arc<Mutex<Vec<RouteCommand>>>,
    fail: bool,
}

impl RemoteControl for MockRemote {
    fn notify(&self, command: RouteCommand) -> Result<BusStatus, RemoteError> {
        self.commands.lock().unwrap().push(command);
        if self.fail {
            Err(RemoteError::Unavailable("offline".to_string()))
        } else {
            Ok(BusStatus::EnRoute)
        }
    }
}

struct ScriptedProvider {
    fixes: Mutex<Vec<Result<Option<Fix>, RemoteError>>>,
}

impl ScriptedProvider {
    fn new(mut fixes: Vec<Result<Option<Fix>, RemoteError>>) -> Self {
        fixes.reverse();
        Self {
            fixes: Mutex::new(fixes),
        }
    }
}

impl PositionProvider for ScriptedProvider {
    fn latest_fix(&self) -> Result<Option<Fix>, RemoteError> {
        self.fixes.lock().unwrap().pop().unwrap_or(Ok(None))
    }
}

/// Reports the same fix on every poll and counts the polls.
struct SteadyProvider {
    fix: Fix,
    polls: Arc<AtomicUsize>,
}

impl PositionProvider for SteadyProvider {
    fn latest_fix(&self) -> Result<Option<Fix>, RemoteError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.fix))
    }
}

fn fast_config(speed_mps: f64) -> TrackerConfig {
    TrackerConfig {
        motion: MotionConfig {
            speed_mps,
            tick_interval_ms: 2,
            dwell_ms: 20,
            ..MotionConfig::default()
        },
        poll_interval_ms: 2,
        ..TrackerConfig::default()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// ============================================================================
// Simulation mode
// ============================================================================

#[test]
fn insufficient_route_creates_no_timer() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(10.0), recorder.sink());

    let route = Route::new(vec![Waypoint::new(WaypointKind::Depot, "depot", 0.0, 0.0)]);
    let result = tracker.start(&route);

    assert!(matches!(
        result,
        Err(TrackerError::Route(RouteError::InsufficientRoute { usable: 1 }))
    ));
    assert!(!tracker.is_simulating());
    assert_eq!(tracker.mode(), TrackingMode::Idle);
    assert_eq!(recorder.len(), 0);
}

#[test]
fn invalid_motion_config_is_rejected() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(-10.0), recorder.sink());

    let result = tracker.start(&three_stop_route());
    assert!(matches!(
        result,
        Err(TrackerError::Config(ConfigError::NonPositiveSpeed))
    ));
    assert!(!tracker.is_simulating());
    assert_eq!(tracker.mode(), TrackingMode::Idle);
    assert_eq!(recorder.len(), 0);
}

#[test]
fn zero_poll_interval_is_rejected() {
    let recorder = Recorder::default();
    let config = TrackerConfig {
        poll_interval_ms: 0,
        ..fast_config(1.0)
    };
    let mut tracker = RouteTracker::new(config, recorder.sink());

    let result = tracker.follow_remote(ScriptedProvider::new(vec![]));
    assert!(matches!(
        result,
        Err(TrackerError::Config(ConfigError::ZeroPollInterval))
    ));
    assert_eq!(tracker.mode(), TrackingMode::Idle);
}

#[test]
fn simulation_runs_to_the_school_and_stops_itself() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(200.0), recorder.sink());

    let first = tracker.start(&three_stop_route()).expect("route starts");
    assert_eq!(first.position, (-17.7833, -63.1821));
    assert_eq!(first.arc_length, 0.0);

    assert!(wait_for(|| recorder.frames().last().is_some_and(|f| f.finished)));
    assert!(wait_for(|| !tracker.is_simulating()));
    assert_eq!(tracker.mode(), TrackingMode::Idle);

    let frames = recorder.frames();
    let last = frames.last().unwrap();
    assert_eq!(last.position, (-17.7840, -63.1810));
    assert!(frames.iter().any(|f| f.dwelling));
    assert!(frames.windows(2).all(|w| w[0].arc_length <= w[1].arc_length));

    // Nothing ticks after the finish.
    let count = recorder.len();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.len(), count);
}

#[test]
fn restarting_replaces_the_running_simulation() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    tracker.start(&three_stop_route()).unwrap();
    thread::sleep(Duration::from_millis(20));
    tracker.start(&three_stop_route()).unwrap();

    let restart_at = recorder
        .frames()
        .iter()
        .rposition(|f| f.arc_length == 0.0)
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    let frames = recorder.frames();
    assert!(frames[restart_at..]
        .windows(2)
        .all(|w| w[0].arc_length <= w[1].arc_length));
    assert!(tracker.is_simulating());
    tracker.stop();
}

#[test]
fn rejected_restart_keeps_current_run() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    tracker.start(&three_stop_route()).unwrap();
    assert!(tracker.start(&Route::default()).is_err());
    assert!(tracker.is_simulating());
    assert_eq!(tracker.mode(), TrackingMode::Simulating);
    tracker.stop();
}

#[test]
fn stop_is_idempotent_and_final() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    tracker.start(&three_stop_route()).unwrap();
    thread::sleep(Duration::from_millis(10));
    tracker.stop();
    tracker.stop();

    assert!(!tracker.is_simulating());
    assert_eq!(tracker.mode(), TrackingMode::Idle);

    let count = recorder.len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(recorder.len(), count);
}

#[test]
fn dropping_the_tracker_releases_its_timer() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let mut tracker = RouteTracker::new(fast_config(1.0), move |_: &Frame| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    tracker.start(&three_stop_route()).unwrap();
    thread::sleep(Duration::from_millis(10));
    drop(tracker);

    let count = ticks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ticks.load(Ordering::SeqCst), count);
}

#[test]
fn panicking_sink_does_not_take_down_the_tracker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut tracker = RouteTracker::new(fast_config(1.0), move |_: &Frame| {
        // The initial frame goes through; the first tick blows up.
        if counter.fetch_add(1, Ordering::SeqCst) == 1 {
            panic!("renderer crashed");
        }
    });

    tracker.start(&three_stop_route()).unwrap();
    assert!(wait_for(|| !tracker.is_simulating()));
    assert!(tracker.last_frame().is_some());
    tracker.stop();
}

// ============================================================================
// Remote mode
// ============================================================================

#[test]
fn remote_fixes_are_smoothed() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    let provider = ScriptedProvider::new(vec![
        Ok(Some(Fix::new(0.0, 0.0).with_heading(90.0))),
        Err(RemoteError::Unavailable("timeout".to_string())),
        Ok(None),
        Ok(Some(Fix::new(1.0, 1.0))),
    ]);
    tracker.follow_remote(provider).unwrap();
    assert_eq!(tracker.mode(), TrackingMode::Remote);

    assert!(wait_for(|| recorder.len() >= 2));
    let frames = recorder.frames();
    assert_eq!(frames[0].position, (0.0, 0.0));
    assert!((frames[1].position.0 - 0.35).abs() < 1e-12);
    assert!((frames[1].position.1 - 0.35).abs() < 1e-12);
    assert_eq!(frames[1].heading, 90.0);
    tracker.stop();
}

#[test]
fn fixes_are_discarded_while_simulating() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    assert_eq!(tracker.apply_fix(Fix::new(1.0, 1.0)), None);

    tracker.start(&three_stop_route()).unwrap();
    assert_eq!(tracker.apply_fix(Fix::new(1.0, 1.0)), None);
    assert!(recorder.frames().iter().all(|f| f.position != (1.0, 1.0)));
    tracker.stop();
}

#[test]
fn polled_fixes_never_reach_the_display_while_simulating() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    let remote_fix = Fix::new(1.0, 1.0);
    let polls = Arc::new(AtomicUsize::new(0));
    tracker
        .follow_remote(SteadyProvider {
            fix: remote_fix,
            polls: Arc::clone(&polls),
        })
        .unwrap();
    assert!(wait_for(|| recorder
        .frames()
        .iter()
        .any(|f| f.position == remote_fix.location())));

    let first = tracker.start(&three_stop_route()).unwrap();
    let polls_at_start = polls.load(Ordering::SeqCst);

    // The poller keeps running; its fixes are fetched and thrown away.
    assert!(wait_for(|| polls.load(Ordering::SeqCst) >= polls_at_start + 10));
    assert_eq!(tracker.mode(), TrackingMode::Simulating);

    let frames = recorder.frames();
    let started_at = frames
        .iter()
        .rposition(|f| *f == first)
        .expect("initial frame emitted");
    assert!(frames[started_at..]
        .iter()
        .all(|f| f.position != remote_fix.location()));
    assert_ne!(tracker.last_frame().map(|f| f.position), Some(remote_fix.location()));
    tracker.stop();
}

#[test]
fn following_remote_stops_the_simulation() {
    let recorder = Recorder::default();
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink());

    tracker.start(&three_stop_route()).unwrap();
    tracker.follow_remote(ScriptedProvider::new(vec![])).unwrap();
    assert!(!tracker.is_simulating());

    let frame = tracker.apply_fix(Fix::new(-17.78, -63.18)).expect("applied");
    assert_eq!(frame.position, (-17.78, -63.18));
    assert_eq!(tracker.last_frame(), Some(frame));
    tracker.stop();
}

// ============================================================================
// Remote control notifications
// ============================================================================

#[test]
fn start_and_stop_notify_remote() {
    let recorder = Recorder::default();
    let remote = MockRemote::default();
    let commands = Arc::clone(&remote.commands);
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink()).with_remote(remote);

    tracker.start(&three_stop_route()).unwrap();
    assert!(wait_for(|| commands.lock().unwrap().contains(&RouteCommand::Start)));

    tracker.stop();
    assert!(wait_for(|| commands.lock().unwrap().contains(&RouteCommand::End)));

    // A second stop has nothing to end.
    tracker.stop();
    thread::sleep(Duration::from_millis(10));
    let ends = commands
        .lock()
        .unwrap()
        .iter()
        .filter(|c| **c == RouteCommand::End)
        .count();
    assert_eq!(ends, 1);
}

#[test]
fn restart_ends_the_replaced_run_first() {
    let recorder = Recorder::default();
    let remote = MockRemote::default();
    let commands = Arc::clone(&remote.commands);
    let mut tracker = RouteTracker::new(fast_config(1.0), recorder.sink()).with_remote(remote);

    tracker.start(&three_stop_route()).unwrap();
    assert!(wait_for(|| commands.lock().unwrap().len() == 1));

    tracker.start(&three_stop_route()).unwrap();
    assert!(wait_for(|| commands.lock().unwrap().len() == 3));
    assert_eq!(
        *commands.lock().unwrap(),
        vec![RouteCommand::Start, RouteCommand::End, RouteCommand::Start]
    );

    tracker.stop();
    assert!(wait_for(|| commands.lock().unwrap().len() == 4));
    assert_eq!(commands.lock().unwrap()[3], RouteCommand::End);
}

#[test]
fn failing_remote_does_not_affect_simulation() {
    let recorder = Recorder::default();
    let remote = MockRemote {
        fail: true,
        ..MockRemote::default()
    };
    let commands = Arc::clone(&remote.commands);
    let mut tracker = RouteTracker::new(fast_config(500.0), recorder.sink()).with_remote(remote);

    tracker.start(&three_stop_route()).unwrap();
    assert!(wait_for(|| !commands.lock().unwrap().is_empty()));
    assert!(wait_for(|| recorder.frames().last().is_some_and(|f| f.finished)));
}
