//! Core domain types and the seams to the outside world.
//!
//! The engine never talks to a renderer or a backend directly. Concrete apps
//! implement these traits for their own map surface and transport.

use serde::{Deserialize, Serialize};

use crate::remote::RemoteError;

/// Role of a waypoint on a school route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WaypointKind {
    Depot,
    House,
    School,
}

/// A named, typed anchor point of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub kind: WaypointKind,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(alias = "nombre")]
    pub name: String,
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
}

impl Waypoint {
    pub fn new(kind: WaypointKind, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            kind,
            id: None,
            name: name.into(),
            lat,
            lon,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Location coordinates (lat, lon).
    pub fn location(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    /// True when the coordinates can be placed on a map.
    pub fn is_valid(&self) -> bool {
        is_valid_coordinate(self.location())
    }
}

/// Finite latitude within ±90 and finite longitude within ±180.
pub fn is_valid_coordinate((lat, lon): (f64, f64)) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

/// One position sample reported by a remote position provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    /// Heading in degrees, when the provider reports one.
    pub heading: Option<f64>,
}

impl Fix {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            heading: None,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn location(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

/// What the rendering layer gets on every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Current vehicle position (lat, lon).
    pub position: (f64, f64),
    /// Heading in degrees from true north, `[0, 360)`.
    pub heading: f64,
    /// Distance traveled along the route in meters. Zero in remote mode.
    pub arc_length: f64,
    pub dwelling: bool,
    pub finished: bool,
}

/// Receives frames from the engine. Usually a map marker.
pub trait FrameSink: Send + Sync {
    fn emit(&self, frame: &Frame);
}

impl<F> FrameSink for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn emit(&self, frame: &Frame) {
        self(frame)
    }
}

/// Provides the latest known vehicle position.
///
/// Cadence is up to the caller; the engine polls on its own timer.
pub trait PositionProvider: Send + Sync {
    fn latest_fix(&self) -> Result<Option<Fix>, RemoteError>;
}

/// Receives start/stop notifications for a route.
pub trait RemoteControl: Send + Sync {
    fn notify(&self, command: RouteCommand) -> Result<BusStatus, RemoteError>;
}

/// Route lifecycle command sent to a remote control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteCommand {
    Start,
    End,
    Reset,
}

impl RouteCommand {
    /// Path segment used by the bus API.
    pub fn as_path(&self) -> &'static str {
        match self {
            RouteCommand::Start => "start",
            RouteCommand::End => "end",
            RouteCommand::Reset => "reset",
        }
    }
}

/// Service status of a bus as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BusStatus {
    OutOfService,
    EnRoute,
    Other(String),
}

impl From<String> for BusStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "FUERA_DE_SERVICIO" => BusStatus::OutOfService,
            "EN_RUTA" => BusStatus::EnRoute,
            _ => BusStatus::Other(value),
        }
    }
}

impl From<BusStatus> for String {
    fn from(status: BusStatus) -> Self {
        match status {
            BusStatus::OutOfService => "FUERA_DE_SERVICIO".to_string(),
            BusStatus::EnRoute => "EN_RUTA".to_string(),
            BusStatus::Other(value) => value,
        }
    }
}
