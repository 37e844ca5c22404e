//! Bus API HTTP adapter.
//!
//! Thin blocking client for the school transport backend: polled bus
//! location, route start/end/reset notifications, the route assigned to a
//! student and the school it ends at. Payloads are loose (numbers sometimes
//! arrive as strings, Spanish and English keys are mixed, sometimes both in
//! one object), so every key is read into its own raw field and the first
//! present one wins here.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::polyline::Polyline;
use crate::route::Route;
use crate::traits::{BusStatus, Fix, PositionProvider, RemoteControl, RouteCommand, Waypoint, WaypointKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusApiConfig {
    pub base_url: String,
    /// Bearer token sent as `Authorization` when present.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BusApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            token: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug)]
pub enum RemoteError {
    Http(reqwest::Error),
    Unavailable(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Http(err)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Http(err) => write!(f, "bus API request failed: {}", err),
            RemoteError::Unavailable(reason) => write!(f, "remote unavailable: {}", reason),
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoteError::Http(err) => Some(err),
            RemoteError::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusApiClient {
    config: BusApiConfig,
    client: reqwest::blocking::Client,
}

impl BusApiClient {
    pub fn new(config: BusApiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Handle bound to one bus, usable as a position provider and as a
    /// remote control.
    pub fn bus(&self, bus_id: u64) -> BusLink {
        BusLink {
            api: self.clone(),
            bus_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Current status and last reported location of a bus.
    pub fn location(&self, bus_id: u64) -> Result<BusLocation, RemoteError> {
        let request = self.client.get(self.url(&format!("buses/{}/location", bus_id)));
        let body: LocationResponse = self
            .authorize(request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())?;

        Ok(BusLocation {
            status: body.status,
            fix: body.last_location.as_ref().and_then(RawPoint::to_fix),
        })
    }

    /// Send a route lifecycle command and return the resulting status.
    pub fn command(&self, bus_id: u64, command: RouteCommand) -> Result<BusStatus, RemoteError> {
        let request = self
            .client
            .post(self.url(&format!("buses/{}/{}", bus_id, command.as_path())));
        let body: StatusResponse = self
            .authorize(request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())?;

        Ok(body
            .status
            .unwrap_or_else(|| BusStatus::Other("SIN_DATOS".to_string())))
    }

    /// Bus assigned to a student, with its route. `None` when unassigned.
    pub fn student_bus(&self, student_id: u64) -> Result<Option<BusAssignment>, RemoteError> {
        let request = self.client.get(self.url(&format!("students/{}/bus", student_id)));
        let body: StudentBusResponse = self
            .authorize(request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())?;

        Ok(body.bus.map(BusAssignment::from_raw))
    }

    /// A school by id, as returned by `GET /schools/{id}`.
    pub fn school(&self, school_id: u64) -> Result<School, RemoteError> {
        let request = self.client.get(self.url(&format!("schools/{}", school_id)));
        let body: SchoolResponse = self
            .authorize(request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())?;

        Ok(body.into_school())
    }
}

/// A [`BusApiClient`] bound to one bus id.
#[derive(Debug, Clone)]
pub struct BusLink {
    api: BusApiClient,
    bus_id: u64,
}

impl BusLink {
    pub fn bus_id(&self) -> u64 {
        self.bus_id
    }
}

impl PositionProvider for BusLink {
    fn latest_fix(&self) -> Result<Option<Fix>, RemoteError> {
        Ok(self.api.location(self.bus_id)?.fix)
    }
}

impl RemoteControl for BusLink {
    fn notify(&self, command: RouteCommand) -> Result<BusStatus, RemoteError> {
        self.api.command(self.bus_id, command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusLocation {
    pub status: Option<BusStatus>,
    pub fix: Option<Fix>,
}

/// Bus assigned to a student, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct BusAssignment {
    pub bus_id: Option<u64>,
    /// School the route ends at; look it up with [`BusApiClient::school`].
    pub school_id: Option<u64>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub plate: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub last_fix: Option<Fix>,
    pub route: Route,
    pub child_stop: Option<Waypoint>,
    pub eta_minutes: Option<f64>,
}

impl BusAssignment {
    fn from_raw(raw: RawBus) -> Self {
        let waypoints = route_waypoints(raw.route_coords.as_deref().unwrap_or_default());
        let polyline = raw.route_polyline.map(|points| {
            Polyline::new(points.iter().filter_map(RawPoint::location).collect())
        });
        let conductor = raw.conductor.unwrap_or_default();
        let school_id = raw
            .colegio_id
            .or(raw.school_id)
            .or_else(|| raw.colegio.and_then(|colegio| colegio.id));

        Self {
            bus_id: raw.id.as_ref().and_then(Number::as_id),
            school_id: school_id.as_ref().and_then(Number::as_id),
            code: raw
                .codigo
                .or(raw.code)
                .or_else(|| raw.id.clone())
                .as_ref()
                .map(Number::to_text),
            name: raw.nombre.or(raw.name),
            plate: raw.placa.or(raw.plate),
            driver_name: raw.driver_name.or(conductor.nombre).or(conductor.name),
            driver_phone: raw.driver_phone.or(conductor.telefono).or(conductor.phone),
            last_fix: raw.last_location.as_ref().and_then(RawPoint::to_fix),
            route: Route { waypoints, polyline },
            child_stop: raw
                .child_stop
                .as_ref()
                .and_then(|point| point.to_waypoint(WaypointKind::House, "child stop")),
            eta_minutes: raw
                .eta_minutes_camel
                .or(raw.eta_minutes)
                .as_ref()
                .and_then(Number::value),
        }
    }
}

/// A school as described by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct School {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub location: Option<(f64, f64)>,
}

impl School {
    /// The school as a route destination, when it has coordinates.
    pub fn waypoint(&self) -> Option<Waypoint> {
        let (lat, lon) = self.location?;
        let waypoint = Waypoint {
            kind: WaypointKind::School,
            id: self.id,
            name: self.name.clone().unwrap_or_else(|| "school".to_string()),
            lat,
            lon,
        };
        waypoint.is_valid().then_some(waypoint)
    }
}

/// Convert raw route stops, skipping any without usable coordinates.
///
/// Stops that do not say what they are get typed by position: the first is
/// the depot, the last the school, everything between a house.
fn route_waypoints(points: &[RawPoint]) -> Vec<Waypoint> {
    let usable: Vec<&RawPoint> = points.iter().filter(|p| p.location().is_some()).collect();
    if usable.len() < points.len() {
        debug!(
            skipped = points.len() - usable.len(),
            "route stops without coordinates"
        );
    }

    let last = usable.len().saturating_sub(1);
    usable
        .iter()
        .enumerate()
        .filter_map(|(i, point)| {
            let default_kind = if i == 0 {
                WaypointKind::Depot
            } else if i == last {
                WaypointKind::School
            } else {
                WaypointKind::House
            };
            let kind = point
                .tipo
                .as_deref()
                .or(point.kind.as_deref())
                .and_then(parse_kind)
                .unwrap_or(default_kind);
            point.to_waypoint(kind, &format!("stop {}", i + 1))
        })
        .collect()
}

fn parse_kind(value: &str) -> Option<WaypointKind> {
    match value.trim().to_ascii_uppercase().as_str() {
        "DEPOT" | "DEPOSITO" => Some(WaypointKind::Depot),
        "HOUSE" | "CASA" => Some(WaypointKind::House),
        "SCHOOL" | "COLEGIO" => Some(WaypointKind::School),
        _ => None,
    }
}

/// A JSON value that should be a number but may arrive as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Number::Float(value) => Some(*value),
            Number::Text(text) => text.trim().parse::<f64>().ok(),
        };
        value.filter(|value| value.is_finite())
    }

    fn as_id(&self) -> Option<u64> {
        self.value()
            .filter(|value| *value >= 0.0 && value.fract() == 0.0)
            .map(|value| value as u64)
    }

    fn to_text(&self) -> String {
        match self {
            Number::Float(value) => value.to_string(),
            Number::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawPoint {
    id: Option<Number>,
    nombre: Option<String>,
    name: Option<String>,
    lat: Option<Number>,
    lng: Option<Number>,
    lon: Option<Number>,
    tipo: Option<String>,
    kind: Option<String>,
    heading: Option<Number>,
}

impl RawPoint {
    fn location(&self) -> Option<(f64, f64)> {
        let lat = self.lat.as_ref()?.value()?;
        let lon = self.lng.as_ref().or(self.lon.as_ref())?.value()?;
        Some((lat, lon))
    }

    fn to_fix(&self) -> Option<Fix> {
        let (lat, lon) = self.location()?;
        Some(Fix {
            lat,
            lon,
            heading: self.heading.as_ref().and_then(Number::value),
        })
    }

    fn to_waypoint(&self, kind: WaypointKind, fallback_name: &str) -> Option<Waypoint> {
        let (lat, lon) = self.location()?;
        Some(Waypoint {
            kind,
            id: self.id.as_ref().and_then(Number::as_id),
            name: self
                .nombre
                .as_ref()
                .or(self.name.as_ref())
                .cloned()
                .unwrap_or_else(|| fallback_name.to_string()),
            lat,
            lon,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LocationResponse {
    #[serde(default)]
    status: Option<BusStatus>,
    #[serde(default)]
    last_location: Option<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<BusStatus>,
}

#[derive(Debug, Deserialize)]
struct StudentBusResponse {
    #[serde(default)]
    bus: Option<RawBus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBus {
    id: Option<Number>,
    codigo: Option<Number>,
    code: Option<Number>,
    nombre: Option<String>,
    name: Option<String>,
    placa: Option<String>,
    plate: Option<String>,
    driver_name: Option<String>,
    driver_phone: Option<String>,
    conductor: Option<RawDriver>,
    #[serde(rename = "colegioId")]
    colegio_id: Option<Number>,
    #[serde(rename = "schoolId")]
    school_id: Option<Number>,
    colegio: Option<RawRef>,
    last_location: Option<RawPoint>,
    route_coords: Option<Vec<RawPoint>>,
    route_polyline: Option<Vec<RawPoint>>,
    child_stop: Option<RawPoint>,
    #[serde(rename = "etaMinutes")]
    eta_minutes_camel: Option<Number>,
    eta_minutes: Option<Number>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDriver {
    nombre: Option<String>,
    name: Option<String>,
    telefono: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRef {
    id: Option<Number>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSchool {
    id: Option<Number>,
    nombre: Option<String>,
    name: Option<String>,
    direccion: Option<String>,
    address: Option<String>,
    lat: Option<Number>,
    lng: Option<Number>,
    lon: Option<Number>,
}

/// The school may come bare or wrapped in `school` or `item`.
#[derive(Debug, Deserialize)]
struct SchoolResponse {
    #[serde(default)]
    school: Option<RawSchool>,
    #[serde(default)]
    item: Option<RawSchool>,
    #[serde(flatten)]
    bare: RawSchool,
}

impl SchoolResponse {
    fn into_school(self) -> School {
        let raw = self.school.or(self.item).unwrap_or(self.bare);
        let lat = raw.lat.as_ref().and_then(Number::value);
        let lon = raw.lon.or(raw.lng).as_ref().and_then(Number::value);
        School {
            id: raw.id.as_ref().and_then(Number::as_id),
            name: raw.nombre.or(raw.name),
            address: raw.direccion.or(raw.address),
            location: lat.zip(lon),
        }
    }
}
