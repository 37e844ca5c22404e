//! Route input and the path the vehicle actually follows.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::haversine::haversine_m;
use crate::path::{PathIndex, nearest_sorted};
use crate::polyline::Polyline;
use crate::traits::{Waypoint, WaypointKind};

/// Ordered stops plus an optional dense geometry, as delivered by a route
/// provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub polyline: Option<Polyline>,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            polyline: None,
        }
    }

    pub fn with_polyline(mut self, polyline: Polyline) -> Self {
        self.polyline = Some(polyline);
        self
    }

    /// Build the walkable path.
    ///
    /// Uses the polyline when it has at least two valid points and the
    /// valid waypoints otherwise. Invalid coordinates never reach the path.
    pub fn build(&self) -> Result<RoutePath, RouteError> {
        let waypoints: Vec<&Waypoint> = self.waypoints.iter().filter(|w| w.is_valid()).collect();
        let skipped = self.waypoints.len() - waypoints.len();
        if skipped > 0 {
            debug!(skipped, "dropping waypoints with unusable coordinates");
        }

        let dense = self
            .polyline
            .as_ref()
            .map(Polyline::valid_points)
            .filter(|points| points.len() >= 2);

        let (coordinates, nodes) = match dense {
            Some(points) => {
                let nodes = anchor_to_points(&waypoints, &points);
                (points, nodes)
            }
            None => {
                let points: Vec<(f64, f64)> = waypoints.iter().map(|w| w.location()).collect();
                (points, (0..waypoints.len()).collect())
            }
        };

        if coordinates.len() < 2 {
            return Err(RouteError::InsufficientRoute {
                usable: coordinates.len(),
            });
        }

        let index = PathIndex::new(coordinates);
        let stops: Vec<Stop> = waypoints
            .iter()
            .zip(nodes)
            .map(|(waypoint, node)| Stop {
                node,
                arc_length: index.cumulative_lengths()[node],
                kind: waypoint.kind,
                name: waypoint.name.clone(),
            })
            .collect();

        let stop_lengths = stops.iter().map(|stop| stop.arc_length).collect();
        Ok(RoutePath {
            index,
            stops,
            stop_lengths,
        })
    }
}

/// A waypoint pinned to a node of the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Index into the path coordinates.
    pub node: usize,
    /// Arc-length of that node in meters.
    pub arc_length: f64,
    pub kind: WaypointKind,
    pub name: String,
}

/// The indexed path plus its stops, sorted by arc-length.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePath {
    pub index: PathIndex,
    pub stops: Vec<Stop>,
    stop_lengths: Vec<f64>,
}

impl RoutePath {
    /// Stop closest to arc-length `s`.
    pub fn nearest_stop(&self, s: f64) -> Option<&Stop> {
        nearest_sorted(&self.stop_lengths, s).map(|i| &self.stops[i])
    }

    /// True when the stop sits on the first or last node of the path.
    pub fn is_terminal(&self, stop: &Stop) -> bool {
        stop.node == 0 || stop.node + 1 == self.index.len()
    }
}

/// Match each waypoint to its closest point, never moving backwards along
/// the polyline.
fn anchor_to_points(waypoints: &[&Waypoint], points: &[(f64, f64)]) -> Vec<usize> {
    let mut from = 0;
    waypoints
        .iter()
        .map(|waypoint| {
            let location = waypoint.location();
            let mut best = from;
            let mut best_distance = f64::INFINITY;
            for (j, point) in points.iter().enumerate().skip(from) {
                let distance = haversine_m(location, *point);
                if distance < best_distance {
                    best = j;
                    best_distance = distance;
                }
            }
            from = best;
            best
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Fewer than two usable coordinates; nothing to drive along.
    InsufficientRoute { usable: usize },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::InsufficientRoute { usable } => write!(
                f,
                "route needs at least 2 valid coordinates to simulate, got {}",
                usable
            ),
        }
    }
}

impl std::error::Error for RouteError {}
