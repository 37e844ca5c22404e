//! Dense route geometry.
//!
//! A route provider may ship a precomputed polyline that follows the streets
//! more closely than the sparse stop list. The engine walks it instead of the
//! stops whenever it has enough usable points.

use serde::{Deserialize, Serialize};

use crate::traits::is_valid_coordinate;

/// A polyline representing a route geometry as decoded coordinates.
///
/// Stores (latitude, longitude) points as received. Invalid points are
/// kept here and filtered out when the path is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    /// Creates a new Polyline from decoded coordinate points.
    ///
    /// Each point is a (latitude, longitude) tuple.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Points that pass coordinate validation, in order.
    pub fn valid_points(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .copied()
            .filter(|point| is_valid_coordinate(*point))
            .collect()
    }
}

impl From<Vec<(f64, f64)>> for Polyline {
    fn from(points: Vec<(f64, f64)>) -> Self {
        Self::new(points)
    }
}
