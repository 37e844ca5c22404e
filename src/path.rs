//! Arc-length parameterization of a route polyline.
//!
//! [`PathIndex`] is built once per route and read-only afterwards. It answers
//! two questions quickly: which segment contains a given distance along the
//! route, and where on the map that distance lands.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_m;

/// Per-segment and cumulative lengths over an ordered coordinate list.
///
/// Invariants: `cumulative_lengths` has one entry per coordinate, starts at 0,
/// is non-decreasing, and its last entry is exactly `total_length`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathIndex {
    coordinates: Vec<(f64, f64)>,
    segment_lengths: Vec<f64>,
    cumulative_lengths: Vec<f64>,
    total_length: f64,
}

impl PathIndex {
    /// Build the index. Fewer than two coordinates give a degenerate path
    /// with `total_length == 0`; callers decide whether that is usable.
    pub fn new(coordinates: Vec<(f64, f64)>) -> Self {
        let mut segment_lengths = Vec::with_capacity(coordinates.len().saturating_sub(1));
        let mut cumulative_lengths = Vec::with_capacity(coordinates.len());
        let mut total = 0.0;

        if !coordinates.is_empty() {
            cumulative_lengths.push(0.0);
        }
        for pair in coordinates.windows(2) {
            let length = haversine_m(pair[0], pair[1]);
            total += length;
            segment_lengths.push(length);
            cumulative_lengths.push(total);
        }

        Self {
            coordinates,
            segment_lengths,
            cumulative_lengths,
            total_length: total,
        }
    }

    pub fn coordinates(&self) -> &[(f64, f64)] {
        &self.coordinates
    }

    pub fn segment_lengths(&self) -> &[f64] {
        &self.segment_lengths
    }

    pub fn cumulative_lengths(&self) -> &[f64] {
        &self.cumulative_lengths
    }

    /// Route length in meters.
    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Clamp an arc-length into `[0, total_length]`. NaN maps to 0.
    pub fn clamp(&self, s: f64) -> f64 {
        if s.is_nan() {
            return 0.0;
        }
        s.clamp(0.0, self.total_length)
    }

    /// Index `i` of the segment `coordinates[i] -> coordinates[i + 1]`
    /// containing arc-length `s`.
    ///
    /// An exact node boundary resolves to the segment starting at that node.
    /// `s == total_length` resolves to the final segment. Paths with fewer
    /// than two coordinates always return 0.
    pub fn locate_segment(&self, s: f64) -> usize {
        let n = self.coordinates.len();
        if n < 2 {
            return 0;
        }

        let s = self.clamp(s);
        // cumulative[0] == 0 <= s, so at least one element passes.
        let at_or_before = self.cumulative_lengths.partition_point(|&c| c <= s);
        (at_or_before - 1).min(n - 2)
    }

    /// Coordinate at arc-length `s`, linearly interpolated in lat/lon.
    ///
    /// Returns `None` only for an empty path.
    pub fn sample(&self, s: f64) -> Option<(f64, f64)> {
        match self.coordinates.len() {
            0 => return None,
            1 => return Some(self.coordinates[0]),
            _ => {}
        }

        let s = self.clamp(s);
        let i = self.locate_segment(s);
        let start = self.coordinates[i];
        let end = self.coordinates[i + 1];

        let segment_length = self.segment_lengths[i];
        if segment_length <= 0.0 {
            return Some(start);
        }

        let t = ((s - self.cumulative_lengths[i]) / segment_length).clamp(0.0, 1.0);
        if t <= 0.0 {
            return Some(start);
        }
        if t >= 1.0 {
            return Some(end);
        }

        Some((
            start.0 + (end.0 - start.0) * t,
            start.1 + (end.1 - start.1) * t,
        ))
    }
}

/// Index of the value in a non-decreasing slice closest to `target`.
pub(crate) fn nearest_sorted(values: &[f64], target: f64) -> Option<usize> {
    if values.is_empty() {
        return None;
    }

    let after = values.partition_point(|&v| v < target);
    if after == 0 {
        return Some(0);
    }
    if after == values.len() {
        return Some(values.len() - 1);
    }

    let before = after - 1;
    if target - values[before] <= values[after] - target {
        Some(before)
    } else {
        Some(after)
    }
}
