//! Smoothing of sparse remote fixes.
//!
//! Polled positions arrive about once per second. Snapping the marker to each
//! one looks jumpy, so the displayed position moves part of the way toward
//! every new fix instead.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::heading::normalize_deg;
use crate::traits::{Fix, Frame, is_valid_coordinate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Fraction of the gap to the new fix covered per update, `[0, 1]`.
    pub blend_factor: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self { blend_factor: 0.35 }
    }
}

/// Position and heading currently shown for the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayedFix {
    pub position: (f64, f64),
    pub heading: f64,
}

impl DisplayedFix {
    pub fn to_frame(&self) -> Frame {
        Frame {
            position: self.position,
            heading: self.heading,
            arc_length: 0.0,
            dwelling: false,
            finished: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoteSmoother {
    config: SmootherConfig,
    displayed: Option<DisplayedFix>,
}

impl RemoteSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            displayed: None,
        }
    }

    pub fn displayed(&self) -> Option<DisplayedFix> {
        self.displayed
    }

    pub fn reset(&mut self) {
        self.displayed = None;
    }

    /// Blend a new fix into the displayed position.
    ///
    /// The first fix is shown as is. Unusable fixes leave the display
    /// untouched.
    pub fn apply(&mut self, fix: Fix) -> Option<DisplayedFix> {
        if !is_valid_coordinate(fix.location()) {
            debug!(lat = fix.lat, lon = fix.lon, "ignoring unusable fix");
            return self.displayed;
        }

        let heading = fix.heading.filter(|h| h.is_finite()).map(normalize_deg);
        let next = match self.displayed {
            None => DisplayedFix {
                position: fix.location(),
                heading: heading.unwrap_or(0.0),
            },
            Some(previous) => {
                let blend = self.config.blend_factor.clamp(0.0, 1.0);
                let (lat, lon) = previous.position;
                DisplayedFix {
                    position: (lat + (fix.lat - lat) * blend, lon + (fix.lon - lon) * blend),
                    heading: heading.unwrap_or(previous.heading),
                }
            }
        };

        self.displayed = Some(next);
        self.displayed
    }
}
