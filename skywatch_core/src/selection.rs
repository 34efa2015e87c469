//! Selection state - at most one highlighted aircraft.

use crate::geo::GeoPoint;
use crate::model::{ObjectId, TrackedObject};
use crate::reconciler::{MarkerDiff, RenderedMarkerSet};
use serde::{Deserialize, Serialize};

/// Configuration for selection focus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Minimum zoom when centring on a selected object (default: 8)
    pub focus_zoom: u8,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { focus_zoom: 8 }
    }
}

/// What a `select` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Id is not a rendered marker; nothing changed.
    Ignored,

    /// Id was already selected.
    Unchanged,

    /// Selection moved to the new id.
    Changed { previous: Option<ObjectId> },
}

/// The currently highlighted object, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Option<ObjectId>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&ObjectId> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, id: &ObjectId) -> bool {
        self.selected.as_ref() == Some(id)
    }

    /// Select `id` if it is currently rendered.
    pub fn select(&mut self, id: &ObjectId, markers: &RenderedMarkerSet) -> SelectOutcome {
        if !markers.contains(id) {
            return SelectOutcome::Ignored;
        }
        if self.is_selected(id) {
            return SelectOutcome::Unchanged;
        }
        let previous = self.selected.replace(id.clone());
        SelectOutcome::Changed { previous }
    }

    /// Clear the selection, returning what was selected.
    pub fn clear(&mut self) -> Option<ObjectId> {
        self.selected.take()
    }

    /// Drop the selection if `diff` removes the selected marker.
    ///
    /// Returns the id that was cleared.
    pub fn on_reconciled(&mut self, diff: &MarkerDiff) -> Option<ObjectId> {
        match &self.selected {
            Some(id) if diff.removes(id) => self.selected.take(),
            _ => None,
        }
    }
}

/// Side-panel content for a selected aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoPanel {
    pub id: ObjectId,
    pub title: String,
    pub origin_region: String,
    pub position: Option<GeoPoint>,
    pub altitude_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub vertical_rate_mps: Option<f64>,
    pub on_ground: Option<bool>,
}

impl InfoPanel {
    pub fn from_object(object: &TrackedObject) -> Self {
        Self {
            id: object.id.clone(),
            title: object.display_name().to_string(),
            origin_region: object.origin_region.clone(),
            position: object.position,
            altitude_m: object.telemetry.altitude_m,
            speed_mps: object.telemetry.speed_mps,
            heading_deg: object.telemetry.heading_deg,
            vertical_rate_mps: object.telemetry.vertical_rate_mps,
            on_ground: object.telemetry.on_ground,
        }
    }

    /// Human readable rows ("Altitude: 10668 m", ...).
    pub fn rows(&self) -> Vec<String> {
        fn or_unknown(v: Option<f64>, unit: &str) -> String {
            v.map(|v| format!("{:.0} {}", v, unit))
                .unwrap_or_else(|| "Unknown".to_string())
        }

        let status = match self.on_ground {
            Some(true) => "On Ground",
            Some(false) => "In Flight",
            None => "Unknown",
        };

        vec![
            format!("Callsign: {}", self.title),
            format!("ICAO24: {}", self.id),
            format!("Country: {}", self.origin_region),
            format!("Altitude: {}", or_unknown(self.altitude_m, "m")),
            format!("Speed: {}", or_unknown(self.speed_mps, "m/s")),
            format!("Heading: {}", or_unknown(self.heading_deg, "°")),
            format!("Vertical rate: {}", or_unknown(self.vertical_rate_mps, "m/s")),
            format!("Status: {}", status),
        ]
    }
}
