//! JSON exporter for offline replay.
//!
//! Exports one frame per applied cycle: what the fleet really was and what
//! the map surface showed.

use serde::{Deserialize, Serialize};
use skywatch_core::recording::RecordingSurface;
use skywatch_core::GeoPoint;
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Poll cycle that produced this frame
    pub cycle: u64,

    /// Ground truth aircraft positions
    pub ground_truth: Vec<MarkerPosition>,

    /// Markers as drawn on the surface
    pub rendered: Vec<MarkerPosition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,

    /// Events (outages, stale drops, mode switches)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Position of one marker or aircraft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerPosition {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

impl MarkerPosition {
    pub fn new(id: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            id: id.into(),
            lat: position.lat,
            lon: position.lon,
        }
    }
}

/// Markers currently drawn on a recording surface, sorted by id.
pub fn rendered_positions(surface: &RecordingSurface) -> Vec<MarkerPosition> {
    surface
        .marker_ids()
        .into_iter()
        .filter_map(|id| {
            surface
                .marker_by_id(&id)
                .map(|m| MarkerPosition::new(id.as_str(), m.position))
        })
        .collect()
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self { message: message.into(), level: None }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self { message: message.into(), level: Some("warn".to_string()) }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_tracks_duration() {
        let mut export = SimExport::new("two_ticks", 42);
        for (i, t) in [0.0, 10.0, 20.0].into_iter().enumerate() {
            export.add_frame(SimFrame {
                time_sec: t,
                cycle: i as u64,
                ground_truth: Vec::new(),
                rendered: Vec::new(),
                selected: None,
                events: vec![SimEvent::info("tick")],
            });
        }
        export.finalize(true, None);

        assert_eq!(export.frames.len(), 3);
        assert_eq!(export.duration_sec, 20.0);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "two_ticks");
        assert!(json.get("failure_reason").is_none());
        assert!(json["frames"][0].get("selected").is_none());
    }
}
