//! OpenSky Network state-vector feed.
//!
//! `GET /states/all` answers with
//! `{"time": 1700000000, "states": [[icao24, callsign, origin_country,
//! time_position, last_contact, longitude, latitude, baro_altitude,
//! on_ground, velocity, true_track, vertical_rate, ...], ...]}`.
//! `states` is `null` when nothing is in view.
//!
//! Decoding is always available; the HTTP client needs the `http` feature.

use crate::error::DecodeError;
use crate::geo::{Bounds, GeoPoint};
use crate::model::{FlightSighting, ObjectId, SightingStatus, Telemetry, TrackedObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

// State vector column indices
const ICAO24: usize = 0;
const CALLSIGN: usize = 1;
const ORIGIN_COUNTRY: usize = 2;
const LONGITUDE: usize = 5;
const LATITUDE: usize = 6;
const BARO_ALTITUDE: usize = 7;
const ON_GROUND: usize = 8;
const VELOCITY: usize = 9;
const TRUE_TRACK: usize = 10;
const VERTICAL_RATE: usize = 11;

/// Configuration for the OpenSky feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSkyConfig {
    /// API root (default: `https://opensky-network.org/api`)
    pub base_url: String,

    /// Keep aircraft reporting `on_ground` (default: false)
    pub include_on_ground: bool,

    /// Restrict the query to a bounding box
    pub bbox: Option<Bounds>,

    /// Request timeout (default: 10 000 ms)
    pub timeout_ms: u64,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://opensky-network.org/api".to_string(),
            include_on_ground: false,
            bbox: None,
            timeout_ms: 10_000,
        }
    }
}

impl OpenSkyConfig {
    /// Query parameters for a snapshot request.
    pub fn snapshot_query(&self) -> Vec<(&'static str, String)> {
        match &self.bbox {
            Some(b) => vec![
                ("lamin", b.min_lat.to_string()),
                ("lomin", b.min_lon.to_string()),
                ("lamax", b.max_lat.to_string()),
                ("lomax", b.max_lon.to_string()),
            ],
            None => Vec::new(),
        }
    }

    pub fn states_url(&self) -> String {
        format!("{}/states/all", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    states: Option<Vec<Vec<Value>>>,
}

/// Decode a `/states/all` payload into a snapshot.
///
/// Rows without a usable icao24 are skipped. Rows without coordinates are
/// kept with `position = None`; the reconciler counts and skips them.
pub fn decode_states(json: &str, config: &OpenSkyConfig) -> Result<Vec<TrackedObject>, DecodeError> {
    let response: StatesResponse = serde_json::from_str(json)?;
    let rows = response.states.unwrap_or_default();

    let mut objects = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let Some(object) = decode_row(row) else {
            trace!(index, "Skipping state vector without icao24");
            continue;
        };
        if !config.include_on_ground && object.telemetry.on_ground == Some(true) {
            continue;
        }
        objects.push(object);
    }
    Ok(objects)
}

/// Decode one state vector row.
pub fn decode_row(row: &[Value]) -> Option<TrackedObject> {
    // Transponder addresses are keyed as lower-case hex
    let icao24 = text(row, ICAO24)
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())?;

    let label = text(row, CALLSIGN).filter(|s| !s.is_empty());
    let position = GeoPoint::from_options(number(row, LATITUDE), number(row, LONGITUDE));

    Some(TrackedObject {
        id: ObjectId::new(&icao24),
        label,
        origin_region: text(row, ORIGIN_COUNTRY).unwrap_or_default(),
        position,
        telemetry: Telemetry {
            speed_mps: number(row, VELOCITY),
            altitude_m: number(row, BARO_ALTITUDE),
            heading_deg: number(row, TRUE_TRACK),
            vertical_rate_mps: number(row, VERTICAL_RATE),
            on_ground: row.get(ON_GROUND).and_then(Value::as_bool),
        },
    })
}

/// Decode a single-aircraft `/states/all?icao24=` answer into a sighting.
pub fn decode_sighting(json: &str, callsign: &str) -> Result<Option<FlightSighting>, DecodeError> {
    let response: StatesResponse = serde_json::from_str(json)?;
    let Some(row) = response.states.unwrap_or_default().into_iter().next() else {
        return Ok(None);
    };
    let Some(object) = decode_row(&row) else {
        return Ok(None);
    };

    let status = if object.telemetry.on_ground == Some(true) {
        SightingStatus::OnGround
    } else {
        SightingStatus::InFlight
    };
    Ok(Some(FlightSighting {
        callsign: callsign.to_string(),
        status,
        position: object.position,
    }))
}

fn text(row: &[Value], index: usize) -> Option<String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

fn number(row: &[Value], index: usize) -> Option<f64> {
    row.get(index).and_then(Value::as_f64)
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[cfg(feature = "http")]
pub use client::OpenSkyFeed;

#[cfg(feature = "http")]
mod client {
    use super::*;
    use crate::feed::{SightingSource, SnapshotFeed};
    use async_trait::async_trait;
    use reqwest::Client;
    use skywatch_env::EnvError;
    use std::time::Duration;
    use tracing::debug;

    /// Live OpenSky client.
    pub struct OpenSkyFeed {
        client: Client,
        config: OpenSkyConfig,
    }

    impl OpenSkyFeed {
        pub fn new(config: OpenSkyConfig) -> Result<Self, EnvError> {
            let client = Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| EnvError::network(e.to_string()))?;
            Ok(Self { client, config })
        }

        pub fn config(&self) -> &OpenSkyConfig {
            &self.config
        }

        async fn get_states(&self, query: &[(&str, String)]) -> Result<String, EnvError> {
            let response = self
                .client
                .get(self.config.states_url())
                .query(query)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        EnvError::Timeout(self.config.timeout_ms)
                    } else {
                        EnvError::network(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(EnvError::http_status(status.as_u16(), "opensky"));
            }
            response.text().await.map_err(|e| EnvError::network(e.to_string()))
        }
    }

    #[async_trait]
    impl SnapshotFeed for OpenSkyFeed {
        async fn fetch_snapshot(&self) -> Result<Vec<TrackedObject>, EnvError> {
            let body = self.get_states(&self.config.snapshot_query()).await?;
            let objects = decode_states(&body, &self.config)?;
            debug!(count = objects.len(), "OpenSky snapshot decoded");
            Ok(objects)
        }
    }

    #[async_trait]
    impl SightingSource for OpenSkyFeed {
        async fn find_sighting(&self, callsign: &str) -> Result<Option<FlightSighting>, EnvError> {
            let query = [("icao24", callsign.trim().to_lowercase())];
            let body = self.get_states(&query).await?;
            Ok(decode_sighting(&body, callsign)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "time": 1700000000,
        "states": [
            ["4ca2d1", "EIN123  ", "Ireland", 1700000000, 1700000000, -6.27, 53.42, 10668.0, false, 231.5, 94.2, 0.0, null, 10900.0, "1000", false, 0],
            ["a0b1c2", "", "United States", null, 1700000000, null, null, null, false, null, null, null, null, null, null, false, 0],
            ["ab12cd", "DAL9", "United States", 1700000000, 1700000000, -84.43, 33.64, null, true, 0.0, 270.0, null, null, null, null, false, 0],
            [null, "GHOST", "Nowhere", null, null, 1.0, 1.0, null, false, null, null, null]
        ]
    }"#;

    #[test]
    fn test_decode_states() {
        let objects = decode_states(SAMPLE, &OpenSkyConfig::default()).unwrap();

        // on-ground and id-less rows dropped, position-less kept
        assert_eq!(objects.len(), 2);

        let ein = &objects[0];
        assert_eq!(ein.id, ObjectId::new("4ca2d1"));
        assert_eq!(ein.label.as_deref(), Some("EIN123"));
        assert_eq!(ein.origin_region, "Ireland");
        assert_eq!(ein.position, Some(GeoPoint::new(53.42, -6.27).unwrap()));
        assert_eq!(ein.telemetry.altitude_m, Some(10668.0));
        assert_eq!(ein.telemetry.heading_deg, Some(94.2));

        let unpositioned = &objects[1];
        assert!(unpositioned.label.is_none());
        assert!(unpositioned.position.is_none());
    }

    #[test]
    fn test_icao24_normalised_to_lower_hex() {
        let row: Vec<Value> = serde_json::from_str(
            r#"[" 4CA2D1 ", "EIN123", "Ireland", null, null, -6.27, 53.42, null, false, null, null, null]"#,
        )
        .unwrap();
        let object = decode_row(&row).unwrap();
        assert_eq!(object.id.as_str(), "4ca2d1");
    }

    #[test]
    fn test_include_on_ground() {
        let config = OpenSkyConfig { include_on_ground: true, ..Default::default() };
        let objects = decode_states(SAMPLE, &config).unwrap();
        assert_eq!(objects.len(), 3);
    }

    #[test]
    fn test_null_states_is_empty() {
        let objects = decode_states(r#"{"time": 1, "states": null}"#, &OpenSkyConfig::default()).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            decode_states("<html>", &OpenSkyConfig::default()),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_bbox_query() {
        let config = OpenSkyConfig {
            bbox: Some(Bounds { min_lat: 45.0, min_lon: 5.0, max_lat: 48.0, max_lon: 10.0 }),
            ..Default::default()
        };
        let query = config.snapshot_query();
        assert_eq!(query[0], ("lamin", "45".to_string()));
        assert_eq!(query[3], ("lomax", "10".to_string()));
        assert!(OpenSkyConfig::default().snapshot_query().is_empty());
        assert_eq!(config.states_url(), "https://opensky-network.org/api/states/all");
    }

    #[test]
    fn test_decode_sighting() {
        let json = r#"{"time": 1, "states": [["ab12cd", "DAL9", "United States", 1, 1, -84.43, 33.64, null, true, 0.0, 270.0, null]]}"#;
        let sighting = decode_sighting(json, "DAL9").unwrap().unwrap();
        assert_eq!(sighting.callsign, "DAL9");
        assert_eq!(sighting.status, SightingStatus::OnGround);
        assert!(sighting.position.is_some());

        assert!(decode_sighting(r#"{"states": []}"#, "X").unwrap().is_none());
    }
}
