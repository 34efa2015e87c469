//! Data model shared by the feeds, the reconciler and the engine.

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};

// ============================================================================
// TRACKED OBJECTS (live feed)
// ============================================================================

/// Stable identifier of a tracked aircraft (e.g. ICAO24 transponder code).
///
/// Kept verbatim: ids that differ only by case are distinct markers. Feed
/// decoders normalise their own id formats before building one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional kinematic telemetry. Any field may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Ground speed in m/s
    pub speed_mps: Option<f64>,

    /// Barometric altitude in metres
    pub altitude_m: Option<f64>,

    /// True track in degrees clockwise from north
    pub heading_deg: Option<f64>,

    /// Vertical rate in m/s (positive = climbing)
    pub vertical_rate_mps: Option<f64>,

    pub on_ground: Option<bool>,
}

/// One live aircraft observation.
///
/// Snapshots are superseded wholesale every poll cycle; a `TrackedObject`
/// is never mutated in place after it leaves the feed decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: ObjectId,

    /// Display callsign
    pub label: Option<String>,

    /// Country or region of registration
    pub origin_region: String,

    /// `None` when the feed did not report a usable position
    pub position: Option<GeoPoint>,

    pub telemetry: Telemetry,
}

impl TrackedObject {
    /// A positioned object with no telemetry.
    pub fn at(id: impl AsRef<str>, position: GeoPoint) -> Self {
        Self {
            id: ObjectId::new(id),
            label: None,
            origin_region: String::new(),
            position: Some(position),
            telemetry: Telemetry::default(),
        }
    }

    /// Whether the object can be drawn (and counted in bounds).
    pub fn is_renderable(&self) -> bool {
        self.position.is_some()
    }

    /// Callsign if present, otherwise the transponder id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(self.id.as_str())
    }
}

// ============================================================================
// SEARCH (route / flight number)
// ============================================================================

/// A user search outcome. Exactly one mode per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouteQuery {
    /// Search by flight number (no geometry of its own).
    FlightNumber { code: String },

    /// Search by origin/destination. Labels always render; coordinates may
    /// be unresolved, in which case no line is drawn.
    Route {
        origin_label: String,
        destination_label: String,
        origin_coords: Option<GeoPoint>,
        destination_coords: Option<GeoPoint>,
    },
}

impl RouteQuery {
    pub fn flight(code: impl Into<String>) -> Self {
        RouteQuery::FlightNumber { code: code.into() }
    }

    pub fn route(
        origin_label: impl Into<String>,
        destination_label: impl Into<String>,
        origin_coords: Option<GeoPoint>,
        destination_coords: Option<GeoPoint>,
    ) -> Self {
        RouteQuery::Route {
            origin_label: origin_label.into(),
            destination_label: destination_label.into(),
            origin_coords,
            destination_coords,
        }
    }

    /// Resolved endpoint coordinates (origin, destination).
    pub fn endpoints(&self) -> (Option<GeoPoint>, Option<GeoPoint>) {
        match self {
            RouteQuery::FlightNumber { .. } => (None, None),
            RouteQuery::Route { origin_coords, destination_coords, .. } => {
                (*origin_coords, *destination_coords)
            }
        }
    }

    /// Short human readable description ("Flight AA123", "KTM → BKK").
    pub fn title(&self) -> String {
        match self {
            RouteQuery::FlightNumber { code } => format!("Flight {}", code),
            RouteQuery::Route { origin_label, destination_label, .. } => {
                format!("{} → {}", origin_label, destination_label)
            }
        }
    }
}

/// One end of a scheduled flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightLeg {
    pub airport: String,
    pub iata: String,
    pub scheduled: Option<String>,
    pub estimated: Option<String>,
    pub actual: Option<String>,
    pub terminal: Option<String>,
    pub gate: Option<String>,
}

/// A full flight record from the primary lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub flight_number: String,
    pub airline: String,
    pub aircraft_type: Option<String>,
    pub departure: FlightLeg,
    pub arrival: FlightLeg,
    pub status: String,

    /// Scheduled duration in minutes
    pub duration_min: Option<u32>,
}

/// Aggregated result of a route lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub flights: Vec<FlightRecord>,

    /// Unique airlines in first-seen order
    pub airlines: Vec<String>,

    pub route_distance_km: Option<f64>,

    /// Average duration formatted as "{h}h {m}m"
    pub average_duration: Option<String>,
}

impl RouteInfo {
    /// Aggregate a list of flights into a route summary.
    pub fn from_flights(flights: Vec<FlightRecord>, route_distance_km: Option<f64>) -> Self {
        let mut airlines: Vec<String> = Vec::new();
        for flight in &flights {
            if !airlines.contains(&flight.airline) {
                airlines.push(flight.airline.clone());
            }
        }
        let average_duration = average_duration(&flights);

        Self {
            flights,
            airlines,
            route_distance_km,
            average_duration,
        }
    }
}

/// Average of the known flight durations, formatted "{h}h {m}m".
pub fn average_duration(flights: &[FlightRecord]) -> Option<String> {
    let durations: Vec<u32> = flights.iter().filter_map(|f| f.duration_min).collect();
    if durations.is_empty() {
        return None;
    }
    let total: u64 = durations.iter().map(|&d| d as u64).sum();
    let average = total / durations.len() as u64;
    Some(format!("{}h {}m", average / 60, average % 60))
}

/// Airborne/on-ground state from a sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SightingStatus {
    InFlight,
    OnGround,
}

/// Sparse result of the degraded lookup path: the aircraft was seen by the
/// live feed but nothing is known about its schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSighting {
    pub callsign: String,
    pub status: SightingStatus,
    pub position: Option<GeoPoint>,
}

/// Result of a flight-number lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightLookupOutcome {
    /// Primary service answered with a full record.
    Found(FlightRecord),

    /// Primary service failed; the aircraft was only seen by the live feed.
    Degraded(FlightSighting),

    /// Valid request, no data.
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(airline: &str, duration_min: Option<u32>) -> FlightRecord {
        FlightRecord {
            flight_number: "TG320".to_string(),
            airline: airline.to_string(),
            aircraft_type: None,
            departure: FlightLeg::default(),
            arrival: FlightLeg::default(),
            status: "scheduled".to_string(),
            duration_min,
        }
    }

    #[test]
    fn test_object_id_is_verbatim() {
        assert_eq!(ObjectId::new("B").as_str(), "B");
        assert_eq!(ObjectId::from("abc123"), ObjectId::new("abc123"));
        assert_ne!(ObjectId::new("ABC123"), ObjectId::new("abc123"));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let p = GeoPoint::new(1.0, 2.0).unwrap();
        let mut obj = TrackedObject::at("a1b2c3", p);
        assert_eq!(obj.display_name(), "a1b2c3");
        obj.label = Some("THA320".to_string());
        assert_eq!(obj.display_name(), "THA320");
    }

    #[test]
    fn test_route_query_endpoints() {
        let ktm = GeoPoint::new(27.7172, 85.324).unwrap();
        let q = RouteQuery::route("Kathmandu", "Bangkok", Some(ktm), None);
        assert_eq!(q.endpoints(), (Some(ktm), None));
        assert_eq!(q.title(), "Kathmandu → Bangkok");

        let f = RouteQuery::flight("AA123");
        assert_eq!(f.endpoints(), (None, None));
        assert_eq!(f.title(), "Flight AA123");
    }

    #[test]
    fn test_route_info_aggregates_airlines_and_duration() {
        let info = RouteInfo::from_flights(
            vec![
                record("Thai Airways", Some(150)),
                record("Nepal Airlines", None),
                record("Thai Airways", Some(170)),
            ],
            None,
        );
        assert_eq!(info.airlines, vec!["Thai Airways", "Nepal Airlines"]);
        assert_eq!(info.average_duration.as_deref(), Some("2h 40m"));
    }

    #[test]
    fn test_average_duration_none_without_data() {
        assert_eq!(average_duration(&[record("X", None)]), None);
        assert_eq!(average_duration(&[]), None);
    }
}
