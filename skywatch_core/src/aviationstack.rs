//! AviationStack flight schedule lookups.
//!
//! `GET /flights` answers `{"pagination": {...}, "data": [ ... ]}` or, on
//! failure, `{"error": {"code": "...", "message": "..."}}`.

use crate::error::DecodeError;
use crate::model::{FlightLeg, FlightRecord, RouteInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for the AviationStack client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AviationStackConfig {
    /// API root (default: `https://api.aviationstack.com/v1`)
    pub base_url: String,

    /// Access key. Requests fail with an API error when empty.
    pub access_key: String,

    /// Maximum flights per route query (default: 10)
    pub route_limit: u32,

    /// Request timeout (default: 10 000 ms)
    pub timeout_ms: u64,
}

impl Default for AviationStackConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.aviationstack.com/v1".to_string(),
            access_key: String::new(),
            route_limit: 10,
            timeout_ms: 10_000,
        }
    }
}

impl AviationStackConfig {
    pub fn with_access_key(access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            ..Self::default()
        }
    }

    pub fn flights_url(&self) -> String {
        format!("{}/flights", self.base_url.trim_end_matches('/'))
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct FlightsResponse {
    #[serde(default)]
    data: Option<Vec<RawFlight>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFlight {
    flight: RawFlightId,
    airline: Option<RawNamed>,
    aircraft: Option<RawAircraft>,
    departure: RawLeg,
    arrival: RawLeg,
    flight_status: Option<String>,
    distance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFlightId {
    iata: Option<String>,
    icao: Option<String>,
    duration: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAircraft {
    registration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLeg {
    airport: Option<String>,
    iata: Option<String>,
    scheduled: Option<String>,
    estimated: Option<String>,
    actual: Option<String>,
    terminal: Option<String>,
    gate: Option<String>,
}

impl From<RawLeg> for FlightLeg {
    fn from(raw: RawLeg) -> Self {
        FlightLeg {
            airport: raw.airport.unwrap_or_default(),
            iata: raw.iata.unwrap_or_default(),
            scheduled: raw.scheduled,
            estimated: raw.estimated,
            actual: raw.actual,
            terminal: raw.terminal,
            gate: raw.gate,
        }
    }
}

impl RawFlight {
    fn into_record(self) -> FlightRecord {
        let flight_number = self
            .flight
            .iata
            .filter(|s| !s.is_empty())
            .or(self.flight.icao)
            .unwrap_or_default();

        FlightRecord {
            flight_number,
            airline: self
                .airline
                .and_then(|a| a.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            aircraft_type: self.aircraft.and_then(|a| a.registration),
            departure: self.departure.into(),
            arrival: self.arrival.into(),
            status: self.flight_status.unwrap_or_else(|| "unknown".to_string()),
            duration_min: self.flight.duration.as_ref().and_then(parse_minutes),
        }
    }
}

/// Durations arrive as numbers or numeric strings; anything else is unknown.
fn parse_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|m| u32::try_from(m).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decode_response(json: &str) -> Result<Vec<RawFlight>, DecodeError> {
    let response: FlightsResponse = serde_json::from_str(json)?;
    if let Some(err) = response.error {
        return Err(DecodeError::Api {
            code: err.code,
            message: err.message,
        });
    }
    Ok(response.data.unwrap_or_default())
}

// ============================================================================
// DECODING
// ============================================================================

/// First flight in a flight-number answer, `None` when empty.
pub fn decode_flight(json: &str) -> Result<Option<FlightRecord>, DecodeError> {
    Ok(decode_response(json)?.into_iter().next().map(RawFlight::into_record))
}

/// Aggregate a route answer, `None` when no flights match.
pub fn decode_route(json: &str) -> Result<Option<RouteInfo>, DecodeError> {
    let raw = decode_response(json)?;
    let distance = raw.first().and_then(|f| f.distance);
    if raw.is_empty() {
        return Ok(None);
    }
    let flights = raw.into_iter().map(RawFlight::into_record).collect();
    Ok(Some(RouteInfo::from_flights(flights, distance)))
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[cfg(feature = "http")]
pub use client::AviationStackClient;

#[cfg(feature = "http")]
mod client {
    use super::*;
    use crate::feed::FlightLookup;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use reqwest::Client;
    use skywatch_env::EnvError;
    use std::time::Duration;
    use tracing::debug;

    /// Live AviationStack client.
    pub struct AviationStackClient {
        client: Client,
        config: AviationStackConfig,
    }

    impl AviationStackClient {
        pub fn new(config: AviationStackConfig) -> Result<Self, EnvError> {
            let client = Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| EnvError::network(e.to_string()))?;
            Ok(Self { client, config })
        }

        async fn get_flights(&self, query: &[(&str, String)]) -> Result<String, EnvError> {
            let response = self
                .client
                .get(self.config.flights_url())
                .query(&[("access_key", self.config.access_key.as_str())])
                .query(query)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        EnvError::Timeout(self.config.timeout_ms)
                    } else {
                        EnvError::network(e.without_url().to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(EnvError::http_status(status.as_u16(), "aviationstack"));
            }
            response
                .text()
                .await
                .map_err(|e| EnvError::network(e.without_url().to_string()))
        }
    }

    #[async_trait]
    impl FlightLookup for AviationStackClient {
        async fn fetch_by_flight_number(&self, code: &str) -> Result<Option<FlightRecord>, EnvError> {
            let query = [("flight_iata", code.trim().to_uppercase()), ("limit", "1".to_string())];
            let body = self.get_flights(&query).await?;
            Ok(decode_flight(&body)?)
        }

        async fn fetch_by_route(
            &self,
            origin: &str,
            destination: &str,
            date: Option<NaiveDate>,
        ) -> Result<Option<RouteInfo>, EnvError> {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            debug!(origin, destination, %date, "Route lookup");

            let query = [
                ("dep_iata", origin.trim().to_uppercase()),
                ("arr_iata", destination.trim().to_uppercase()),
                ("flight_date", date.format("%Y-%m-%d").to_string()),
                ("limit", self.config.route_limit.to_string()),
            ];
            let body = self.get_flights(&query).await?;
            Ok(decode_route(&body)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE: &str = r#"{
        "pagination": {"limit": 10, "offset": 0, "count": 3, "total": 3},
        "data": [
            {
                "flight_status": "active",
                "departure": {"airport": "Tribhuvan International", "iata": "KTM", "scheduled": "2024-05-01T10:00:00+00:00", "terminal": "I", "gate": null},
                "arrival": {"airport": "Suvarnabhumi", "iata": "BKK", "scheduled": "2024-05-01T15:00:00+00:00"},
                "airline": {"name": "Thai Airways International"},
                "flight": {"iata": "TG320", "icao": "THA320", "duration": 200},
                "aircraft": {"registration": "HS-TGA"},
                "distance": 1870.5
            },
            {
                "flight_status": "scheduled",
                "departure": {"airport": "Tribhuvan International", "iata": "KTM"},
                "arrival": {"airport": "Suvarnabhumi", "iata": "BKK"},
                "airline": {"name": "Nepal Airlines"},
                "flight": {"iata": null, "icao": "RNA209", "duration": "215"},
                "aircraft": null
            },
            {
                "flight_status": "scheduled",
                "departure": {"iata": "KTM"},
                "arrival": {"iata": "BKK"},
                "airline": {"name": "Thai Airways International"},
                "flight": {"iata": "TG319", "duration": "N/A"}
            }
        ]
    }"#;

    #[test]
    fn test_decode_route() {
        let info = decode_route(ROUTE).unwrap().unwrap();
        assert_eq!(info.flights.len(), 3);
        assert_eq!(
            info.airlines,
            vec!["Thai Airways International".to_string(), "Nepal Airlines".to_string()]
        );
        assert_eq!(info.route_distance_km, Some(1870.5));
        // (200 + 215) / 2 = 207 min
        assert_eq!(info.average_duration.as_deref(), Some("3h 27m"));

        let tg = &info.flights[0];
        assert_eq!(tg.flight_number, "TG320");
        assert_eq!(tg.aircraft_type.as_deref(), Some("HS-TGA"));
        assert_eq!(tg.departure.iata, "KTM");
        assert_eq!(tg.departure.terminal.as_deref(), Some("I"));
        assert!(tg.departure.gate.is_none());

        // iata missing → icao
        assert_eq!(info.flights[1].flight_number, "RNA209");
        assert_eq!(info.flights[2].duration_min, None);
    }

    #[test]
    fn test_empty_route_is_none() {
        assert!(decode_route(r#"{"data": []}"#).unwrap().is_none());
        assert!(decode_flight(r#"{"data": null}"#).unwrap().is_none());
    }

    #[test]
    fn test_decode_flight_takes_first() {
        let record = decode_flight(ROUTE).unwrap().unwrap();
        assert_eq!(record.flight_number, "TG320");
        assert_eq!(record.status, "active");
        assert_eq!(record.duration_min, Some(200));
    }

    #[test]
    fn test_api_error() {
        let json = r#"{"error": {"code": "invalid_access_key", "message": "You have not supplied a valid API Access Key."}}"#;
        match decode_flight(json) {
            Err(DecodeError::Api { code, .. }) => assert_eq!(code, "invalid_access_key"),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_key_from_caller() {
        let config = AviationStackConfig::with_access_key("secret");
        assert_eq!(config.access_key, "secret");
        assert_eq!(config.flights_url(), "https://api.aviationstack.com/v1/flights");
        assert!(AviationStackConfig::default().access_key.is_empty());
    }
}
