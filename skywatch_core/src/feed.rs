//! Collaborator interfaces for the live feed and flight lookups.
//!
//! The engine consumes typed results only. Transport, retries and caching
//! belong to the implementations.

use crate::error::SyncError;
use crate::model::{FlightLookupOutcome, FlightRecord, FlightSighting, RouteInfo, TrackedObject};
use async_trait::async_trait;
use chrono::NaiveDate;
use skywatch_env::EnvError;
use tracing::{debug, warn};

/// Source of live position snapshots.
#[async_trait]
pub trait SnapshotFeed: Send + Sync + 'static {
    /// Fetch the current set of tracked objects.
    async fn fetch_snapshot(&self) -> Result<Vec<TrackedObject>, EnvError>;
}

/// Primary flight schedule service.
///
/// `Ok(None)` means the request was valid but returned no data.
#[async_trait]
pub trait FlightLookup: Send + Sync {
    async fn fetch_by_flight_number(&self, code: &str) -> Result<Option<FlightRecord>, EnvError>;

    /// Flights between two IATA codes. `date` defaults to today.
    async fn fetch_by_route(
        &self,
        origin: &str,
        destination: &str,
        date: Option<NaiveDate>,
    ) -> Result<Option<RouteInfo>, EnvError>;
}

/// Secondary source that can only confirm an aircraft was seen.
#[async_trait]
pub trait SightingSource: Send + Sync {
    async fn find_sighting(&self, callsign: &str) -> Result<Option<FlightSighting>, EnvError>;
}

/// A sighting source that never sees anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSightings;

#[async_trait]
impl SightingSource for NoSightings {
    async fn find_sighting(&self, _callsign: &str) -> Result<Option<FlightSighting>, EnvError> {
        Ok(None)
    }
}

/// Flight lookup with an explicit degraded path.
///
/// The sighting source is consulted only when the primary service fails.
/// A hit comes back as [`FlightLookupOutcome::Degraded`], never dressed up
/// as a full [`FlightRecord`].
pub struct FallbackLookup<P, D = NoSightings> {
    primary: P,
    degraded: D,
}

impl<P: FlightLookup> FallbackLookup<P, NoSightings> {
    pub fn primary_only(primary: P) -> Self {
        Self { primary, degraded: NoSightings }
    }
}

impl<P: FlightLookup, D: SightingSource> FallbackLookup<P, D> {
    pub fn new(primary: P, degraded: D) -> Self {
        Self { primary, degraded }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub async fn lookup_flight(&self, code: &str) -> Result<FlightLookupOutcome, SyncError> {
        let primary_err = match self.primary.fetch_by_flight_number(code).await {
            Ok(Some(record)) => return Ok(FlightLookupOutcome::Found(record)),
            Ok(None) => return Ok(FlightLookupOutcome::NotFound),
            Err(e) => e,
        };

        warn!(flight = code, error = %primary_err, "Primary lookup failed, trying sightings");

        match self.degraded.find_sighting(code).await {
            Ok(Some(sighting)) => {
                debug!(flight = code, "Degraded lookup hit");
                Ok(FlightLookupOutcome::Degraded(sighting))
            }
            Ok(None) => Ok(FlightLookupOutcome::NotFound),
            Err(e) => Err(SyncError::FetchFailure(format!(
                "{} (fallback: {})",
                primary_err, e
            ))),
        }
    }

    /// Route lookups have no degraded path.
    pub async fn lookup_route(
        &self,
        origin: &str,
        destination: &str,
        date: Option<NaiveDate>,
    ) -> Result<Option<RouteInfo>, SyncError> {
        Ok(self.primary.fetch_by_route(origin, destination, date).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlightLeg, SightingStatus};

    fn record(code: &str) -> FlightRecord {
        FlightRecord {
            flight_number: code.to_string(),
            airline: "Thai Airways".to_string(),
            aircraft_type: None,
            departure: FlightLeg::default(),
            arrival: FlightLeg::default(),
            status: "active".to_string(),
            duration_min: Some(200),
        }
    }

    enum Primary {
        Found,
        Missing,
        Down,
    }

    #[async_trait]
    impl FlightLookup for Primary {
        async fn fetch_by_flight_number(&self, code: &str) -> Result<Option<FlightRecord>, EnvError> {
            match self {
                Primary::Found => Ok(Some(record(code))),
                Primary::Missing => Ok(None),
                Primary::Down => Err(EnvError::http_status(503, "aviationstack")),
            }
        }

        async fn fetch_by_route(
            &self,
            _origin: &str,
            _destination: &str,
            _date: Option<NaiveDate>,
        ) -> Result<Option<RouteInfo>, EnvError> {
            match self {
                Primary::Down => Err(EnvError::network("unreachable")),
                _ => Ok(None),
            }
        }
    }

    enum Sightings {
        Seen,
        Unseen,
        Down,
    }

    #[async_trait]
    impl SightingSource for Sightings {
        async fn find_sighting(&self, callsign: &str) -> Result<Option<FlightSighting>, EnvError> {
            match self {
                Sightings::Seen => Ok(Some(FlightSighting {
                    callsign: callsign.to_string(),
                    status: SightingStatus::InFlight,
                    position: None,
                })),
                Sightings::Unseen => Ok(None),
                Sightings::Down => Err(EnvError::network("unreachable")),
            }
        }
    }

    #[tokio::test]
    async fn test_primary_hit_skips_fallback() {
        let lookup = FallbackLookup::new(Primary::Found, Sightings::Down);
        let outcome = lookup.lookup_flight("TG320").await.unwrap();
        assert_eq!(outcome, FlightLookupOutcome::Found(record("TG320")));
    }

    #[tokio::test]
    async fn test_primary_not_found_skips_fallback() {
        let lookup = FallbackLookup::new(Primary::Missing, Sightings::Seen);
        assert_eq!(lookup.lookup_flight("TG320").await.unwrap(), FlightLookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_primary_error_yields_degraded() {
        let lookup = FallbackLookup::new(Primary::Down, Sightings::Seen);
        match lookup.lookup_flight("TG320").await.unwrap() {
            FlightLookupOutcome::Degraded(s) => {
                assert_eq!(s.callsign, "TG320");
                assert_eq!(s.status, SightingStatus::InFlight);
            }
            other => panic!("expected degraded outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_both_fail() {
        let lookup = FallbackLookup::new(Primary::Down, Sightings::Down);
        let err = lookup.lookup_flight("TG320").await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailure(_)));
        assert!(err.is_user_visible());

        let lookup = FallbackLookup::new(Primary::Down, Sightings::Unseen);
        assert_eq!(lookup.lookup_flight("TG320").await.unwrap(), FlightLookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_route_error_is_fetch_failure() {
        let lookup = FallbackLookup::primary_only(Primary::Down);
        let err = lookup.lookup_route("KTM", "BKK", None).await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailure(_)));
    }
}
