//! Built-in airport table used to resolve route endpoints.

use crate::geo::GeoPoint;

/// A known airport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Airport {
    pub iata: &'static str,
    pub city: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Airport {
    pub fn position(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.lat, self.lon).ok()
    }
}

const AIRPORTS: &[Airport] = &[
    Airport { iata: "JFK", city: "New York", lat: 40.6413, lon: -73.7781 },
    Airport { iata: "LAX", city: "Los Angeles", lat: 33.9425, lon: -118.4081 },
    Airport { iata: "LHR", city: "London", lat: 51.47, lon: -0.4543 },
    Airport { iata: "CDG", city: "Paris", lat: 49.0097, lon: 2.5479 },
    Airport { iata: "DXB", city: "Dubai", lat: 25.2532, lon: 55.3657 },
    Airport { iata: "NRT", city: "Tokyo", lat: 35.7647, lon: 140.3864 },
    Airport { iata: "SIN", city: "Singapore", lat: 1.3644, lon: 103.9915 },
    Airport { iata: "BKK", city: "Bangkok", lat: 13.69, lon: 100.7501 },
    Airport { iata: "KTM", city: "Kathmandu", lat: 27.6966, lon: 85.3591 },
    Airport { iata: "DEL", city: "Delhi", lat: 28.5562, lon: 77.1 },
    Airport { iata: "BOM", city: "Mumbai", lat: 19.0896, lon: 72.8656 },
];

/// All known airports.
pub fn all() -> &'static [Airport] {
    AIRPORTS
}

/// Find an airport by IATA code or city name (case-insensitive).
pub fn find(query: &str) -> Option<&'static Airport> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    AIRPORTS
        .iter()
        .find(|a| a.iata.eq_ignore_ascii_case(query))
        .or_else(|| AIRPORTS.iter().find(|a| a.city.eq_ignore_ascii_case(query)))
}

/// Coordinates for an IATA code or city name.
pub fn resolve(query: &str) -> Option<GeoPoint> {
    find(query).and_then(Airport::position)
}
