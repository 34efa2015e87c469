//! Ground truth fleet for simulation.
//!
//! The fleet is the "truth" behind the simulated live feed:
//! - True positions of all airborne aircraft
//! - Flat kinematics (heading + speed per tick)
//! - Arrivals and departures between ticks
//! - Feed defects: duplicate rows, missing positions, position noise

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use skywatch_core::model::Telemetry;
use skywatch_core::{GeoPoint, ObjectId, TrackedObject};
use std::collections::BTreeSet;

/// Metres per degree of latitude.
const METRES_PER_DEG: f64 = 111_320.0;

/// Aircraft stay clear of the poles so flat kinematics stay sane.
const MAX_LAT: f64 = 80.0;

const REGIONS: [&str; 6] = ["Thailand", "Nepal", "India", "United Kingdom", "France", "Japan"];
const AIRLINES: [&str; 6] = ["TG", "RA", "AI", "BA", "AF", "JL"];

/// One simulated aircraft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimAircraft {
    /// 24-bit transponder address, lowercase hex
    pub icao24: String,
    pub callsign: String,
    pub region: String,
    pub lat: f64,
    pub lon: f64,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub altitude_m: f64,
}

impl SimAircraft {
    /// Advance along the current heading.
    pub fn step(&mut self, dt_secs: f64) {
        let distance_deg = self.speed_mps * dt_secs / METRES_PER_DEG;
        let heading = self.heading_deg.to_radians();

        self.lat += distance_deg * heading.cos();
        let cos_lat = self.lat.to_radians().cos().max(0.1);
        self.lon += distance_deg * heading.sin() / cos_lat;

        if self.lat.abs() > MAX_LAT {
            self.lat = self.lat.clamp(-MAX_LAT, MAX_LAT);
            self.heading_deg = (180.0 - self.heading_deg).rem_euclid(360.0);
        }
        self.lon = wrap_lon(self.lon);
    }

    fn observe(&self, position: Option<GeoPoint>) -> TrackedObject {
        TrackedObject {
            id: ObjectId::new(&self.icao24),
            label: Some(self.callsign.clone()),
            origin_region: self.region.clone(),
            position,
            telemetry: Telemetry {
                speed_mps: Some(self.speed_mps),
                altitude_m: Some(self.altitude_m),
                heading_deg: Some(self.heading_deg),
                vertical_rate_mps: Some(0.0),
                on_ground: Some(false),
            },
        }
    }
}

fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Knobs for fleet churn and feed defects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub initial_aircraft: usize,

    /// Probability per aircraft per tick of leaving the feed
    pub departure_rate: f64,

    /// Expected new aircraft per tick
    pub arrival_rate: f64,

    /// Probability per row of an extra stale copy earlier in the snapshot
    pub duplicate_rate: f64,

    /// Probability per row of a missing position
    pub missing_position_rate: f64,

    /// Standard deviation of reported position noise in degrees
    pub noise_deg: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            initial_aircraft: 20,
            departure_rate: 0.02,
            arrival_rate: 0.4,
            duplicate_rate: 0.0,
            missing_position_rate: 0.0,
            noise_deg: 0.0,
        }
    }
}

impl FleetConfig {
    /// A feed with every defect turned on.
    pub fn dirty() -> Self {
        Self {
            duplicate_rate: 0.1,
            missing_position_rate: 0.1,
            noise_deg: 0.01,
            ..Self::default()
        }
    }

    /// No churn: the same aircraft every tick.
    pub fn steady(initial_aircraft: usize) -> Self {
        Self {
            initial_aircraft,
            departure_rate: 0.0,
            arrival_rate: 0.0,
            ..Self::default()
        }
    }
}

/// A snapshot as the feed would deliver it, plus the ids that should end
/// up rendered once it is reconciled.
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    pub objects: Vec<TrackedObject>,
    pub expected_ids: BTreeSet<ObjectId>,
}

/// The simulated airspace.
pub struct Fleet {
    config: FleetConfig,
    aircraft: Vec<SimAircraft>,
    rng: ChaCha8Rng,
    next_address: u32,
}

impl Fleet {
    /// Creates a fleet seeded from `rng`.
    pub fn new(config: FleetConfig, rng: ChaCha8Rng) -> Self {
        let mut fleet = Self {
            config,
            aircraft: Vec::new(),
            rng,
            next_address: 0,
        };
        fleet.next_address = fleet.rng.gen_range(0x100000..0x800000);
        for _ in 0..fleet.config.initial_aircraft {
            fleet.spawn_aircraft();
        }
        fleet
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    pub fn aircraft(&self) -> &[SimAircraft] {
        &self.aircraft
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Ids of aircraft currently airborne.
    pub fn ids(&self) -> BTreeSet<ObjectId> {
        self.aircraft.iter().map(|a| ObjectId::new(&a.icao24)).collect()
    }

    /// Remove every aircraft (simulates an empty feed answer).
    pub fn ground_all(&mut self) {
        self.aircraft.clear();
    }

    /// Advance physics and churn by one tick.
    pub fn step(&mut self, dt_secs: f64) {
        for aircraft in &mut self.aircraft {
            aircraft.step(dt_secs);
        }

        let departure_rate = self.config.departure_rate;
        if departure_rate > 0.0 {
            let rng = &mut self.rng;
            self.aircraft.retain(|_| !rng.gen_bool(departure_rate.min(1.0)));
        }

        let mut arrivals = self.config.arrival_rate;
        while arrivals > 0.0 {
            if self.rng.gen_bool(arrivals.min(1.0)) {
                self.spawn_aircraft();
            }
            arrivals -= 1.0;
        }
    }

    /// Produce the feed's view of the fleet, defects included.
    pub fn snapshot(&mut self) -> FleetSnapshot {
        let noise = Normal::new(0.0, self.config.noise_deg.max(0.0)).ok();
        let mut objects = Vec::with_capacity(self.aircraft.len());
        let mut expected_ids = BTreeSet::new();

        for aircraft in &self.aircraft {
            if self.rng.gen_bool(self.config.duplicate_rate.clamp(0.0, 1.0)) {
                // Stale echo first; the later row wins
                let echo = GeoPoint::new(aircraft.lat, aircraft.lon).ok();
                objects.push(aircraft.observe(echo));
            }

            let position = if self.rng.gen_bool(self.config.missing_position_rate.clamp(0.0, 1.0)) {
                None
            } else {
                let (dlat, dlon) = match &noise {
                    Some(n) => (n.sample(&mut self.rng), n.sample(&mut self.rng)),
                    None => (0.0, 0.0),
                };
                let lat = (aircraft.lat + dlat).clamp(-90.0, 90.0);
                let lon = wrap_lon(aircraft.lon + dlon);
                GeoPoint::new(lat, lon).ok()
            };

            if position.is_some() {
                expected_ids.insert(ObjectId::new(&aircraft.icao24));
            }
            objects.push(aircraft.observe(position));
        }

        FleetSnapshot { objects, expected_ids }
    }

    fn spawn_aircraft(&mut self) {
        let address = self.next_address;
        self.next_address = self.next_address.wrapping_add(self.rng.gen_range(1..64)) & 0xFF_FFFF;

        let airline = AIRLINES[self.rng.gen_range(0..AIRLINES.len())];
        let region_index = self.rng.gen_range(0..REGIONS.len());
        let aircraft = SimAircraft {
            icao24: format!("{:06x}", address),
            callsign: format!("{}{}", airline, self.rng.gen_range(100..1000)),
            region: REGIONS[region_index].to_string(),
            lat: self.rng.gen_range(-60.0..60.0),
            lon: self.rng.gen_range(-179.0..179.0),
            heading_deg: self.rng.gen_range(0.0..360.0),
            speed_mps: self.rng.gen_range(180.0..260.0),
            altitude_m: self.rng.gen_range(8_000.0..12_500.0),
        };
        self.aircraft.push(aircraft);
    }
}
