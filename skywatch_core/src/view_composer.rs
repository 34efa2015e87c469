//! The "VIEW" composer - decides what to draw and where to look.
//!
//! Given the active [`ViewMode`] and its data (live snapshot or route query)
//! the composer produces:
//! - the bounds the viewport should fit
//! - the route overlay geometry (endpoints, line, distance label)

use crate::geo::{midpoint, Bounds, GeoPoint};
use crate::model::{RouteQuery, TrackedObject};
use crate::surface::EndpointRole;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for bounds computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Padding added on each side as a fraction of the span (default: 0.08)
    pub padding_fraction: f64,

    /// Spans below this are widened so single points stay visible (default: 0.5°)
    pub min_span_deg: f64,

    /// Half-size of the region around a lone route endpoint (default: 5°)
    pub fallback_half_span_deg: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            padding_fraction: 0.08,
            min_span_deg: 0.5,
            fallback_half_span_deg: 5.0,
        }
    }
}

// ============================================================================
// VIEW MODE
// ============================================================================

/// The mutually exclusive operating state of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Idle,
    LiveTracking,
    RouteSearch,
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViewMode::Idle => "idle",
            ViewMode::LiveTracking => "live",
            ViewMode::RouteSearch => "route",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ROUTE OVERLAY
// ============================================================================

/// A pin at a resolved route endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointPin {
    pub role: EndpointRole,
    pub label: String,
    pub position: GeoPoint,
}

/// Distance text anchored at the midpoint of the route line.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceLabel {
    pub position: GeoPoint,
    pub distance_km: f64,
    pub text: String,
}

/// Everything drawn for a route search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOverlay {
    pub pins: Vec<EndpointPin>,

    /// Present only when both endpoints are resolved (may be zero-length)
    pub line: Option<[GeoPoint; 2]>,

    pub label: Option<DistanceLabel>,

    /// Endpoint labels that had no coordinates
    pub unresolved: Vec<String>,
}

impl RouteOverlay {
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty() && self.line.is_none() && self.label.is_none()
    }
}

// ============================================================================
// COMPOSER
// ============================================================================

/// Computes view bounds and overlays for each view mode.
#[derive(Debug, Clone, Default)]
pub struct ViewComposer {
    config: ComposerConfig,
}

impl ViewComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Bounds the viewport should fit, or `None` to leave the view unchanged.
    pub fn compute_bounds(
        &self,
        mode: ViewMode,
        live_objects: &[TrackedObject],
        route: Option<&RouteQuery>,
    ) -> Option<Bounds> {
        match mode {
            ViewMode::Idle => None,
            ViewMode::LiveTracking => Some(self.live_bounds(live_objects)),
            ViewMode::RouteSearch => Some(match route {
                Some(route) => self.route_bounds(route),
                None => Bounds::WORLD,
            }),
        }
    }

    /// Padded rectangle over all positioned objects, world when there are none.
    pub fn live_bounds<'a, I>(&self, objects: I) -> Bounds
    where
        I: IntoIterator<Item = &'a TrackedObject>,
    {
        match Bounds::enclosing(objects.into_iter().filter_map(|o| o.position)) {
            Some(b) => b.padded(self.config.padding_fraction, self.config.min_span_deg),
            None => Bounds::WORLD,
        }
    }

    /// Bounds for a route search.
    ///
    /// Both endpoints → padded enclosing rectangle; one → fallback region
    /// around it; none (including flight-number searches) → world.
    pub fn route_bounds(&self, route: &RouteQuery) -> Bounds {
        match route.endpoints() {
            (Some(a), Some(b)) => Bounds::enclosing([a, b])
                .map(|r| r.padded(self.config.padding_fraction, self.config.min_span_deg))
                .unwrap_or(Bounds::WORLD),
            (Some(p), None) | (None, Some(p)) => {
                Bounds::around(p, self.config.fallback_half_span_deg)
            }
            (None, None) => Bounds::WORLD,
        }
    }

    /// Endpoint pins, line and distance label for a route search.
    ///
    /// Identical endpoints collapse into a single pin with a zero-length
    /// line and a "0 km" label.
    pub fn compose_route_overlay(&self, route: &RouteQuery) -> RouteOverlay {
        let mut overlay = RouteOverlay::default();

        let (origin_label, destination_label, origin, destination) = match route {
            RouteQuery::FlightNumber { .. } => return overlay,
            RouteQuery::Route {
                origin_label,
                destination_label,
                origin_coords,
                destination_coords,
            } => (origin_label, destination_label, *origin_coords, *destination_coords),
        };

        match (origin, destination) {
            (Some(a), Some(b)) if a == b => {
                overlay.pins.push(EndpointPin {
                    role: EndpointRole::Both,
                    label: format!("{} / {}", origin_label, destination_label),
                    position: a,
                });
            }
            _ => {
                if let Some(a) = origin {
                    overlay.pins.push(EndpointPin {
                        role: EndpointRole::Origin,
                        label: origin_label.clone(),
                        position: a,
                    });
                } else {
                    overlay.unresolved.push(origin_label.clone());
                }
                if let Some(b) = destination {
                    overlay.pins.push(EndpointPin {
                        role: EndpointRole::Destination,
                        label: destination_label.clone(),
                        position: b,
                    });
                } else {
                    overlay.unresolved.push(destination_label.clone());
                }
            }
        }

        if let (Some(a), Some(b)) = (origin, destination) {
            let distance_km = a.haversine_km(&b);
            overlay.line = Some([a, b]);
            overlay.label = Some(DistanceLabel {
                position: midpoint(a, b),
                distance_km,
                text: format!("{:.0} km", distance_km),
            });
        }

        overlay
    }
}
