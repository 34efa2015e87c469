//! Render surface capability interface.
//!
//! The map widget itself is an external collaborator. The engine drives it
//! exclusively through [`RenderSurface`] and never reaches into its internals.

use crate::geo::{Bounds, GeoPoint};
use crate::model::ObjectId;
use serde::{Deserialize, Serialize};

/// Opaque handle to a marker on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerHandle(pub u64);

/// Opaque handle to a polyline on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineHandle(pub u64);

/// Which end of a route a marker represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointRole {
    Origin,
    Destination,
    /// Origin and destination coincide
    Both,
}

/// How a marker should be drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IconSpec {
    /// Live aircraft, rotated to its heading.
    Aircraft {
        heading_deg: Option<f64>,
        on_ground: bool,
        highlighted: bool,
    },

    /// Origin/destination pin of a route search.
    RouteEndpoint { role: EndpointRole, label: String },

    /// Text label anchored at the route midpoint.
    DistanceLabel { text: String },
}

/// Polyline styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: String,
    pub weight: f32,
    pub dashed: bool,
}

impl LineStyle {
    /// Style used for route lines.
    pub fn route() -> Self {
        Self {
            color: "#2563eb".to_string(),
            weight: 3.0,
            dashed: true,
        }
    }
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::route()
    }
}

/// Padding in screen pixels applied when fitting a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPadding(pub u32);

/// The capabilities the engine needs from a map widget.
///
/// Implementations are single-owner: an engine instance holds its surface
/// exclusively and calls it synchronously from within a poll cycle.
pub trait RenderSurface: Send + 'static {
    /// Place a marker and return its handle.
    fn add_marker(&mut self, id: &ObjectId, position: GeoPoint, icon: &IconSpec) -> MarkerHandle;

    /// Move/restyle an existing marker. Applying the same update twice is a no-op.
    fn update_marker(&mut self, handle: MarkerHandle, position: GeoPoint, icon: &IconSpec);

    fn remove_marker(&mut self, handle: MarkerHandle);

    /// Draw a polyline. A zero-length line (identical points) is valid.
    fn draw_line(&mut self, points: &[GeoPoint], style: &LineStyle) -> LineHandle;

    fn remove_line(&mut self, handle: LineHandle);

    /// Fit the viewport to `bounds`.
    fn fit_view(&mut self, bounds: Bounds, padding: ViewPadding);

    /// Re-centre on `position`, never zooming out past the current zoom and
    /// zooming in to at least `min_zoom`.
    fn center_on(&mut self, position: GeoPoint, min_zoom: u8);
}
