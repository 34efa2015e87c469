//! A headless [`RenderSurface`] that records every call.
//!
//! Used by the simulator and by tests to assert exactly what the engine
//! asked the map to do, including the absence of calls.

use crate::geo::{Bounds, GeoPoint};
use crate::model::ObjectId;
use crate::surface::{IconSpec, LineHandle, LineStyle, MarkerHandle, RenderSurface, ViewPadding};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// One recorded surface call.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    AddMarker { handle: MarkerHandle, id: ObjectId, position: GeoPoint, icon: IconSpec },
    UpdateMarker { handle: MarkerHandle, position: GeoPoint, icon: IconSpec },
    RemoveMarker { handle: MarkerHandle },
    DrawLine { handle: LineHandle, points: Vec<GeoPoint>, style: LineStyle },
    RemoveLine { handle: LineHandle },
    FitView { bounds: Bounds, padding: ViewPadding },
    CenterOn { position: GeoPoint, min_zoom: u8 },
}

/// A marker as currently drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnMarker {
    pub id: ObjectId,
    pub position: GeoPoint,
    pub icon: IconSpec,
}

/// In-memory map surface.
#[derive(Debug)]
pub struct RecordingSurface {
    calls: Vec<SurfaceCall>,
    markers: HashMap<MarkerHandle, DrawnMarker>,
    lines: HashMap<LineHandle, Vec<GeoPoint>>,
    next_handle: u64,
    zoom: u8,
    view: Option<Bounds>,
    center: Option<GeoPoint>,

    /// Updates/removals that referenced an unknown handle
    invalid_ops: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            markers: HashMap::new(),
            lines: HashMap::new(),
            next_handle: 1,
            zoom: 2,
            view: None,
            center: None,
            invalid_ops: 0,
        }
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Ids of all drawn markers.
    pub fn marker_ids(&self) -> BTreeSet<ObjectId> {
        self.markers.values().map(|m| m.id.clone()).collect()
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&DrawnMarker> {
        self.markers.get(&handle)
    }

    /// Find a drawn marker by object id.
    pub fn marker_by_id(&self, id: &ObjectId) -> Option<&DrawnMarker> {
        self.markers.values().find(|m| &m.id == id)
    }

    pub fn lines(&self) -> impl Iterator<Item = &Vec<GeoPoint>> {
        self.lines.values()
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn current_view(&self) -> Option<Bounds> {
        self.view
    }

    pub fn current_center(&self) -> Option<GeoPoint> {
        self.center
    }

    pub fn invalid_ops(&self) -> usize {
        self.invalid_ops
    }

    fn next(&mut self) -> u64 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    /// Rough web-map zoom level that shows `bounds`.
    fn zoom_for(bounds: &Bounds) -> u8 {
        let span = bounds.lon_span().max(bounds.lat_span()).max(1e-6);
        (360.0 / span).log2().floor().clamp(1.0, 18.0) as u8
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for RecordingSurface {
    fn add_marker(&mut self, id: &ObjectId, position: GeoPoint, icon: &IconSpec) -> MarkerHandle {
        let handle = MarkerHandle(self.next());
        self.markers.insert(
            handle,
            DrawnMarker { id: id.clone(), position, icon: icon.clone() },
        );
        self.calls.push(SurfaceCall::AddMarker {
            handle,
            id: id.clone(),
            position,
            icon: icon.clone(),
        });
        handle
    }

    fn update_marker(&mut self, handle: MarkerHandle, position: GeoPoint, icon: &IconSpec) {
        match self.markers.get_mut(&handle) {
            Some(marker) => {
                marker.position = position;
                marker.icon = icon.clone();
            }
            None => {
                warn!(handle = handle.0, "update of unknown marker");
                self.invalid_ops += 1;
            }
        }
        self.calls.push(SurfaceCall::UpdateMarker { handle, position, icon: icon.clone() });
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if self.markers.remove(&handle).is_none() {
            warn!(handle = handle.0, "removal of unknown marker");
            self.invalid_ops += 1;
        }
        self.calls.push(SurfaceCall::RemoveMarker { handle });
    }

    fn draw_line(&mut self, points: &[GeoPoint], style: &LineStyle) -> LineHandle {
        let handle = LineHandle(self.next());
        self.lines.insert(handle, points.to_vec());
        self.calls.push(SurfaceCall::DrawLine {
            handle,
            points: points.to_vec(),
            style: style.clone(),
        });
        handle
    }

    fn remove_line(&mut self, handle: LineHandle) {
        if self.lines.remove(&handle).is_none() {
            warn!(handle = handle.0, "removal of unknown line");
            self.invalid_ops += 1;
        }
        self.calls.push(SurfaceCall::RemoveLine { handle });
    }

    fn fit_view(&mut self, bounds: Bounds, padding: ViewPadding) {
        self.view = Some(bounds);
        self.center = Some(bounds.center());
        self.zoom = Self::zoom_for(&bounds);
        self.calls.push(SurfaceCall::FitView { bounds, padding });
    }

    fn center_on(&mut self, position: GeoPoint, min_zoom: u8) {
        self.center = Some(position);
        self.zoom = self.zoom.max(min_zoom);
        self.calls.push(SurfaceCall::CenterOn { position, min_zoom });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn icon() -> IconSpec {
        IconSpec::Aircraft { heading_deg: None, on_ground: false, highlighted: false }
    }

    #[test]
    fn test_marker_lifecycle() {
        let mut s = RecordingSurface::new();
        let h = s.add_marker(&ObjectId::new("a"), pt(1.0, 1.0), &icon());
        assert_eq!(s.marker_count(), 1);

        s.update_marker(h, pt(2.0, 2.0), &icon());
        assert_eq!(s.marker(h).unwrap().position, pt(2.0, 2.0));

        s.remove_marker(h);
        assert_eq!(s.marker_count(), 0);
        assert_eq!(s.call_count(), 3);
        assert_eq!(s.invalid_ops(), 0);
    }

    #[test]
    fn test_unknown_handle_is_counted() {
        let mut s = RecordingSurface::new();
        s.remove_marker(MarkerHandle(99));
        s.remove_line(LineHandle(99));
        assert_eq!(s.invalid_ops(), 2);
    }

    #[test]
    fn test_center_on_never_zooms_out() {
        let mut s = RecordingSurface::new();
        s.fit_view(Bounds::around(pt(0.0, 0.0), 0.05), ViewPadding(0));
        let fitted = s.zoom();
        assert!(fitted > 8);

        s.center_on(pt(0.0, 0.0), 6);
        assert_eq!(s.zoom(), fitted);

        s.fit_view(Bounds::WORLD, ViewPadding(0));
        s.center_on(pt(0.0, 0.0), 8);
        assert_eq!(s.zoom(), 8);
    }

    #[test]
    fn test_zero_length_line() {
        let mut s = RecordingSurface::new();
        let p = pt(5.0, 5.0);
        s.draw_line(&[p, p], &LineStyle::route());
        assert_eq!(s.line_count(), 1);
    }
}
