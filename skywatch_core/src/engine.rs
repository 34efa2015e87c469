//! The map engine - one surface, one state, explicit lifecycle.
//!
//! A [`MapEngine`] owns exactly one [`RenderSurface`] together with the
//! rendered marker set, selection, view mode and poll scheduler. There is no
//! global instance: callers `create` an engine per map and `teardown` it when
//! the map goes away.
//!
//! The engine is synchronous. The async poll loop in `runtime` asks it for a
//! [`PollTicket`], awaits the feed outside any lock, and hands the result
//! back through [`MapEngine::complete_cycle`]. Results whose ticket no longer
//! matches the scheduler generation are dropped without touching the surface.
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = MapEngine::create(surface, EngineConfig::default());
//! let ticket = engine.enter_live_tracking(ctx.now()).unwrap();
//! let snapshot = feed.fetch_snapshot().await;
//! engine.complete_cycle(ticket, snapshot)?;
//! ```

use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::geo::Bounds;
use crate::metrics::SyncMetrics;
use crate::model::{ObjectId, RouteQuery, TrackedObject};
use crate::reconciler::{reconcile, MarkerDiff, ReconcileError, RenderedMarkerSet};
use crate::scheduler::{PollScheduler, PollSignal, PollTicket, TicketStatus};
use crate::selection::{InfoPanel, SelectOutcome, SelectionState};
use crate::surface::{EndpointRole, IconSpec, LineHandle, LineStyle, MarkerHandle, RenderSurface};
use crate::view_composer::{RouteOverlay, ViewComposer, ViewMode};
use skywatch_env::{EnvError, ViewId};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// What one applied poll cycle changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub added: Vec<ObjectId>,
    pub updated: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
    pub skipped_invalid: usize,
    pub duplicates: usize,

    /// Selection dropped because its object left the feed
    pub selection_cleared: Option<ObjectId>,

    /// Bounds the view was fitted to, if refitted
    pub fitted: Option<Bounds>,
}

/// Permission to apply one search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket {
    generation: u64,
}

/// Surface handles of the current route overlay.
#[derive(Debug, Default)]
struct RouteHandles {
    markers: Vec<MarkerHandle>,
    line: Option<LineHandle>,
}

/// Surface-level ids for route overlay markers. They never collide with
/// live ids because live ids are hex transponder codes.
const ROUTE_PIN_ORIGIN: &str = "route:origin";
const ROUTE_PIN_DESTINATION: &str = "route:destination";
const ROUTE_PIN_BOTH: &str = "route:endpoints";
const ROUTE_LABEL: &str = "route:label";

/// Owns one map surface and all state rendered onto it.
pub struct MapEngine<S: RenderSurface> {
    view_id: ViewId,
    surface: S,
    config: EngineConfig,
    composer: ViewComposer,
    mode: ViewMode,
    scheduler: PollScheduler,

    /// Wakes the poll task of the running generation when live mode ends
    poll_signal: Option<PollSignal>,

    markers: RenderedMarkerSet,
    live_objects: BTreeMap<ObjectId, TrackedObject>,
    selection: SelectionState,

    route: Option<RouteQuery>,
    route_handles: RouteHandles,
    search_generation: u64,

    torn_down: bool,
    metrics: SyncMetrics,
}

impl<S: RenderSurface> MapEngine<S> {
    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create an engine that exclusively owns `surface`.
    pub fn create(surface: S, config: EngineConfig) -> Self {
        Self::with_view_id(ViewId::new(), surface, config)
    }

    /// Create an engine with a caller-chosen id (deterministic simulations).
    pub fn with_view_id(view_id: ViewId, surface: S, config: EngineConfig) -> Self {
        info!(view = %view_id, "Map engine created");
        Self {
            view_id,
            surface,
            composer: ViewComposer::new(config.composer.clone()),
            scheduler: PollScheduler::new(&config.scheduler),
            poll_signal: None,
            config,
            mode: ViewMode::Idle,
            markers: RenderedMarkerSet::new(),
            live_objects: BTreeMap::new(),
            selection: SelectionState::new(),
            route: None,
            route_handles: RouteHandles::default(),
            search_generation: 0,
            torn_down: false,
            metrics: SyncMetrics::default(),
        }
    }

    /// Stop polling and remove everything this engine drew.
    ///
    /// Any result arriving afterwards is stale and causes no surface calls.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.leave_mode();
        self.mode = ViewMode::Idle;
        self.torn_down = true;
        info!(view = %self.view_id, "Map engine torn down");
    }

    /// Tear down and hand the surface back.
    pub fn into_surface(mut self) -> S {
        self.teardown();
        self.surface
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn markers(&self) -> &RenderedMarkerSet {
        &self.markers
    }

    pub fn live_objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.live_objects.values()
    }

    pub fn live_object(&self, id: &ObjectId) -> Option<&TrackedObject> {
        self.live_objects.get(id)
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn route(&self) -> Option<&RouteQuery> {
        self.route.as_ref()
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct surface access for embedders (e.g. resizing the widget).
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Generation of the running live poll, `None` when not polling.
    pub fn poll_generation(&self) -> Option<u64> {
        (!self.torn_down && self.mode == ViewMode::LiveTracking && self.scheduler.is_running())
            .then(|| self.scheduler.generation())
    }

    /// Time until the next live cycle is due, `None` when not polling.
    pub fn time_until_next_cycle(&self, now: Duration) -> Option<Duration> {
        self.poll_generation()?;
        self.scheduler.time_until_due(now)
    }

    // ========================================================================
    // VIEW MODES
    // ========================================================================

    /// Switch to live tracking. Returns the ticket for the immediate first
    /// cycle, or `None` if already live or torn down.
    pub fn enter_live_tracking(&mut self, now: Duration) -> Option<PollTicket> {
        if self.torn_down || self.mode == ViewMode::LiveTracking {
            return None;
        }
        self.leave_mode();
        self.mode = ViewMode::LiveTracking;
        let ticket = self.scheduler.start(now);
        if ticket.is_some() {
            self.metrics.cycles_started += 1;
        }
        info!(view = %self.view_id, "Entered live tracking");
        ticket
    }

    /// Switch to route search and draw `query`.
    pub fn show_route(&mut self, query: RouteQuery) -> RouteOverlay {
        if self.torn_down {
            return RouteOverlay::default();
        }
        self.leave_mode();
        self.mode = ViewMode::RouteSearch;

        let overlay = self.composer.compose_route_overlay(&query);
        for label in &overlay.unresolved {
            trace!(view = %self.view_id, endpoint = %label, "Route endpoint without coordinates");
        }
        self.draw_overlay(&overlay);

        if let Some(bounds) = self.composer.compute_bounds(self.mode, &[], Some(&query)) {
            self.surface.fit_view(bounds, self.config.view_padding());
        }
        info!(view = %self.view_id, route = %query.title(), pins = overlay.pins.len(), "Showing route");
        self.route = Some(query);
        overlay
    }

    /// Clear whatever mode is active.
    pub fn enter_idle(&mut self) {
        if self.torn_down || self.mode == ViewMode::Idle {
            return;
        }
        self.leave_mode();
        self.mode = ViewMode::Idle;
        debug!(view = %self.view_id, "Entered idle");
    }

    /// Remove the active mode's state. Every mode change supersedes pending
    /// searches and in-flight polls.
    fn leave_mode(&mut self) {
        self.search_generation += 1;
        match self.mode {
            ViewMode::Idle => {}
            ViewMode::LiveTracking => {
                self.scheduler.stop();
                if let Some(signal) = self.poll_signal.take() {
                    signal.cancel();
                }
                if let Some(previous) = self.selection.clear() {
                    debug!(view = %self.view_id, id = %previous, "Selection cleared on mode change");
                }
                for (_, handle) in self.markers.drain_sorted() {
                    self.surface.remove_marker(handle);
                }
                self.live_objects.clear();
            }
            ViewMode::RouteSearch => {
                self.clear_overlay();
                self.route = None;
            }
        }
    }

    fn draw_overlay(&mut self, overlay: &RouteOverlay) {
        for pin in &overlay.pins {
            let id = match pin.role {
                EndpointRole::Origin => ROUTE_PIN_ORIGIN,
                EndpointRole::Destination => ROUTE_PIN_DESTINATION,
                EndpointRole::Both => ROUTE_PIN_BOTH,
            };
            let icon = IconSpec::RouteEndpoint { role: pin.role, label: pin.label.clone() };
            let handle = self.surface.add_marker(&ObjectId::new(id), pin.position, &icon);
            self.route_handles.markers.push(handle);
        }
        if let Some(line) = &overlay.line {
            self.route_handles.line = Some(self.surface.draw_line(line, &LineStyle::route()));
        }
        if let Some(label) = &overlay.label {
            let icon = IconSpec::DistanceLabel { text: label.text.clone() };
            let handle = self.surface.add_marker(&ObjectId::new(ROUTE_LABEL), label.position, &icon);
            self.route_handles.markers.push(handle);
        }
    }

    fn clear_overlay(&mut self) {
        for handle in self.route_handles.markers.drain(..) {
            self.surface.remove_marker(handle);
        }
        if let Some(line) = self.route_handles.line.take() {
            self.surface.remove_line(line);
        }
    }

    // ========================================================================
    // LIVE CYCLES
    // ========================================================================

    /// Ticket for the next live cycle if one is due now.
    pub fn begin_cycle(&mut self, now: Duration) -> Option<PollTicket> {
        self.poll_generation()?;
        let ticket = self.scheduler.poll_due(now)?;
        self.metrics.cycles_started += 1;
        trace!(view = %self.view_id, cycle = ticket.cycle, "Cycle started");
        Some(ticket)
    }

    /// Apply the outcome of a fetch started with `ticket`.
    ///
    /// Stale tickets are dropped before anything else, so a result arriving
    /// after teardown or a mode switch makes zero surface calls.
    pub fn complete_cycle(
        &mut self,
        ticket: PollTicket,
        fetched: Result<Vec<TrackedObject>, EnvError>,
    ) -> Result<CycleReport, SyncError> {
        if self.torn_down || self.scheduler.complete(ticket) == TicketStatus::Stale {
            self.metrics.stale_dropped += 1;
            debug!(
                view = %self.view_id,
                issued = ticket.generation,
                current = self.scheduler.generation(),
                "Dropping stale poll result"
            );
            return Err(SyncError::StaleResponse {
                issued: ticket.generation,
                current: self.scheduler.generation(),
            });
        }

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.fetch_failures += 1;
                warn!(view = %self.view_id, cycle = ticket.cycle, error = %e, "Snapshot fetch failed, keeping previous state");
                return Err(e.into());
            }
        };

        let diff = reconcile(&self.markers, snapshot);
        Ok(self.apply_diff(ticket.cycle, diff))
    }

    /// Release a ticket whose fetch was abandoned (poll task cancelled).
    pub fn abandon_cycle(&mut self, ticket: PollTicket) {
        match self.scheduler.complete(ticket) {
            TicketStatus::Current => {
                debug!(view = %self.view_id, cycle = ticket.cycle, "Cycle abandoned");
            }
            TicketStatus::Stale => {
                self.metrics.stale_dropped += 1;
                debug!(
                    view = %self.view_id,
                    issued = ticket.generation,
                    current = self.scheduler.generation(),
                    "Dropping stale poll result"
                );
            }
        }
    }

    /// Hand the engine the cancel side of the poll task driving the current
    /// live generation. Leaving live mode fires it.
    pub(crate) fn attach_poll_signal(&mut self, signal: PollSignal) {
        if let Some(previous) = self.poll_signal.replace(signal) {
            previous.cancel();
        }
    }

    /// The poll task for `generation` went away (handle cancelled or
    /// dropped): leave live tracking so it can be started again.
    ///
    /// Returns `false` when the engine already left that generation.
    pub fn stop_polling(&mut self, generation: u64) -> bool {
        if self.poll_generation() != Some(generation) {
            return false;
        }
        info!(view = %self.view_id, generation, "Live polling cancelled");
        self.enter_idle();
        true
    }

    fn apply_diff(&mut self, cycle: u64, diff: MarkerDiff) -> CycleReport {
        self.metrics.record_diff(&diff);

        let selection_cleared = self.selection.on_reconciled(&diff);
        if let Some(id) = &selection_cleared {
            self.metrics.selections_cleared += 1;
            debug!(view = %self.view_id, id = %id, "Selected object left the feed");
        }

        for removal in &diff.to_remove {
            self.surface.remove_marker(removal.handle);
            self.markers.remove(&removal.id);
            self.live_objects.remove(&removal.id);
        }

        for update in &diff.to_update {
            let object = &update.object;
            if let Some(position) = object.position {
                let icon = self.aircraft_icon(object);
                self.surface.update_marker(update.handle, position, &icon);
            }
            self.live_objects.insert(object.id.clone(), object.clone());
        }

        for object in &diff.to_add {
            if let Some(position) = object.position {
                let icon = self.aircraft_icon(object);
                let handle = self.surface.add_marker(&object.id, position, &icon);
                self.markers.insert(object.id.clone(), handle);
            }
            self.live_objects.insert(object.id.clone(), object.clone());
        }

        if let Err(e) = self.markers.check_consistency(&diff.renderable_ids()) {
            self.metrics.inconsistencies += 1;
            error!(view = %self.view_id, error = %e, "Rendered marker set drifted, repairing");
            self.repair(e);
        }

        let fitted = self.refit();

        let report = CycleReport {
            cycle,
            added: diff.added_ids(),
            updated: diff.updated_ids(),
            removed: diff.removed_ids(),
            skipped_invalid: diff.skipped_invalid,
            duplicates: diff.duplicates,
            selection_cleared,
            fitted,
        };
        debug!(
            view = %self.view_id,
            cycle,
            added = report.added.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            skipped = report.skipped_invalid,
            "Cycle applied"
        );
        report
    }

    /// Bring the rendered set back in line with `live_objects`.
    fn repair(&mut self, error: ReconcileError) {
        let ReconcileError::Inconsistent { orphaned, missing } = error;
        for id in orphaned {
            if let Some(handle) = self.markers.remove(&id) {
                self.surface.remove_marker(handle);
            }
            self.live_objects.remove(&id);
        }
        for id in missing {
            let Some(object) = self.live_objects.get(&id) else {
                continue;
            };
            if let Some(position) = object.position {
                let icon = self.aircraft_icon(object);
                let handle = self.surface.add_marker(&id, position, &icon);
                self.markers.insert(id, handle);
            }
        }
    }

    /// Fit the view to the live objects unless a selection holds focus.
    fn refit(&mut self) -> Option<Bounds> {
        if self.config.freeze_view || self.selection.selected().is_some() {
            return None;
        }
        let bounds = self.composer.live_bounds(self.live_objects.values());
        self.surface.fit_view(bounds, self.config.view_padding());
        Some(bounds)
    }

    fn aircraft_icon(&self, object: &TrackedObject) -> IconSpec {
        IconSpec::Aircraft {
            heading_deg: object.telemetry.heading_deg,
            on_ground: object.telemetry.on_ground.unwrap_or(false),
            highlighted: self.selection.is_selected(&object.id),
        }
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    /// Select a rendered aircraft, highlight it and centre on it.
    ///
    /// Unknown ids are ignored and return `None`.
    pub fn select(&mut self, id: &ObjectId) -> Option<InfoPanel> {
        if self.torn_down {
            return None;
        }
        match self.selection.select(id, &self.markers) {
            SelectOutcome::Ignored => {
                trace!(view = %self.view_id, id = %id, "Ignoring selection of unrendered id");
                return None;
            }
            SelectOutcome::Unchanged => {}
            SelectOutcome::Changed { previous } => {
                if let Some(previous) = previous {
                    self.restyle(&previous);
                }
                self.restyle(id);
                debug!(view = %self.view_id, id = %id, "Selected");
            }
        }

        let object = self.live_objects.get(id)?;
        if let Some(position) = object.position {
            self.surface.center_on(position, self.config.selection.focus_zoom);
        }
        Some(InfoPanel::from_object(object))
    }

    /// Clear the selection and restore the normal icon.
    pub fn clear_selection(&mut self) -> Option<ObjectId> {
        let previous = self.selection.clear()?;
        if !self.torn_down {
            self.restyle(&previous);
        }
        Some(previous)
    }

    /// Info panel of the selected object.
    pub fn info_panel(&self) -> Option<InfoPanel> {
        let id = self.selection.selected()?;
        self.live_objects.get(id).map(InfoPanel::from_object)
    }

    fn restyle(&mut self, id: &ObjectId) {
        let (Some(handle), Some(object)) = (self.markers.get(id), self.live_objects.get(id)) else {
            return;
        };
        if let Some(position) = object.position {
            let icon = self.aircraft_icon(object);
            self.surface.update_marker(handle, position, &icon);
        }
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Start a search. Any earlier search ticket becomes stale.
    pub fn begin_search(&mut self) -> SearchTicket {
        self.search_generation += 1;
        SearchTicket { generation: self.search_generation }
    }

    /// Show a search result unless the search was superseded meanwhile.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        query: RouteQuery,
    ) -> Result<RouteOverlay, SyncError> {
        self.check_search(ticket)?;
        Ok(self.show_route(query))
    }

    /// `StaleResponse` if a newer search, a mode change or teardown
    /// happened since `ticket` was issued.
    pub fn check_search(&self, ticket: SearchTicket) -> Result<(), SyncError> {
        if self.torn_down || ticket.generation != self.search_generation {
            debug!(
                view = %self.view_id,
                issued = ticket.generation,
                current = self.search_generation,
                "Dropping stale search result"
            );
            return Err(SyncError::StaleResponse {
                issued: ticket.generation,
                current: self.search_generation,
            });
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
