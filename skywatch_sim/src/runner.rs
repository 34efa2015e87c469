//! Scenario runner - drives a map engine against the simulated fleet.
//!
//! Every scenario runs a [`MapEngine`] over a [`RecordingSurface`] on the
//! virtual clock, stepping the scheduler by hand with `begin_cycle` and
//! `complete_cycle`. After each applied cycle the rendered marker set is
//! compared with the ids the fleet says must be visible.

use crate::context::SimContext;
use crate::exporter::{rendered_positions, MarkerPosition, SimEvent, SimExport, SimFrame};
use crate::feed::{FeedResponse, FleetFeed};
use crate::fleet::{Fleet, FleetConfig};
use crate::scenarios::ScenarioId;

use rand::seq::IteratorRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use skywatch_core::{
    airports, CycleReport, EngineConfig, GeoPoint, MapEngine, ObjectId, PollTicket,
    RecordingSurface, RouteQuery, SyncError, SyncMetrics, TrackedObject, ViewMode,
};
use skywatch_env::{SkywatchContext, ViewId};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, warn};

/// RNG stream tags.
const FLEET_STREAM: u64 = 1;
const USER_STREAM: u64 = 2;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Markers rendered at the end
    pub final_marker_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Engine counters at the end of the run
    pub metrics: SyncMetrics,
}

/// Runs map engine scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Engine configuration shared by every scenario
    engine_config: EngineConfig,

    /// Maximum duration in seconds
    max_duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            engine_config: EngineConfig::default(),
            max_duration_secs: 300.0,
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Runs scenarios against the given engine configuration.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Sets the engine poll interval.
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.engine_config.scheduler.poll_interval_ms = secs.max(1) * 1000;
        self
    }

    /// Number of poll intervals in the configured duration.
    fn target_ticks(&self) -> u64 {
        let interval = self.engine_config.scheduler.poll_interval().as_secs_f64();
        ((self.max_duration_secs / interval) as u64).max(2)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_inner(scenario, None)
    }

    /// Runs a scenario and records one frame per applied cycle.
    pub fn run_with_export(&self, scenario: ScenarioId, export: &mut SimExport) -> ScenarioResult {
        let result = self.run_inner(scenario, Some(export));
        export.finalize(result.passed, result.failure_reason.clone());
        result
    }

    fn run_inner(&self, scenario: ScenarioId, export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let (fleet, outages) = match scenario {
            ScenarioId::TwoTicks | ScenarioId::RouteSearch => (FleetConfig::steady(0), Vec::new()),
            ScenarioId::StaleTeardown => (FleetConfig::steady(10), Vec::new()),
            ScenarioId::FeedOutage => (FleetConfig::default(), vec![2, 3, 4, 7]),
            ScenarioId::SlowFeed => (FleetConfig::default(), Vec::new()),
            ScenarioId::SelectionChurn => (
                FleetConfig {
                    departure_rate: 0.15,
                    arrival_rate: 2.0,
                    ..FleetConfig::default()
                },
                Vec::new(),
            ),
            ScenarioId::ModeSwitch => (FleetConfig::default(), Vec::new()),
            ScenarioId::DirtyFeed => (
                FleetConfig {
                    initial_aircraft: 40,
                    ..FleetConfig::dirty()
                },
                Vec::new(),
            ),
            ScenarioId::LongHaul => (FleetConfig::default(), Vec::new()),
        };

        let mut harness = Harness::new(self, fleet, outages, export);
        let outcome = match scenario {
            ScenarioId::TwoTicks => harness.two_ticks(),
            ScenarioId::RouteSearch => harness.route_search(),
            ScenarioId::StaleTeardown => harness.stale_teardown(),
            ScenarioId::FeedOutage => harness.feed_outage(self.target_ticks()),
            ScenarioId::SlowFeed => harness.slow_feed(self.target_ticks()),
            ScenarioId::SelectionChurn => harness.selection_churn(self.target_ticks()),
            ScenarioId::ModeSwitch => harness.mode_switch(self.target_ticks()),
            ScenarioId::DirtyFeed => harness.dirty_feed(self.target_ticks()),
            ScenarioId::LongHaul => harness.long_haul(self.target_ticks()),
        };

        let result = harness.finish(scenario, self.seed, outcome);
        if result.passed {
            info!(
                "✓ {} complete: {} ticks, {} markers, {} cycles applied",
                scenario.name(),
                result.total_ticks,
                result.final_marker_count,
                result.metrics.cycles_applied
            );
        } else {
            warn!(
                "✗ {} failed: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        result
    }
}

// ============================================================================
// HARNESS
// ============================================================================

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

fn point(lat: f64, lon: f64) -> Result<GeoPoint, String> {
    GeoPoint::new(lat, lon).map_err(|e| e.to_string())
}

/// One engine, one feed, one virtual clock.
struct Harness<'a> {
    ctx: SimContext,
    engine: MapEngine<RecordingSurface>,
    feed: FleetFeed,
    user_rng: ChaCha8Rng,
    interval: Duration,
    ticks: u64,

    /// Ids the rendered set must equal after the last applied cycle
    expected: BTreeSet<ObjectId>,

    export: Option<&'a mut SimExport>,
    events: Vec<SimEvent>,
}

impl<'a> Harness<'a> {
    fn new(
        runner: &ScenarioRunner,
        fleet_config: FleetConfig,
        outages: Vec<u64>,
        export: Option<&'a mut SimExport>,
    ) -> Self {
        let ctx = SimContext::new(runner.seed);
        let fleet = Fleet::new(fleet_config, ctx.rng_stream(FLEET_STREAM));
        let user_rng = ctx.rng_stream(USER_STREAM);

        let config = runner.engine_config.clone();
        let interval = config.scheduler.poll_interval();

        Self {
            engine: MapEngine::with_view_id(ViewId::from_seed(runner.seed), RecordingSurface::new(), config),
            feed: FleetFeed::new(fleet).with_outages(outages),
            user_rng,
            interval,
            ticks: 0,
            expected: BTreeSet::new(),
            export,
            events: Vec::new(),
            ctx,
        }
    }

    /// Advance the clock and the fleet by one poll interval.
    fn advance(&mut self) {
        self.ctx.advance_time(self.interval);
        self.feed.step(self.interval.as_secs_f64());
        self.ticks += 1;
    }

    fn enter_live(&mut self) -> Result<PollTicket, String> {
        self.events.push(SimEvent::info("enter live tracking"));
        self.engine
            .enter_live_tracking(self.ctx.now())
            .ok_or_else(|| "live tracking did not issue a first ticket".to_string())
    }

    /// Fetch and apply immediately if a cycle is due.
    fn poll_now(&mut self) -> Result<Option<CycleReport>, String> {
        match self.engine.begin_cycle(self.ctx.now()) {
            Some(ticket) => {
                let response = self.feed.poll();
                self.deliver(ticket, response)
            }
            None => Ok(None),
        }
    }

    /// Hand a fetch result to the engine and check the outcome.
    fn deliver(
        &mut self,
        ticket: PollTicket,
        response: FeedResponse,
    ) -> Result<Option<CycleReport>, String> {
        let calls_before = self.engine.surface().call_count();
        let outage = response.is_outage();

        match self.engine.complete_cycle(ticket, response.result) {
            Ok(report) => {
                self.expected = response.expected_ids;
                self.verify_rendered()?;
                self.record_frame(report.cycle);
                Ok(Some(report))
            }
            Err(SyncError::FetchFailure(reason)) => {
                ensure(outage, || format!("unexpected fetch failure: {}", reason))?;
                ensure(self.engine.surface().call_count() == calls_before, || {
                    "failed fetch touched the surface".to_string()
                })?;
                self.verify_rendered()?;
                self.events.push(SimEvent::warn(format!("feed outage on call {}", response.call)));
                Ok(None)
            }
            Err(SyncError::StaleResponse { issued, current }) => {
                ensure(self.engine.surface().call_count() == calls_before, || {
                    format!("stale result (gen {} vs {}) touched the surface", issued, current)
                })?;
                self.events.push(SimEvent::info(format!("stale result from generation {}", issued)));
                Ok(None)
            }
            Err(other) => Err(format!("unexpected cycle error: {}", other)),
        }
    }

    /// Rendered markers must equal the positioned, de-duplicated ids of the
    /// last applied snapshot, with no invalid surface operations.
    fn verify_rendered(&self) -> Result<(), String> {
        let tracked = self.engine.markers().ids();
        ensure(tracked == self.expected, || {
            format!(
                "tick {}: engine tracks {} markers, expected {}",
                self.ticks,
                tracked.len(),
                self.expected.len()
            )
        })?;

        if self.engine.mode() == ViewMode::LiveTracking {
            let drawn = self.engine.surface().marker_ids();
            ensure(drawn == self.expected, || {
                format!(
                    "tick {}: surface shows {} markers, expected {}",
                    self.ticks,
                    drawn.len(),
                    self.expected.len()
                )
            })?;
        }

        let invalid = self.engine.surface().invalid_ops();
        ensure(invalid == 0, || format!("{} surface operations hit unknown handles", invalid))?;
        ensure(self.engine.metrics().inconsistencies == 0, || {
            "engine reported a marker inconsistency".to_string()
        })
    }

    fn record_frame(&mut self, cycle: u64) {
        let events = std::mem::take(&mut self.events);
        let Some(export) = self.export.as_deref_mut() else {
            return;
        };
        let ground_truth = self.feed.with_fleet(|fleet| {
            fleet
                .aircraft()
                .iter()
                .filter_map(|a| {
                    GeoPoint::new(a.lat, a.lon)
                        .ok()
                        .map(|p| MarkerPosition::new(a.icao24.clone(), p))
                })
                .collect()
        });
        export.add_frame(SimFrame {
            time_sec: self.ctx.now().as_secs_f64(),
            cycle,
            ground_truth,
            rendered: rendered_positions(self.engine.surface()),
            selected: self.engine.selection().selected().map(|id| id.to_string()),
            events,
        });
    }

    fn finish(self, scenario: ScenarioId, seed: u64, outcome: Result<(), String>) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed,
            passed: outcome.is_ok(),
            total_ticks: self.ticks,
            final_time_secs: self.ctx.now().as_secs_f64(),
            final_marker_count: self.engine.markers().len(),
            failure_reason: outcome.err(),
            metrics: self.engine.metrics().clone(),
        }
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// SKY-001: snapshot {A} then {B}.
    fn two_ticks(&mut self) -> Result<(), String> {
        let a = TrackedObject::at("a00001", point(27.7, 85.3)?);
        let b = TrackedObject::at("b00002", point(13.7, 100.5)?);

        let first = self.enter_live()?;
        let report = self
            .engine
            .complete_cycle(first, Ok(vec![a.clone()]))
            .map_err(|e| e.to_string())?;
        ensure(report.added == vec![a.id.clone()], || format!("first tick added {:?}", report.added))?;

        self.advance();
        let second = self
            .engine
            .begin_cycle(self.ctx.now())
            .ok_or_else(|| "second cycle was not due".to_string())?;
        let report = self
            .engine
            .complete_cycle(second, Ok(vec![b.clone()]))
            .map_err(|e| e.to_string())?;

        ensure(report.added == vec![b.id.clone()], || format!("second tick added {:?}", report.added))?;
        ensure(report.removed == vec![a.id.clone()], || format!("second tick removed {:?}", report.removed))?;
        ensure(report.updated.is_empty(), || format!("second tick updated {:?}", report.updated))?;

        self.expected = BTreeSet::from([b.id]);
        self.verify_rendered()
    }

    /// SKY-002: KTM-BKK overlay, then leave for live tracking.
    fn route_search(&mut self) -> Result<(), String> {
        let origin = airports::resolve("Kathmandu");
        let destination = airports::resolve("Bangkok");
        let (Some(ktm), Some(bkk)) = (origin, destination) else {
            return Err("airport table lacks KTM or BKK".to_string());
        };

        let overlay = self
            .engine
            .show_route(RouteQuery::route("Kathmandu", "Bangkok", origin, destination));
        self.events.push(SimEvent::info("route KTM-BKK shown"));

        let view = self
            .engine
            .surface()
            .current_view()
            .ok_or_else(|| "route did not fit the view".to_string())?;
        ensure(view.contains(&ktm) && view.contains(&bkk), || {
            "fitted view misses an endpoint".to_string()
        })?;

        let label = overlay.label.ok_or_else(|| "route has no distance label".to_string())?;
        ensure((2100.0..2350.0).contains(&label.distance_km), || {
            format!("KTM-BKK distance {:.0} km out of range", label.distance_km)
        })?;
        ensure(self.engine.surface().line_count() == 1, || "route line missing".to_string())?;

        // Leaving the route clears the overlay before any aircraft are drawn
        let first = self.enter_live()?;
        ensure(self.engine.surface().line_count() == 0, || "route line survived".to_string())?;
        ensure(self.engine.surface().marker_count() == 0, || "route pins survived".to_string())?;

        let response = self.feed.poll();
        self.deliver(first, response)?;
        Ok(())
    }

    /// SKY-003: poll result delivered after teardown.
    fn stale_teardown(&mut self) -> Result<(), String> {
        let first = self.enter_live()?;
        let response = self.feed.poll();
        self.deliver(first, response)?;

        self.advance();
        let ticket = self
            .engine
            .begin_cycle(self.ctx.now())
            .ok_or_else(|| "second cycle was not due".to_string())?;
        let response = self.feed.poll();

        self.engine.teardown();
        let calls = self.engine.surface().call_count();

        let result = self.engine.complete_cycle(ticket, response.result);
        ensure(matches!(result, Err(SyncError::StaleResponse { .. })), || {
            format!("post-teardown result was not stale: {:?}", result.as_ref().map(|r| r.cycle))
        })?;
        ensure(self.engine.surface().call_count() == calls, || {
            "post-teardown result touched the surface".to_string()
        })?;

        self.advance();
        ensure(self.engine.begin_cycle(self.ctx.now()).is_none(), || {
            "torn-down engine issued a cycle".to_string()
        })?;
        ensure(self.engine.metrics().stale_dropped == 1, || "stale drop not counted".to_string())
    }

    /// SKY-004: scripted outages.
    fn feed_outage(&mut self, target_ticks: u64) -> Result<(), String> {
        let first = self.enter_live()?;
        let response = self.feed.poll();
        self.deliver(first, response)?;

        let mut applied_after_outage = 0;
        for _ in 0..target_ticks {
            self.advance();
            if self.poll_now()?.is_some() && self.engine.metrics().fetch_failures > 0 {
                applied_after_outage += 1;
            }
        }

        let failures = self.engine.metrics().fetch_failures;
        let scripted = [2u64, 3, 4, 7].iter().filter(|&&c| c < self.feed.calls()).count() as u64;
        ensure(failures == scripted, || {
            format!("{} fetch failures recorded, {} scripted", failures, scripted)
        })?;
        ensure(applied_after_outage > 0 || self.feed.calls() <= 8, || {
            "polling did not resume after the outage".to_string()
        })
    }

    /// SKY-005: every fetch takes three poll intervals.
    fn slow_feed(&mut self, target_ticks: u64) -> Result<(), String> {
        const LATENCY_TICKS: u64 = 3;

        let first = self.enter_live()?;
        let mut pending = Some((first, self.feed.poll(), self.ticks + LATENCY_TICKS));

        for _ in 0..target_ticks {
            self.advance();

            if let Some((ticket, response, due)) = pending.take() {
                if self.ticks >= due {
                    self.deliver(ticket, response)?;
                } else {
                    pending = Some((ticket, response, due));
                }
            }

            match self.engine.begin_cycle(self.ctx.now()) {
                Some(_) if pending.is_some() => {
                    return Err(format!("tick {}: second fetch issued while one in flight", self.ticks));
                }
                Some(ticket) => pending = Some((ticket, self.feed.poll(), self.ticks + LATENCY_TICKS)),
                None => {
                    ensure(pending.is_some(), || {
                        format!("tick {}: idle scheduler issued no cycle", self.ticks)
                    })?;
                }
            }
        }

        let started = self.engine.metrics().cycles_started;
        ensure(started <= target_ticks / LATENCY_TICKS + 2, || {
            format!("{} cycles started in {} ticks", started, target_ticks)
        })
    }

    /// SKY-006: random selections while aircraft depart.
    fn selection_churn(&mut self, target_ticks: u64) -> Result<(), String> {
        let first = self.enter_live()?;
        let response = self.feed.poll();
        self.deliver(first, response)?;

        let mut cleared = 0;
        for _ in 0..target_ticks {
            self.advance();
            let selected_before = self.engine.selection().selected().cloned();

            let Some(report) = self.poll_now()? else {
                continue;
            };

            match &selected_before {
                Some(id) if !self.expected.contains(id) => {
                    ensure(report.selection_cleared.as_ref() == Some(id), || {
                        format!("selection {} outlived its aircraft", id)
                    })?;
                    ensure(self.engine.info_panel().is_none(), || "info panel outlived selection".to_string())?;
                    cleared += 1;
                }
                Some(id) => {
                    ensure(self.engine.selection().is_selected(id), || format!("selection {} dropped", id))?;
                    ensure(report.fitted.is_none(), || "view refitted under an active selection".to_string())?;
                }
                None => {}
            }

            if self.user_rng.gen_bool(0.5) {
                if let Some(id) = self.expected.iter().choose(&mut self.user_rng).cloned() {
                    let panel = self
                        .engine
                        .select(&id)
                        .ok_or_else(|| format!("rendered aircraft {} not selectable", id))?;
                    ensure(panel.id == id, || "info panel for wrong aircraft".to_string())?;
                }
            } else if self.user_rng.gen_bool(0.2) {
                self.engine.clear_selection();
            }
        }

        let counted = self.engine.metrics().selections_cleared;
        ensure(counted == cleared, || format!("{} auto-clears counted, {} observed", counted, cleared))
    }

    /// SKY-007: switch between live tracking and routes with fetches in flight.
    fn mode_switch(&mut self, target_ticks: u64) -> Result<(), String> {
        let table = airports::all();

        for round in 0..target_ticks {
            let ticket = self.enter_live()?;
            let response = self.feed.poll();

            let from = &table[self.user_rng.gen_range(0..table.len())];
            let to = &table[self.user_rng.gen_range(0..table.len())];
            let query = RouteQuery::route(from.city, to.city, from.position(), to.position());

            if round % 2 == 0 {
                self.deliver(ticket, response)?;
                self.engine.show_route(query);
            } else {
                // Fetch lands after the user already switched to a route
                self.engine.show_route(query);
                self.deliver(ticket, response)?;
            }

            ensure(self.engine.markers().is_empty(), || "aircraft markers left in route mode".to_string())?;
            ensure(self.engine.selection().selected().is_none(), || "selection left in route mode".to_string())?;

            // A search pending across a mode change is dropped
            let search = self.engine.begin_search();
            self.advance();
            self.engine.enter_idle();
            ensure(self.engine.check_search(search).is_err(), || "search survived a mode change".to_string())?;
            ensure(self.engine.surface().marker_count() == 0, || "idle map still has markers".to_string())?;
        }

        let stale = self.engine.metrics().stale_dropped;
        ensure(stale == target_ticks / 2, || format!("{} stale drops, expected {}", stale, target_ticks / 2))?;
        ensure(self.engine.surface().invalid_ops() == 0, || "invalid surface ops".to_string())
    }

    /// SKY-008: every defect turned on.
    fn dirty_feed(&mut self, target_ticks: u64) -> Result<(), String> {
        self.run_live(target_ticks)?;

        let metrics = self.engine.metrics();
        ensure(metrics.duplicate_ids > 0, || "no duplicate rows seen".to_string())?;
        ensure(metrics.invalid_skipped > 0, || "no position-less rows seen".to_string())
    }

    /// SKY-009: steady churn for the whole duration.
    fn long_haul(&mut self, target_ticks: u64) -> Result<(), String> {
        self.run_live(target_ticks)?;

        let applied = self.engine.metrics().cycles_applied;
        ensure(applied == target_ticks + 1, || {
            format!("{} cycles applied over {} ticks", applied, target_ticks)
        })
    }

    fn run_live(&mut self, target_ticks: u64) -> Result<(), String> {
        let first = self.enter_live()?;
        let response = self.feed.poll();
        self.deliver(first, response)?;

        for _ in 0..target_ticks {
            self.advance();
            if self.poll_now()?.is_none() {
                return Err(format!("tick {}: no cycle was due", self.ticks));
            }
        }
        Ok(())
    }
}
