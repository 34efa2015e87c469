//! Live runtime - binds a [`MapEngine`] to a feed and an environment context.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    live-poll task                         │
//! │                                                          │
//! │   engine.lock() ─► begin_cycle(now) ─► PollTicket        │
//! │                                            │              │
//! │   feed.fetch_snapshot().await   (no lock held)            │
//! │                                            │              │
//! │   engine.lock() ─► complete_cycle(ticket, result)        │
//! │                                            │              │
//! │   select! { ctx.sleep(until due), handle cancelled }     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The task exits when its [`PollHandle`] is cancelled or dropped, or when
//! the engine leaves the live generation it was started for. The engine
//! holds the task's cancel signal, so a mode change or teardown also wakes
//! a task parked in its sleep. A cancelled handle puts the engine back in
//! idle mode so live tracking can be started again.

use crate::airports;
use crate::engine::MapEngine;
use crate::error::SyncError;
use crate::feed::{FallbackLookup, FlightLookup, SightingSource, SnapshotFeed};
use crate::model::{FlightLookupOutcome, FlightRecord, FlightSighting, RouteInfo, RouteQuery};
use crate::scheduler::{PollHandle, PollSignal, PollTicket};
use crate::surface::RenderSurface;
use crate::view_composer::RouteOverlay;
use chrono::NaiveDate;
use skywatch_env::SkywatchContext;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// An engine shared between the UI side and its poll task.
pub type SharedEngine<S> = Arc<Mutex<MapEngine<S>>>;

pub fn share<S: RenderSurface>(engine: MapEngine<S>) -> SharedEngine<S> {
    Arc::new(Mutex::new(engine))
}

// ============================================================================
// LIVE POLLING
// ============================================================================

/// Enter live tracking and start polling.
///
/// Returns `None` if the engine is already live or torn down.
pub async fn start_live_tracking<Ctx, F, S>(
    ctx: Arc<Ctx>,
    engine: SharedEngine<S>,
    feed: Arc<F>,
) -> Option<PollHandle>
where
    Ctx: SkywatchContext,
    F: SnapshotFeed,
    S: RenderSurface,
{
    let mut guard = engine.lock().await;
    let first = guard.enter_live_tracking(ctx.now())?;
    let handle = spawn_live_polling(ctx, engine.clone(), feed, &mut guard, first);
    Some(handle)
}

/// Leave live tracking and stop the poll task.
pub async fn stop_live_tracking<S: RenderSurface>(engine: &SharedEngine<S>, handle: PollHandle) {
    handle.cancel();
    engine.lock().await.enter_idle();
}

/// Spawn the poll task for a live generation whose first ticket is `first`.
///
/// `locked` is the guard of `engine`, held by the caller since it entered
/// live tracking; the engine gets the task's cancel signal before the lock
/// is released.
pub fn spawn_live_polling<Ctx, F, S>(
    ctx: Arc<Ctx>,
    engine: SharedEngine<S>,
    feed: Arc<F>,
    locked: &mut MapEngine<S>,
    first: PollTicket,
) -> PollHandle
where
    Ctx: SkywatchContext,
    F: SnapshotFeed,
    S: RenderSurface,
{
    let (handle, signal) = PollHandle::new();
    locked.attach_poll_signal(signal.clone());
    let task_ctx = ctx.clone();
    ctx.spawn("live-poll", poll_loop(task_ctx, engine, feed, signal, first));
    handle
}

async fn poll_loop<Ctx, F, S>(
    ctx: Arc<Ctx>,
    engine: SharedEngine<S>,
    feed: Arc<F>,
    signal: PollSignal,
    first: PollTicket,
) where
    Ctx: SkywatchContext,
    F: SnapshotFeed,
    S: RenderSurface,
{
    let generation = first.generation;
    let mut next = Some(first);
    debug!(generation, "Live poll loop started");

    loop {
        if let Some(ticket) = next.take() {
            let fetched = feed.fetch_snapshot().await;

            let mut guard = engine.lock().await;
            if signal.is_cancelled() {
                guard.abandon_cycle(ticket);
                guard.stop_polling(generation);
                break;
            }
            // Failures and stale drops are logged by the engine
            if let Ok(report) = guard.complete_cycle(ticket, fetched) {
                trace!(generation, cycle = report.cycle, "Poll cycle applied");
            }
        }

        let wait = {
            let mut guard = engine.lock().await;
            if signal.is_cancelled() {
                guard.stop_polling(generation);
                break;
            }
            if guard.poll_generation() != Some(generation) {
                break;
            }
            next = guard.begin_cycle(ctx.now());
            if next.is_some() {
                continue;
            }
            guard
                .time_until_next_cycle(ctx.now())
                .filter(|d| !d.is_zero())
                .unwrap_or_else(|| guard.scheduler().interval())
        };

        tokio::select! {
            _ = ctx.sleep(wait) => {}
            _ = signal.cancelled() => {
                engine.lock().await.stop_polling(generation);
                break;
            }
        }
    }

    debug!(generation, "Live poll loop stopped");
}

// ============================================================================
// SEARCH
// ============================================================================

/// A user search submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchRequest {
    FlightNumber(String),

    /// Endpoints as IATA codes or city names.
    Route {
        origin: String,
        destination: String,
        date: Option<NaiveDate>,
    },
}

/// Lookup data accompanying a shown search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchDetails {
    Flight(FlightRecord),

    /// Primary service failed; only a live-feed sighting is known
    Sighting(FlightSighting),

    /// `None` when the schedule service has no flights for the route
    Route(Option<RouteInfo>),
}

/// A search that made it onto the map.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: RouteQuery,
    pub overlay: RouteOverlay,
    pub details: SearchDetails,
}

/// Run a search end to end and show it on the engine.
///
/// A search superseded while its lookup was pending (newer search, mode
/// change, teardown) returns `StaleResponse` and leaves the map untouched,
/// even if its lookup failed.
pub async fn run_search<S, P, D>(
    engine: &SharedEngine<S>,
    lookup: &FallbackLookup<P, D>,
    request: SearchRequest,
) -> Result<SearchOutcome, SyncError>
where
    S: RenderSurface,
    P: FlightLookup,
    D: SightingSource,
{
    let ticket = engine.lock().await.begin_search();
    let resolved = resolve_request(lookup, request).await;

    let mut guard = engine.lock().await;
    guard.check_search(ticket)?;
    let (query, details) = resolved?;
    let overlay = guard.complete_search(ticket, query.clone())?;

    info!(view = %guard.view_id(), search = %query.title(), "Search shown");
    Ok(SearchOutcome { query, overlay, details })
}

async fn resolve_request<P, D>(
    lookup: &FallbackLookup<P, D>,
    request: SearchRequest,
) -> Result<(RouteQuery, SearchDetails), SyncError>
where
    P: FlightLookup,
    D: SightingSource,
{
    match request {
        SearchRequest::FlightNumber(code) => {
            let code = code.trim().to_uppercase();
            let details = match lookup.lookup_flight(&code).await? {
                FlightLookupOutcome::Found(record) => SearchDetails::Flight(record),
                FlightLookupOutcome::Degraded(sighting) => SearchDetails::Sighting(sighting),
                FlightLookupOutcome::NotFound => return Err(SyncError::LookupNotFound(code)),
            };
            Ok((RouteQuery::flight(code), details))
        }
        SearchRequest::Route { origin, destination, date } => {
            let origin = origin.trim();
            let destination = destination.trim();
            let info = lookup
                .lookup_route(iata_for(origin), iata_for(destination), date)
                .await?;

            let query = RouteQuery::route(
                origin,
                destination,
                airports::resolve(origin),
                airports::resolve(destination),
            );
            Ok((query, SearchDetails::Route(info)))
        }
    }
}

/// City names are mapped to their IATA code; anything else passes through.
fn iata_for(label: &str) -> &str {
    airports::find(label).map(|a| a.iata).unwrap_or(label)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::geo::GeoPoint;
    use crate::model::{FlightLeg, TrackedObject};
    use crate::recording::RecordingSurface;
    use crate::view_composer::ViewMode;
    use async_trait::async_trait;
    use skywatch_env::{EnvError, TokioContext};
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    /// Tokio context that records when its spawned task has returned.
    #[derive(Default)]
    struct TrackedContext {
        inner: TokioContext,
        finished: Arc<AtomicBool>,
    }

    impl TrackedContext {
        fn task_finished(&self) -> bool {
            self.finished.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SkywatchContext for TrackedContext {
        fn now(&self) -> Duration {
            self.inner.now()
        }

        fn system_time(&self) -> SystemTime {
            self.inner.system_time()
        }

        async fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration).await;
        }

        fn spawn<F>(&self, name: &str, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            let finished = self.finished.clone();
            self.inner.spawn(name, async move {
                future.await;
                finished.store(true, Ordering::SeqCst);
            });
        }

        fn seed(&self) -> u64 {
            0
        }
    }

    struct CountingFeed {
        calls: AtomicUsize,
        latency: Duration,
    }

    impl CountingFeed {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), latency })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotFeed for CountingFeed {
        async fn fetch_snapshot(&self) -> Result<Vec<TrackedObject>, EnvError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            let p = GeoPoint::new(10.0 + n as f64, 10.0).unwrap();
            Ok(vec![TrackedObject::at("abc123", p)])
        }
    }

    struct SlowLookup {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl FlightLookup for SlowLookup {
        async fn fetch_by_flight_number(&self, code: &str) -> Result<Option<FlightRecord>, EnvError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(EnvError::network("down"));
            }
            if code == "NONE1" {
                return Ok(None);
            }
            Ok(Some(FlightRecord {
                flight_number: code.to_string(),
                airline: "Thai Airways".to_string(),
                aircraft_type: None,
                departure: FlightLeg::default(),
                arrival: FlightLeg::default(),
                status: "active".to_string(),
                duration_min: None,
            }))
        }

        async fn fetch_by_route(
            &self,
            origin: &str,
            destination: &str,
            _date: Option<NaiveDate>,
        ) -> Result<Option<RouteInfo>, EnvError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(EnvError::network("down"));
            }
            assert_eq!((origin, destination), ("KTM", "BKK"));
            Ok(Some(RouteInfo::from_flights(Vec::new(), Some(1870.0))))
        }
    }

    fn shared_engine() -> SharedEngine<RecordingSurface> {
        share(MapEngine::create(RecordingSurface::new(), EngineConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_every_interval() {
        let ctx = TokioContext::shared();
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::ZERO);

        let _handle = start_live_tracking(ctx, engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;

        // t = 0, 10, 20
        assert_eq!(feed.calls(), 3);
        let e = engine.lock().await;
        assert_eq!(e.metrics().cycles_applied, 3);
        assert_eq!(e.markers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let ctx = TokioContext::shared();
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::ZERO);

        let handle = start_live_tracking(ctx, engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(feed.calls(), 1);
        assert_eq!(engine.lock().await.mode(), ViewMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_handle_dropped() {
        let ctx = TokioContext::shared();
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::ZERO);

        let handle = start_live_tracking(ctx.clone(), engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(1)).await;

        {
            let e = engine.lock().await;
            assert_eq!(e.mode(), ViewMode::Idle);
            assert_eq!(e.poll_generation(), None);
            assert_eq!(e.surface().marker_count(), 0);
        }

        let _handle = start_live_tracking(ctx, engine.clone(), feed.clone())
            .await
            .expect("live tracking restarts once the old task is gone");
        tokio::time::sleep(Duration::from_secs(15)).await;

        // one cycle before the drop, then t = 5 and 15 after the restart
        assert_eq!(feed.calls(), 3);
        let e = engine.lock().await;
        assert_eq!(e.mode(), ViewMode::LiveTracking);
        assert_eq!(e.markers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_wakes_parked_poll_task() {
        let ctx = Arc::new(TrackedContext::default());
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::ZERO);

        let _handle = start_live_tracking(ctx.clone(), engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!ctx.task_finished());

        engine.lock().await.teardown();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // next cycle was due at t = 10
        assert!(ctx.task_finished());
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_search_wakes_parked_poll_task() {
        let ctx = Arc::new(TrackedContext::default());
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::ZERO);

        let _handle = start_live_tracking(ctx.clone(), engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        engine.lock().await.show_route(RouteQuery::flight("TG320"));
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(ctx.task_finished());
        assert_eq!(engine.lock().await.mode(), ViewMode::RouteSearch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_feed_never_overlaps() {
        let ctx = TokioContext::shared();
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::from_secs(15));

        let _handle = start_live_tracking(ctx, engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;

        // starts at 0 and 15 (late), 30 (15 + 15); never two at once
        assert_eq!(feed.calls(), 3);
        assert_eq!(engine.lock().await.metrics().cycles_applied, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_during_fetch_is_silent() {
        let ctx = TokioContext::shared();
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::from_secs(5));

        let _handle = start_live_tracking(ctx, engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let calls_at_teardown = {
            let mut e = engine.lock().await;
            e.teardown();
            e.surface().call_count()
        };
        tokio::time::sleep(Duration::from_secs(30)).await;

        let e = engine.lock().await;
        assert_eq!(e.surface().call_count(), calls_at_teardown);
        assert_eq!(e.metrics().stale_dropped, 1);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_live_tracking() {
        let ctx = TokioContext::shared();
        let engine = shared_engine();
        let feed = CountingFeed::new(Duration::ZERO);

        let handle = start_live_tracking(ctx.clone(), engine.clone(), feed.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop_live_tracking(&engine, handle).await;

        assert_eq!(engine.lock().await.mode(), ViewMode::Idle);
        assert_eq!(engine.lock().await.surface().marker_count(), 0);
        assert!(start_live_tracking(ctx, engine.clone(), feed).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_search() {
        let engine = shared_engine();
        let lookup = FallbackLookup::primary_only(SlowLookup { delay: Duration::ZERO, fail: false });

        let request = SearchRequest::Route {
            origin: "Kathmandu".into(),
            destination: "bkk".into(),
            date: None,
        };
        let outcome = run_search(&engine, &lookup, request).await.unwrap();

        assert_eq!(outcome.overlay.pins.len(), 2);
        assert!(outcome.overlay.label.unwrap().distance_km > 0.0);
        assert!(matches!(outcome.details, SearchDetails::Route(Some(_))));
        assert_eq!(engine.lock().await.mode(), ViewMode::RouteSearch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flight_not_found_leaves_map() {
        let engine = shared_engine();
        let lookup = FallbackLookup::primary_only(SlowLookup { delay: Duration::ZERO, fail: false });

        let err = run_search(&engine, &lookup, SearchRequest::FlightNumber("none1".into()))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::LookupNotFound("NONE1".into()));
        assert_eq!(engine.lock().await.mode(), ViewMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_search_is_dropped() {
        let engine = shared_engine();
        let task_engine = engine.clone();
        let search = tokio::spawn(async move {
            let lookup = FallbackLookup::primary_only(SlowLookup {
                delay: Duration::from_secs(5),
                fail: true,
            });
            run_search(&task_engine, &lookup, SearchRequest::FlightNumber("TG320".into())).await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.lock().await.enter_live_tracking(Duration::from_secs(1));

        let result = search.await.unwrap();
        assert!(matches!(result, Err(SyncError::StaleResponse { .. })));
        assert_eq!(engine.lock().await.mode(), ViewMode::LiveTracking);
    }
}
