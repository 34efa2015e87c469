//! Simulated live feed backed by the ground-truth fleet.

use crate::fleet::{Fleet, FleetSnapshot};
use async_trait::async_trait;
use skywatch_core::{ObjectId, SnapshotFeed, TrackedObject};
use skywatch_env::EnvError;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// One answer from the simulated feed.
#[derive(Debug, Clone)]
pub struct FeedResponse {
    /// Zero-based index of the fetch
    pub call: u64,
    pub result: Result<Vec<TrackedObject>, EnvError>,

    /// Ids that must be rendered once `result` is applied; empty on failure
    pub expected_ids: BTreeSet<ObjectId>,
}

impl FeedResponse {
    pub fn is_outage(&self) -> bool {
        self.result.is_err()
    }
}

/// A [`SnapshotFeed`] over a [`Fleet`] with scripted outages.
pub struct FleetFeed {
    fleet: Mutex<Fleet>,
    outages: HashSet<u64>,
    calls: AtomicU64,
}

impl FleetFeed {
    pub fn new(fleet: Fleet) -> Self {
        Self {
            fleet: Mutex::new(fleet),
            outages: HashSet::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Fail the fetches with the given zero-based indices.
    pub fn with_outages(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.outages.extend(calls);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Advance the fleet by one tick.
    pub fn step(&self, dt_secs: f64) {
        self.fleet.lock().unwrap().step(dt_secs);
    }

    /// Run a closure against the fleet (scripted churn).
    pub fn with_fleet<R>(&self, f: impl FnOnce(&mut Fleet) -> R) -> R {
        f(&mut self.fleet.lock().unwrap())
    }

    /// Answer one fetch synchronously.
    pub fn poll(&self) -> FeedResponse {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outages.contains(&call) {
            debug!(call, "Simulated feed outage");
            return FeedResponse {
                call,
                result: Err(EnvError::network("simulated outage")),
                expected_ids: BTreeSet::new(),
            };
        }

        let FleetSnapshot { objects, expected_ids } = self.fleet.lock().unwrap().snapshot();
        FeedResponse {
            call,
            result: Ok(objects),
            expected_ids,
        }
    }
}

#[async_trait]
impl SnapshotFeed for FleetFeed {
    async fn fetch_snapshot(&self) -> Result<Vec<TrackedObject>, EnvError> {
        self.poll().result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::FleetConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn feed() -> FleetFeed {
        FleetFeed::new(Fleet::new(FleetConfig::steady(5), ChaCha8Rng::seed_from_u64(9)))
    }

    #[test]
    fn test_scripted_outages() {
        let feed = feed().with_outages([1]);

        assert!(!feed.poll().is_outage());
        let failed = feed.poll();
        assert!(failed.is_outage());
        assert!(failed.expected_ids.is_empty());
        assert_eq!(failed.call, 1);
        assert!(!feed.poll().is_outage());
        assert_eq!(feed.calls(), 3);
    }

    #[test]
    fn test_scripted_churn() {
        let feed = feed();
        feed.with_fleet(|f| f.ground_all());
        let response = feed.poll();
        assert_eq!(response.result.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_live_polling_on_virtual_clock() {
        use crate::context::SimContext;
        use skywatch_core::runtime::{share, start_live_tracking};
        use skywatch_core::{EngineConfig, MapEngine, RecordingSurface, ViewMode};
        use skywatch_env::SkywatchContext;
        use std::sync::Arc;
        use std::time::Duration;

        let ctx = SimContext::shared(1);
        let engine = share(MapEngine::create(RecordingSurface::new(), EngineConfig::default()));
        let feed = Arc::new(feed());

        let handle = start_live_tracking(ctx.clone(), engine.clone(), feed.clone())
            .await
            .unwrap();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert!(feed.calls() >= 2);
        assert!(ctx.now() >= Duration::from_secs(10));
        {
            let e = engine.lock().await;
            assert!(e.metrics().cycles_applied >= 2);
            assert_eq!(e.markers().len(), 5);
        }

        handle.cancel();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let e = engine.lock().await;
        assert_eq!(e.mode(), ViewMode::Idle);
        assert!(e.markers().is_empty());
    }

    #[tokio::test]
    async fn test_async_fetch() {
        let feed = feed();
        let objects = feed.fetch_snapshot().await.unwrap();
        assert_eq!(objects.len(), 5);
    }
}
