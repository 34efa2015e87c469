//! Skywatch Metrics Module
//! =======================
//!
//! Counters describing what the engine did over its lifetime:
//! - **Cycles**: started, applied, failed, dropped as stale
//! - **Markers**: added, updated, removed
//! - **Feed quality**: objects without position, duplicate ids
//!
//! The simulator asserts on these to decide pass/fail.

use crate::reconciler::MarkerDiff;
use serde::{Deserialize, Serialize};

/// Lifetime counters of one engine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub cycles_started: u64,
    pub cycles_applied: u64,
    pub fetch_failures: u64,
    pub stale_dropped: u64,

    pub markers_added: u64,
    pub markers_updated: u64,
    pub markers_removed: u64,

    /// Objects skipped for lack of a usable position
    pub invalid_skipped: u64,

    /// Snapshot rows superseded by a later row with the same id
    pub duplicate_ids: u64,

    /// Times the rendered set drifted from the expected id set
    pub inconsistencies: u64,

    /// Selections cleared because the object left the feed
    pub selections_cleared: u64,
}

impl SyncMetrics {
    /// Fold a successfully applied diff into the counters.
    pub fn record_diff(&mut self, diff: &MarkerDiff) {
        self.cycles_applied += 1;
        self.markers_added += diff.to_add.len() as u64;
        self.markers_updated += diff.to_update.len() as u64;
        self.markers_removed += diff.to_remove.len() as u64;
        self.invalid_skipped += diff.skipped_invalid as u64;
        self.duplicate_ids += diff.duplicates as u64;
    }

    /// Fraction of started cycles that failed to fetch.
    pub fn failure_rate(&self) -> f64 {
        if self.cycles_started == 0 {
            return 0.0;
        }
        self.fetch_failures as f64 / self.cycles_started as f64
    }
}
