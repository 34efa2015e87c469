//! Skywatch Core - live geospatial state synchronization for aircraft maps
//!
//! This library keeps a map surface in step with a polled live feed and with
//! user searches:
//! 1. **Reconciliation**: keyed add/update/remove diffs instead of redraws
//! 2. **View composition**: bounds and route overlays per view mode
//! 3. **Polling**: one in-flight fetch at a time, stale results dropped
//!
//! The map widget, the live feed and the flight lookup service are external
//! collaborators behind [`RenderSurface`], [`SnapshotFeed`] and
//! [`FlightLookup`].

pub mod geo;
pub mod model;
pub mod surface;
pub mod recording;
pub mod reconciler;
pub mod view_composer;
pub mod selection;
pub mod scheduler;
pub mod error;
pub mod config;
pub mod metrics;
pub mod feed;
pub mod airports;
pub mod opensky;
pub mod aviationstack;
pub mod engine;
pub mod runtime;

// Re-export key types for convenience
pub use config::{ConfigError, EngineConfig};
pub use engine::{CycleReport, MapEngine, SearchTicket};
pub use error::{DecodeError, SyncError};
pub use feed::{FallbackLookup, FlightLookup, NoSightings, SightingSource, SnapshotFeed};
pub use geo::{Bounds, GeoError, GeoPoint};
pub use metrics::SyncMetrics;
pub use model::{FlightLookupOutcome, ObjectId, RouteQuery, TrackedObject};
pub use reconciler::{reconcile, MarkerDiff, RenderedMarkerSet};
pub use recording::RecordingSurface;
pub use scheduler::{PollHandle, PollScheduler, PollTicket, SchedulerConfig};
pub use selection::{InfoPanel, SelectionState};
pub use surface::RenderSurface;
pub use view_composer::{ViewComposer, ViewMode};
