//! Skywatch Deterministic Simulation Harness
//!
//! Runs the map engine against a simulated airspace on a virtual clock.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advanced one poll interval per tick
//! - **Feed**: Outages and slow fetches scripted per scenario
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │  ┌──────────────┐   begin_cycle /   ┌────────────────────┐  │
//! │  │  MapEngine   │◄─ complete_cycle ─│     FleetFeed      │  │
//! │  │ (Recording   │                   │ (outages, latency) │  │
//! │  │   Surface)   │                   └─────────▲──────────┘  │
//! │  └──────┬───────┘                             │             │
//! │         │ rendered ids           ┌────────────┴──────────┐  │
//! │         └──────── compared ─────►│   Fleet (ground truth) │  │
//! │                                  └────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use skywatch_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::SlowFeed);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod feed;
mod fleet;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{MarkerPosition, SimEvent, SimExport, SimFrame};
pub use feed::{FeedResponse, FleetFeed};
pub use fleet::{Fleet, FleetConfig, FleetSnapshot, SimAircraft};
pub use runner::{ScenarioResult, ScenarioRunner};
