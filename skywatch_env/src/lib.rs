//! Skywatch Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the Skywatch map
//! engine to run in both **Production** (tokio) and **Simulation**
//! (virtual clock) environments.
//!
//! # Core Concept
//!
//! Everything the polling loop needs from the outside world goes through
//! one trait:
//! - Time (`now()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Seeding (`seed()`)
//!
//! Collaborator failures (feeds, lookups) are reported as [`EnvError`].
//!
//! # Example
//!
//! ```ignore
//! use skywatch_env::SkywatchContext;
//!
//! async fn poll_loop<Ctx: SkywatchContext>(ctx: &Ctx) {
//!     loop {
//!         refresh().await;
//!         ctx.sleep(Duration::from_secs(10)).await;
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::SkywatchContext;
pub use types::ViewId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
