//! Error taxonomy of the synchronization engine.
//!
//! Nothing here is fatal. The worst outcome of any error is "map not
//! updated this cycle".

use skywatch_env::EnvError;
use thiserror::Error;

/// Errors surfaced by engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Feed or lookup transport failed; previous state retained.
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    /// Valid request, no data.
    #[error("No result for {0}")]
    LookupNotFound(String),

    /// Object or endpoint without usable coordinates.
    #[error("Invalid position for {0}")]
    InvalidPosition(String),

    /// Result arrived after its view was torn down or superseded.
    #[error("Stale response (generation {issued}, current {current})")]
    StaleResponse { issued: u64, current: u64 },
}

impl SyncError {
    /// Whether the error should be shown to the user.
    ///
    /// Only fetch failures (banner) and empty lookups (empty-result state)
    /// are visible; the rest is internal bookkeeping.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, SyncError::FetchFailure(_) | SyncError::LookupNotFound(_))
    }
}

/// Errors decoding an external feed payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with an error object instead of data
    #[error("Service error {code}: {message}")]
    Api { code: String, message: String },
}

impl From<DecodeError> for EnvError {
    fn from(e: DecodeError) -> Self {
        EnvError::decode(e)
    }
}

impl From<EnvError> for SyncError {
    fn from(e: EnvError) -> Self {
        SyncError::FetchFailure(e.to_string())
    }
}
