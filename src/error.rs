use thiserror::Error;

use crate::services::repos::RepoError;
use crate::services::state_store::StateStoreError;

/// Error taxonomy of the live core
///
/// Transient collaborator failures are retried once before surfacing as
/// `DataUnavailable`; a lost reservation race is a `StateConflict` and
/// retryable by the caller; `InvalidCriteria` is rejected before any I/O;
/// stale live state is normally degraded to offline rather than raised.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("collaborator unavailable: {0}")]
    DataUnavailable(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("stale live state: {0}")]
    StaleState(String),
}

impl From<StateStoreError> for LiveError {
    fn from(err: StateStoreError) -> Self {
        LiveError::DataUnavailable(err.to_string())
    }
}

impl From<RepoError> for LiveError {
    fn from(err: RepoError) -> Self {
        LiveError::DataUnavailable(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LiveError {
    fn from(err: validator::ValidationErrors) -> Self {
        LiveError::InvalidCriteria(err.to_string())
    }
}
