use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Booking, BookingReservation, ExpertRecord, TimeSlot};

/// Errors from the profile and booking collaborators
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("collaborator unreachable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    Invalid(String),
}

impl RepoError {
    /// Only transport-level failures are worth a retry
    pub fn is_transient(&self) -> bool {
        matches!(self, RepoError::Unavailable(_))
    }
}

/// Filter for listing candidate experts
#[derive(Debug, Clone, Default)]
pub struct ExpertFilter {
    pub expertise: Vec<String>,
    pub location: Option<String>,
    /// Maximum number of records to return; 0 means no limit
    pub limit: usize,
}

/// Read-only view of the profile subsystem
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_expert(&self, expert_id: &str) -> Result<ExpertRecord, RepoError>;

    async fn list_active_experts(&self, filter: &ExpertFilter)
        -> Result<Vec<ExpertRecord>, RepoError>;
}

/// Booking collaborator: calendar reads plus durable booking writes
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Bookings overlapping `window`, any status
    async fn list_confirmed_bookings(
        &self,
        expert_id: &str,
        window: &TimeSlot,
    ) -> Result<Vec<Booking>, RepoError>;

    /// Convert a reservation into a durable booking; returns the booking id
    async fn create_booking(&self, reservation: &BookingReservation) -> Result<String, RepoError>;

    async fn cancel_booking(&self, booking_id: &str) -> Result<(), RepoError>;
}

/// Backoff before the single retry of a transient collaborator failure
pub(crate) const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(250);

/// Run a collaborator call, retrying once after a short backoff when the
/// failure looks transient
pub(crate) async fn retry_once<T, Fut>(
    op_name: &str,
    f: impl Fn() -> Fut,
) -> Result<T, RepoError>
where
    Fut: std::future::Future<Output = Result<T, RepoError>>,
{
    match f().await {
        Err(err) if err.is_transient() => {
            tracing::debug!("{} failed ({}), retrying once", op_name, err);
            tokio::time::sleep(RETRY_BACKOFF).await;
            f().await
        }
        other => other,
    }
}
