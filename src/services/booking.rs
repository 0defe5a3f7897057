use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::LiveError;
use crate::models::{
    BookingOutcome, BookingReservation, ExpertStatus, LiveEvent, LiveStatus, RejectionReason,
    TOPIC_BOOKING, TOPIC_STATUS,
};
use crate::services::publisher::EventPublisher;
use crate::services::state_store::{StateKey, StateStore, StateStoreError};
use crate::services::timers::TaskScheduler;
use crate::services::workload::WorkloadCalculator;
use crate::services::repos::BookingRepository;

/// Attempts to re-run a lost compare-and-set before giving up on a revert
const RELEASE_ATTEMPTS: u32 = 3;

/// Grants at most one concurrent instant booking per expert
///
/// The only mutation primitive is the state store's compare-and-set over the
/// expert's LiveStatus JSON: reserve swaps `available` for
/// `in_consultation` carrying the reservation token in one atomic step, so
/// N racing callers produce exactly one winner without any in-process lock.
pub struct InstantBookingArbiter {
    store: Arc<dyn StateStore>,
    bookings: Arc<dyn BookingRepository>,
    workload: Arc<WorkloadCalculator>,
    publisher: Arc<dyn EventPublisher>,
    timers: Arc<TaskScheduler>,
    reservation_ttl: Duration,
    status_ttl: Duration,
}

impl InstantBookingArbiter {
    pub fn new(
        store: Arc<dyn StateStore>,
        bookings: Arc<dyn BookingRepository>,
        workload: Arc<WorkloadCalculator>,
        publisher: Arc<dyn EventPublisher>,
        timers: Arc<TaskScheduler>,
        reservation_ttl: Duration,
        status_ttl: Duration,
    ) -> Self {
        Self {
            store,
            bookings,
            workload,
            publisher,
            timers,
            reservation_ttl,
            status_ttl,
        }
    }

    /// Atomically check-and-reserve the expert for an instant booking
    ///
    /// Succeeds only against a live status that is `available` with instant
    /// booking enabled; losing the swap to a concurrent caller, or hitting a
    /// stale/absent status, is a rejection rather than an error.
    pub async fn reserve(
        self: Arc<Self>,
        expert_id: &str,
        client_id: &str,
        duration_mins: u32,
    ) -> Result<BookingOutcome, LiveError> {
        if duration_mins == 0 {
            return Ok(BookingOutcome::Rejected {
                reason: RejectionReason::InvalidRequest,
            });
        }

        let live_key = StateKey::live(expert_id);
        let raw = self.store.get(&live_key).await?;

        let Some(raw) = raw else {
            // Status expired or never materialized: treated as offline
            return Ok(rejected());
        };
        let current: LiveStatus = match serde_json::from_str(&raw) {
            Ok(status) => status,
            Err(err) => {
                tracing::error!("Corrupt live status for {}: {}", expert_id, err);
                return Ok(rejected());
            }
        };

        let eligible = current.current_status == ExpertStatus::Available
            && current.instant_booking_enabled
            && current.active_reservation.is_none();
        if !eligible {
            return Ok(rejected());
        }

        let token = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.reservation_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(2));

        // The reservation record goes in before the status swap, so no reader
        // can ever observe a held status whose backing record is missing and
        // mistake a live hold for an expired one. An orphaned record (process
        // death before the swap) grants nothing and ages out with its TTL.
        let reservation = BookingReservation {
            token: token.clone(),
            expert_id: expert_id.to_string(),
            client_id: client_id.to_string(),
            requested_start: now,
            duration_mins,
            expires_at,
        };
        let reservation_json =
            serde_json::to_string(&reservation).map_err(StateStoreError::from)?;
        let created = self
            .store
            .compare_and_set(
                &StateKey::reservation(&token),
                None,
                &reservation_json,
                self.reservation_ttl,
            )
            .await?;
        if !created {
            return Err(LiveError::StateConflict(format!(
                "reservation token collision for {}",
                token
            )));
        }

        let held = LiveStatus {
            current_status: ExpertStatus::InConsultation,
            instant_booking_enabled: false,
            active_reservation: Some(token.clone()),
            ..current.clone()
        };
        let held_json = serde_json::to_string(&held).map_err(StateStoreError::from)?;

        let swapped = self
            .store
            .compare_and_set(&live_key, Some(&raw), &held_json, self.status_ttl)
            .await?;
        if !swapped {
            // The status word is the sole arbiter; a losing record grants
            // nothing and is dropped right away
            if let Err(err) = self.store.delete(&StateKey::reservation(&token)).await {
                tracing::warn!("Failed to drop losing reservation {}: {}", token, err);
            }
            tracing::debug!("Reservation race lost for expert {}", expert_id);
            return Ok(rejected());
        }

        // Expiry sweep for an unconfirmed reservation
        let arbiter = Arc::clone(&self);
        let expired_expert = expert_id.to_string();
        let expired_token = token.clone();
        self.timers.schedule(
            token.clone(),
            self.reservation_ttl,
            async move {
                arbiter.expire(&expired_expert, &expired_token).await;
            },
        );

        self.publisher
            .publish(
                TOPIC_BOOKING,
                LiveEvent::ReservationGranted {
                    expert_id: expert_id.to_string(),
                    client_id: client_id.to_string(),
                    token: token.clone(),
                    expires_at,
                },
            )
            .await;

        tracing::info!("Reserved expert {} for client {}", expert_id, client_id);
        Ok(BookingOutcome::Granted { token })
    }

    /// Convert a granted reservation into a durable booking
    pub async fn confirm(&self, token: &str) -> Result<String, LiveError> {
        let reservation_key = StateKey::reservation(token);
        let raw = self.store.get(&reservation_key).await?.ok_or_else(|| {
            LiveError::StateConflict(format!("reservation {} expired or unknown", token))
        })?;
        let reservation: BookingReservation =
            serde_json::from_str(&raw).map_err(StateStoreError::from)?;

        // Stop the expiry sweep before the durable write can race it
        self.timers.cancel(token);

        let booking_id = self.bookings.create_booking(&reservation).await?;

        self.store.delete(&reservation_key).await?;
        self.release_hold(&reservation.expert_id, token).await?;

        self.publisher
            .publish(
                TOPIC_BOOKING,
                LiveEvent::ReservationConfirmed {
                    expert_id: reservation.expert_id.clone(),
                    token: token.to_string(),
                    booking_id: booking_id.clone(),
                },
            )
            .await;

        tracing::info!(
            "Confirmed reservation {} as booking {} for expert {}",
            token,
            booking_id,
            reservation.expert_id
        );
        Ok(booking_id)
    }

    /// Release a granted reservation without booking
    pub async fn cancel(&self, token: &str) -> Result<(), LiveError> {
        let reservation_key = StateKey::reservation(token);
        let raw = self.store.get(&reservation_key).await?.ok_or_else(|| {
            LiveError::StateConflict(format!("reservation {} expired or unknown", token))
        })?;
        let reservation: BookingReservation =
            serde_json::from_str(&raw).map_err(StateStoreError::from)?;

        self.timers.cancel(token);
        self.store.delete(&reservation_key).await?;
        self.release_hold(&reservation.expert_id, token).await?;

        self.publisher
            .publish(
                TOPIC_BOOKING,
                LiveEvent::ReservationCancelled {
                    expert_id: reservation.expert_id.clone(),
                    token: token.to_string(),
                },
            )
            .await;

        Ok(())
    }

    /// Expiry path, reached from the sweep timer or a lazy check-on-read
    ///
    /// Idempotent: a reservation that was already confirmed, cancelled or
    /// released by someone else is left alone.
    pub(crate) async fn expire(&self, expert_id: &str, token: &str) {
        let reservation_key = StateKey::reservation(token);
        let had_reservation = matches!(self.store.get(&reservation_key).await, Ok(Some(_)));

        if let Err(err) = self.store.delete(&reservation_key).await {
            tracing::warn!("Failed to drop reservation {}: {}", token, err);
        }

        match self.release_hold(expert_id, token).await {
            Ok(true) => {
                if had_reservation {
                    tracing::info!("Reservation {} for expert {} expired", token, expert_id);
                }
                self.publisher
                    .publish(
                        TOPIC_BOOKING,
                        LiveEvent::ReservationExpired {
                            expert_id: expert_id.to_string(),
                            token: token.to_string(),
                        },
                    )
                    .await;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!("Failed to release expired hold on {}: {}", expert_id, err);
            }
        }
    }

    /// Drop the token's hold on the live status, replacing it with a freshly
    /// recomputed snapshot (never a blind `available` write, since the
    /// underlying state may have changed while the hold existed)
    async fn release_hold(&self, expert_id: &str, token: &str) -> Result<bool, LiveError> {
        let live_key = StateKey::live(expert_id);

        for _ in 0..RELEASE_ATTEMPTS {
            let Some(raw) = self.store.get(&live_key).await? else {
                // Expired from the store; the next read recomputes anyway
                return Ok(false);
            };
            let current: LiveStatus = match serde_json::from_str(&raw) {
                Ok(status) => status,
                Err(err) => {
                    tracing::error!("Corrupt live status for {}: {}", expert_id, err);
                    return Ok(false);
                }
            };

            if current.active_reservation.as_deref() != Some(token) {
                // Hold already belongs to someone else or was released
                return Ok(false);
            }

            let fresh = self
                .workload
                .snapshot(expert_id, current.last_heartbeat, Utc::now())
                .await;
            let released = LiveStatus {
                expert_id: expert_id.to_string(),
                current_status: fresh.status,
                workload: fresh.workload,
                next_available_slot: current.next_available_slot,
                last_heartbeat: current.last_heartbeat,
                instant_booking_enabled: fresh.instant_booking_enabled,
                active_reservation: None,
            };
            let released_json =
                serde_json::to_string(&released).map_err(StateStoreError::from)?;

            if self
                .store
                .compare_and_set(&live_key, Some(&raw), &released_json, self.status_ttl)
                .await?
            {
                if released.current_status != current.current_status {
                    self.publisher
                        .publish(
                            TOPIC_STATUS,
                            LiveEvent::StatusChanged {
                                expert_id: expert_id.to_string(),
                                previous: current.current_status,
                                current: released.current_status,
                                workload: released.workload,
                            },
                        )
                        .await;
                }
                return Ok(true);
            }
            // Someone else swapped the status under us; re-read and re-check
        }

        tracing::warn!(
            "Gave up releasing hold on {} after {} attempts",
            expert_id,
            RELEASE_ATTEMPTS
        );
        Ok(false)
    }
}

fn rejected() -> BookingOutcome {
    BookingOutcome::Rejected {
        reason: RejectionReason::ExpertUnavailable,
    }
}
