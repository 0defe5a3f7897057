use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::core::workload::{compute_workload, failsafe_offline, WorkloadInputs, WorkloadSnapshot};
use crate::models::{ExpertRecord, TimeSlot};
use crate::services::repos::{retry_once, BookingRepository, ProfileRepository};

/// Derives status, workload and instant-booking eligibility for an expert
///
/// Pulls the engagement count from the profile record and the in-session
/// check from the booking collaborator. Unreadable collaborators degrade to
/// the conservative offline snapshot instead of erroring, so downstream
/// matching never offers an unknown-state expert for instant work.
pub struct WorkloadCalculator {
    profiles: Arc<dyn ProfileRepository>,
    bookings: Arc<dyn BookingRepository>,
    max_active_engagements: u32,
    stale_threshold: Duration,
}

impl WorkloadCalculator {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        bookings: Arc<dyn BookingRepository>,
        max_active_engagements: u32,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            profiles,
            bookings,
            max_active_engagements,
            stale_threshold,
        }
    }

    /// Snapshot for an expert by id, fetching the record first
    pub async fn snapshot(
        &self,
        expert_id: &str,
        last_heartbeat: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> WorkloadSnapshot {
        let record = retry_once("get_expert", || self.profiles.get_expert(expert_id)).await;

        match record {
            Ok(record) => self.snapshot_for_record(&record, last_heartbeat, now).await,
            Err(err) => {
                tracing::warn!(
                    "Cannot read expert record for {}, degrading to offline: {}",
                    expert_id,
                    err
                );
                failsafe_offline()
            }
        }
    }

    /// Snapshot for an already-fetched record
    pub async fn snapshot_for_record(
        &self,
        record: &ExpertRecord,
        last_heartbeat: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> WorkloadSnapshot {
        let in_session_now = self.in_session(&record.expert_id, now).await;

        compute_workload(&WorkloadInputs {
            active_engagements: record.active_engagements,
            max_active_engagements: self.max_active_engagements,
            last_heartbeat,
            stale_threshold: self.stale_threshold,
            in_session_now,
            now,
        })
    }

    /// Whether a confirmed engagement's window currently contains `now`
    async fn in_session(&self, expert_id: &str, now: DateTime<Utc>) -> bool {
        let window = TimeSlot::new(now - Duration::days(1), now + Duration::days(1));
        let bookings = retry_once("list_confirmed_bookings", || {
            self.bookings.list_confirmed_bookings(expert_id, &window)
        })
        .await;

        match bookings {
            Ok(bookings) => bookings
                .iter()
                .filter(|b| b.status.blocks_calendar())
                .any(|b| TimeSlot::new(b.start, b.end).contains(now)),
            Err(err) => {
                tracing::warn!("In-session check failed for {}: {}", expert_id, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Booking, BookingReservation, BookingStatus, ExpertStatus, ExpertiseTag, RateRange,
    };
    use crate::services::repos::{ExpertFilter, RepoError};
    use async_trait::async_trait;

    struct FakeProfiles {
        record: Option<ExpertRecord>,
    }

    #[async_trait]
    impl ProfileRepository for FakeProfiles {
        async fn get_expert(&self, expert_id: &str) -> Result<ExpertRecord, RepoError> {
            self.record
                .clone()
                .ok_or_else(|| RepoError::Unavailable(format!("no profile store for {}", expert_id)))
        }

        async fn list_active_experts(
            &self,
            _filter: &ExpertFilter,
        ) -> Result<Vec<ExpertRecord>, RepoError> {
            Ok(self.record.clone().into_iter().collect())
        }
    }

    struct FakeBookings {
        bookings: Vec<Booking>,
    }

    #[async_trait]
    impl BookingRepository for FakeBookings {
        async fn list_confirmed_bookings(
            &self,
            _expert_id: &str,
            _window: &TimeSlot,
        ) -> Result<Vec<Booking>, RepoError> {
            Ok(self.bookings.clone())
        }

        async fn create_booking(
            &self,
            _reservation: &BookingReservation,
        ) -> Result<String, RepoError> {
            unimplemented!("not used in workload tests")
        }

        async fn cancel_booking(&self, _booking_id: &str) -> Result<(), RepoError> {
            unimplemented!("not used in workload tests")
        }
    }

    fn record(active: u32) -> ExpertRecord {
        ExpertRecord {
            expert_id: "e1".to_string(),
            name: "Expert".to_string(),
            weekly_slots: vec![],
            hourly_rate: RateRange { min: 90.0, max: 110.0 },
            expertise: vec![ExpertiseTag { tag: "haccp".to_string(), years: 10 }],
            rating_average: 4.5,
            response_time_hours: 2.0,
            active_engagements: active,
            completed_engagements: 50,
            certification_count: 2,
            location: None,
            is_active: true,
        }
    }

    fn calculator(record: Option<ExpertRecord>, bookings: Vec<Booking>) -> WorkloadCalculator {
        WorkloadCalculator::new(
            Arc::new(FakeProfiles { record }),
            Arc::new(FakeBookings { bookings }),
            5,
            Duration::minutes(30),
        )
    }

    #[tokio::test]
    async fn test_full_engagements_is_busy() {
        let calc = calculator(Some(record(5)), vec![]);
        let now = Utc::now();

        let snap = calc.snapshot("e1", Some(now), now).await;

        assert_eq!(snap.status, ExpertStatus::Busy);
        assert_eq!(snap.workload, 100);
        assert!(!snap.instant_booking_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_record_degrades_to_offline() {
        let calc = calculator(None, vec![]);
        let now = Utc::now();

        let snap = calc.snapshot("e1", Some(now), now).await;

        assert_eq!(snap.status, ExpertStatus::Offline);
        assert_eq!(snap.workload, 100);
    }

    #[tokio::test]
    async fn test_booking_in_window_means_in_consultation() {
        let now = Utc::now();
        let calc = calculator(
            Some(record(2)),
            vec![Booking {
                booking_id: "b1".to_string(),
                expert_id: "e1".to_string(),
                client_id: "c1".to_string(),
                start: now - Duration::minutes(10),
                end: now + Duration::minutes(50),
                status: BookingStatus::InProgress,
            }],
        );

        let snap = calc.snapshot("e1", Some(now), now).await;

        assert_eq!(snap.status, ExpertStatus::InConsultation);
        assert!(!snap.instant_booking_enabled);
    }
}
