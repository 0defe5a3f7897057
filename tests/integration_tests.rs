// End-to-end tests over the full service wired with in-memory collaborators

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use savoro_live::config::Settings;
use savoro_live::models::{
    Booking, BookingOutcome, BookingReservation, ExpertRecord, ExpertStatus, ExpertiseTag,
    LiveEvent, MatchCriteria, RateRange, TimeSlot, Urgency,
};
use savoro_live::services::{
    BookingRepository, EventPublisher, ExpertFilter, InMemoryStateStore, LiveService,
    ProfileRepository, RepoError, StateKey, StateStore,
};
use savoro_live::LiveError;

struct FixedProfiles {
    experts: Vec<ExpertRecord>,
}

#[async_trait]
impl ProfileRepository for FixedProfiles {
    async fn get_expert(&self, expert_id: &str) -> Result<ExpertRecord, RepoError> {
        self.experts
            .iter()
            .find(|e| e.expert_id == expert_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(expert_id.to_string()))
    }

    async fn list_active_experts(
        &self,
        _filter: &ExpertFilter,
    ) -> Result<Vec<ExpertRecord>, RepoError> {
        Ok(self.experts.iter().filter(|e| e.is_active).cloned().collect())
    }
}

struct FailingProfiles;

#[async_trait]
impl ProfileRepository for FailingProfiles {
    async fn get_expert(&self, _expert_id: &str) -> Result<ExpertRecord, RepoError> {
        Err(RepoError::Unavailable("profile service down".to_string()))
    }

    async fn list_active_experts(
        &self,
        _filter: &ExpertFilter,
    ) -> Result<Vec<ExpertRecord>, RepoError> {
        Err(RepoError::Unavailable("profile service down".to_string()))
    }
}

#[derive(Default)]
struct RecordingBookings {
    bookings: Mutex<Vec<Booking>>,
    created: Mutex<Vec<BookingReservation>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicU32,
}

#[async_trait]
impl BookingRepository for RecordingBookings {
    async fn list_confirmed_bookings(
        &self,
        expert_id: &str,
        _window: &TimeSlot,
    ) -> Result<Vec<Booking>, RepoError> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.expert_id == expert_id)
            .cloned()
            .collect())
    }

    async fn create_booking(&self, reservation: &BookingReservation) -> Result<String, RepoError> {
        self.created.lock().unwrap().push(reservation.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("bk-{}", n))
    }

    async fn cancel_booking(&self, booking_id: &str) -> Result<(), RepoError> {
        self.cancelled.lock().unwrap().push(booking_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<(String, LiveEvent)>>,
}

impl RecordingPublisher {
    fn events(&self) -> Vec<(String, LiveEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, event: LiveEvent) {
        self.events.lock().unwrap().push((topic.to_string(), event));
    }
}

fn expert(id: &str, tags: &[&str], active_engagements: u32) -> ExpertRecord {
    ExpertRecord {
        expert_id: id.to_string(),
        name: format!("Expert {}", id),
        weekly_slots: vec![],
        hourly_rate: RateRange { min: 90.0, max: 110.0 },
        expertise: tags
            .iter()
            .map(|t| ExpertiseTag { tag: (*t).to_string(), years: 10 })
            .collect(),
        rating_average: 4.5,
        response_time_hours: 2.0,
        active_engagements,
        completed_engagements: 60,
        certification_count: 4,
        location: None,
        is_active: true,
    }
}

struct Harness {
    service: Arc<LiveService>,
    bookings: Arc<RecordingBookings>,
    publisher: Arc<RecordingPublisher>,
    store: Arc<InMemoryStateStore>,
}

fn harness(experts: Vec<ExpertRecord>) -> Harness {
    harness_with(Arc::new(FixedProfiles { experts }))
}

fn harness_with(profiles: Arc<dyn ProfileRepository>) -> Harness {
    let bookings = Arc::new(RecordingBookings::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let store = Arc::new(InMemoryStateStore::new());
    let service = Arc::new(LiveService::new(
        &Settings::default(),
        profiles,
        Arc::clone(&bookings) as Arc<dyn BookingRepository>,
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
    ));
    Harness {
        service,
        bookings,
        publisher,
        store,
    }
}

fn criteria(required: &[&str]) -> MatchCriteria {
    MatchCriteria {
        required_expertise: required.iter().map(|t| (*t).to_string()).collect(),
        budget_min: Some(80.0),
        budget_max: Some(120.0),
        urgency: Urgency::Medium,
        complexity: 4,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_heartbeat_materializes_available_status() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    let status = h.service.record_heartbeat("e1").await.unwrap();

    assert_eq!(status.current_status, ExpertStatus::Available);
    assert_eq!(status.workload, 20);
    assert!(status.instant_booking_enabled);
    assert!(status.invariant_holds());
}

#[tokio::test]
async fn test_unknown_expert_reads_as_offline() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    let status = h.service.get_live_status("missing").await.unwrap();

    assert_eq!(status.current_status, ExpertStatus::Offline);
    assert_eq!(status.workload, 100);
    assert!(!status.instant_booking_enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_instant_bookings_grant_exactly_one() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..100 {
        let service = Arc::clone(&h.service);
        handles.push(tokio::spawn(async move {
            service
                .request_instant_booking("e1", &format!("client-{}", i), 60)
                .await
        }));
    }

    let mut granted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            BookingOutcome::Granted { .. } => granted += 1,
            BookingOutcome::Rejected { .. } => rejected += 1,
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(rejected, 99);

    let status = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(status.current_status, ExpertStatus::InConsultation);
    assert!(!status.instant_booking_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_reservation_expiry_restores_availability() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    let outcome = h.service.request_instant_booking("e1", "c1", 60).await.unwrap();
    let token = match outcome {
        BookingOutcome::Granted { token } => token,
        other => panic!("expected a grant, got {:?}", other),
    };

    let held = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(held.current_status, ExpertStatus::InConsultation);
    assert_eq!(held.active_reservation.as_deref(), Some(token.as_str()));

    // Default reservation TTL is 120s; ride past it and let the sweep run
    tokio::time::sleep(Duration::from_secs(125)).await;

    let released = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(released.current_status, ExpertStatus::Available);
    assert!(released.instant_booking_enabled);
    assert_eq!(released.active_reservation, None);

    assert!(h.publisher.events().iter().any(|(topic, event)| {
        topic == "live.booking" && matches!(event, LiveEvent::ReservationExpired { .. })
    }));

    // The expired token is gone for good
    assert!(h.service.confirm_reservation(&token).await.is_err());

    // And the expert resurfaces in matching
    let report = h.service.match_experts(&criteria(&["haccp"])).await.unwrap();
    assert!(report.matches.iter().any(|m| m.expert_id == "e1"));
}

#[tokio::test]
async fn test_reader_during_in_flight_reservation_cannot_break_the_hold() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    // Replay a reservation caught between its two writes: the record exists
    // but the status word has not been swapped yet
    let live_key = StateKey::live("e1");
    let stale_raw = h.store.get(&live_key).await.unwrap().unwrap();
    let in_flight = BookingReservation {
        token: "tok-a".to_string(),
        expert_id: "e1".to_string(),
        client_id: "client-a".to_string(),
        requested_start: Utc::now(),
        duration_mins: 60,
        expires_at: Utc::now() + chrono::Duration::minutes(2),
    };
    assert!(h
        .store
        .compare_and_set(
            &StateKey::reservation("tok-a"),
            None,
            &serde_json::to_string(&in_flight).unwrap(),
            Duration::from_secs(120),
        )
        .await
        .unwrap());

    // A reader in that window sees a clean available status and reverts nothing
    let seen = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(seen.current_status, ExpertStatus::Available);
    assert_eq!(seen.active_reservation, None);
    assert!(h
        .store
        .get(&StateKey::reservation("tok-a"))
        .await
        .unwrap()
        .is_some());

    // A concurrent caller takes the status word
    let winner = match h.service.request_instant_booking("e1", "client-b", 60).await.unwrap() {
        BookingOutcome::Granted { token } => token,
        other => panic!("expected a grant, got {:?}", other),
    };

    // The in-flight swap now loses its compare-and-set and grants nothing
    let lost = h
        .store
        .compare_and_set(&live_key, Some(&stale_raw), &stale_raw, Duration::from_secs(300))
        .await
        .unwrap();
    assert!(!lost);

    // Exactly one hold survives, and it belongs to the winner
    let status = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(status.current_status, ExpertStatus::InConsultation);
    assert_eq!(status.active_reservation.as_deref(), Some(winner.as_str()));
}

#[tokio::test]
async fn test_confirm_creates_durable_booking_and_releases_hold() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    let token = match h.service.request_instant_booking("e1", "c1", 60).await.unwrap() {
        BookingOutcome::Granted { token } => token,
        other => panic!("expected a grant, got {:?}", other),
    };

    let booking_id = h.service.confirm_reservation(&token).await.unwrap();
    assert_eq!(booking_id, "bk-0");

    let created = h.bookings.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].expert_id, "e1");
    assert_eq!(created[0].client_id, "c1");
    assert_eq!(created[0].duration_mins, 60);
    drop(created);

    let status = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(status.active_reservation, None);
    assert_eq!(status.current_status, ExpertStatus::Available);

    // The reservation is consumed; confirming twice must not double-book
    assert!(h.service.confirm_reservation(&token).await.is_err());
    assert_eq!(h.bookings.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_releases_hold_without_booking() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    let token = match h.service.request_instant_booking("e1", "c1", 60).await.unwrap() {
        BookingOutcome::Granted { token } => token,
        other => panic!("expected a grant, got {:?}", other),
    };

    h.service.cancel_reservation(&token).await.unwrap();

    assert!(h.bookings.created.lock().unwrap().is_empty());
    let status = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(status.current_status, ExpertStatus::Available);
    assert!(status.instant_booking_enabled);
}

#[tokio::test]
async fn test_instant_booking_rejected_without_heartbeat() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    // No heartbeat was ever recorded, so the expert reads as offline
    let outcome = h.service.request_instant_booking("e1", "c1", 60).await.unwrap();
    assert!(matches!(outcome, BookingOutcome::Rejected { .. }));
}

#[tokio::test]
async fn test_zero_duration_is_an_invalid_request() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    let outcome = h.service.request_instant_booking("e1", "c1", 0).await.unwrap();
    match outcome {
        BookingOutcome::Rejected { reason } => {
            assert_eq!(
                reason,
                savoro_live::models::RejectionReason::InvalidRequest
            );
        }
        other => panic!("expected a rejection, got {:?}", other),
    }

    // The expert remains bookable
    let status = h.service.get_live_status("e1").await.unwrap();
    assert!(status.instant_booking_enabled);
}

#[tokio::test]
async fn test_heartbeat_does_not_clobber_active_reservation() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);
    h.service.record_heartbeat("e1").await.unwrap();

    let token = match h.service.request_instant_booking("e1", "c1", 60).await.unwrap() {
        BookingOutcome::Granted { token } => token,
        other => panic!("expected a grant, got {:?}", other),
    };

    let status = h.service.record_heartbeat("e1").await.unwrap();

    assert_eq!(status.current_status, ExpertStatus::InConsultation);
    assert_eq!(status.active_reservation.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn test_match_experts_ranks_by_fit() {
    let h = harness(vec![
        expert("generalist", &["menu"], 1),
        expert("specialist", &["haccp", "allergen"], 1),
    ]);
    h.service.record_heartbeat("generalist").await.unwrap();
    h.service.record_heartbeat("specialist").await.unwrap();

    let report = h
        .service
        .match_experts(&criteria(&["haccp", "allergen"]))
        .await
        .unwrap();

    assert_eq!(report.total_candidates, 2);
    assert!(report.diagnostic.is_none());
    assert!(!report.matches.is_empty());
    assert_eq!(report.matches[0].expert_id, "specialist");
    for window in report.matches.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
}

#[tokio::test(start_paused = true)]
async fn test_match_experts_degrades_when_directory_is_down() {
    let h = harness_with(Arc::new(FailingProfiles));

    let report = h.service.match_experts(&criteria(&["haccp"])).await.unwrap();

    assert!(report.matches.is_empty());
    assert_eq!(report.total_candidates, 0);
    assert!(report.diagnostic.is_some());
}

#[tokio::test]
async fn test_malformed_criteria_are_rejected_before_io() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    // Neither expertise tags nor request text
    let empty = MatchCriteria {
        urgency: Urgency::Medium,
        complexity: 5,
        ..Default::default()
    };

    let result = h.service.match_experts(&empty).await;
    assert!(matches!(result, Err(LiveError::InvalidCriteria(_))));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_loop_materializes_statuses_and_stops_cleanly() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    Arc::clone(&h.service).start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // No heartbeat yet, so the loop writes the conservative offline status
    let status = h.service.get_live_status("e1").await.unwrap();
    assert_eq!(status.current_status, ExpertStatus::Offline);

    h.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_booking_reminder_fires_and_is_revocable() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    h.service
        .schedule_booking_reminder("bk-7", "e1", Duration::from_secs(600));
    tokio::time::sleep(Duration::from_secs(601)).await;

    assert!(h.publisher.events().iter().any(|(_, event)| {
        matches!(
            event,
            LiveEvent::BookingReminder { booking_id, .. } if booking_id == "bk-7"
        )
    }));

    // Cancelling a booking revokes a still-pending reminder
    h.service
        .schedule_booking_reminder("bk-8", "e1", Duration::from_secs(600));
    h.service.cancel_booking("bk-8").await.unwrap();
    tokio::time::sleep(Duration::from_secs(601)).await;

    assert!(!h.publisher.events().iter().any(|(_, event)| {
        matches!(
            event,
            LiveEvent::BookingReminder { booking_id, .. } if booking_id == "bk-8"
        )
    }));
    assert_eq!(h.bookings.cancelled.lock().unwrap().as_slice(), ["bk-8"]);
}

#[tokio::test]
async fn test_status_transition_is_published() {
    let h = harness(vec![expert("e1", &["haccp"], 1)]);

    // Materialize as offline first, then heartbeat into available
    h.service.get_live_status("e1").await.unwrap();
    h.service.record_heartbeat("e1").await.unwrap();

    assert!(h.publisher.events().iter().any(|(topic, event)| {
        topic == "live.status"
            && matches!(
                event,
                LiveEvent::StatusChanged {
                    previous: ExpertStatus::Offline,
                    current: ExpertStatus::Available,
                    ..
                }
            )
    }));
}

#[tokio::test]
async fn test_expert_at_capacity_is_not_instantly_bookable() {
    let h = harness(vec![expert("e1", &["haccp"], 5)]);

    let status = h.service.record_heartbeat("e1").await.unwrap();
    assert_eq!(status.current_status, ExpertStatus::Busy);
    assert_eq!(status.workload, 100);

    let outcome = h.service.request_instant_booking("e1", "c1", 60).await.unwrap();
    assert!(matches!(outcome, BookingOutcome::Rejected { .. }));
}
