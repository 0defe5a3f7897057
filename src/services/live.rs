use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use validator::Validate;

use crate::config::Settings;
use crate::core::Matcher;
use crate::error::LiveError;
use crate::models::{
    BookingOutcome, DayAvailability, ExpertRecord, LiveEvent, LiveStatus, MatchCriteria,
    MatchReport, TOPIC_BOOKING, TOPIC_STATUS,
};
use crate::services::availability::AvailabilityScheduler;
use crate::services::booking::InstantBookingArbiter;
use crate::services::publisher::EventPublisher;
use crate::services::repos::{retry_once, BookingRepository, ExpertFilter, ProfileRepository, RepoError};
use crate::services::state_store::{StateKey, StateStore, StateStoreError};
use crate::services::timers::TaskScheduler;
use crate::services::workload::WorkloadCalculator;

/// Attempts for heartbeat writes racing other status writers
const HEARTBEAT_ATTEMPTS: u32 = 3;

/// Optional tag extraction collaborator for free-form request text
///
/// When absent or failing, the matcher falls back to the fixed food-industry
/// keyword list instead of failing the request.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_tags(&self, text: &str) -> Result<Vec<String>, RepoError>;
}

/// Facade over the live availability and matching core
///
/// Explicitly constructed with injected collaborators; no process-wide
/// registry. `start()`/`stop()` control the background recomputation loop.
pub struct LiveService {
    profiles: Arc<dyn ProfileRepository>,
    bookings: Arc<dyn BookingRepository>,
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn EventPublisher>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    matcher: Matcher,
    availability: AvailabilityScheduler,
    workload: Arc<WorkloadCalculator>,
    arbiter: Arc<InstantBookingArbiter>,
    timers: Arc<TaskScheduler>,
    expert_cache: moka::future::Cache<String, ExpertRecord>,
    status_ttl: Duration,
    refresh_interval: Duration,
    horizon_days: u32,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl LiveService {
    pub fn new(
        settings: &Settings,
        profiles: Arc<dyn ProfileRepository>,
        bookings: Arc<dyn BookingRepository>,
        store: Arc<dyn StateStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let stale_threshold = chrono::Duration::minutes(settings.live.stale_threshold_mins);
        let status_ttl = Duration::from_secs(settings.live.status_ttl_secs);
        let reservation_ttl = Duration::from_secs(settings.live.reservation_ttl_secs);

        let workload = Arc::new(WorkloadCalculator::new(
            Arc::clone(&profiles),
            Arc::clone(&bookings),
            settings.live.max_active_engagements,
            stale_threshold,
        ));
        let timers = Arc::new(TaskScheduler::new());
        let arbiter = Arc::new(InstantBookingArbiter::new(
            Arc::clone(&store),
            Arc::clone(&bookings),
            Arc::clone(&workload),
            Arc::clone(&publisher),
            Arc::clone(&timers),
            reservation_ttl,
            status_ttl,
        ));

        let expert_cache = moka::future::CacheBuilder::new(settings.live.snapshot_cache_size)
            .time_to_live(Duration::from_secs(settings.live.snapshot_cache_ttl_secs))
            .build();

        let (shutdown, _) = watch::channel(false);

        Self {
            availability: AvailabilityScheduler::new(Arc::clone(&bookings)),
            matcher: Matcher::new(settings.scoring.weights.as_weights()),
            profiles,
            bookings,
            store,
            publisher,
            extractor: None,
            workload,
            arbiter,
            timers,
            expert_cache,
            status_ttl,
            refresh_interval: Duration::from_secs(settings.live.refresh_interval_secs),
            horizon_days: settings.live.horizon_days,
            refresh_handle: Mutex::new(None),
            shutdown,
        }
    }

    /// Attach an entity extraction collaborator
    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Current live status, lazily recomputed when absent or expired
    ///
    /// An expired status reads as offline until the next heartbeat; a status
    /// holding an expired reservation is reverted on the spot before being
    /// returned.
    pub async fn get_live_status(&self, expert_id: &str) -> Result<LiveStatus, LiveError> {
        let live_key = StateKey::live(expert_id);

        if let Some(raw) = self.store.get(&live_key).await? {
            match serde_json::from_str::<LiveStatus>(&raw) {
                Ok(status) => {
                    let Some(token) = status.active_reservation.clone() else {
                        return Ok(status);
                    };
                    if self
                        .store
                        .get(&StateKey::reservation(&token))
                        .await?
                        .is_some()
                    {
                        return Ok(status);
                    }
                    // Reservation record has expired; revert the hold now
                    self.arbiter.expire(expert_id, &token).await;
                    if let Some(raw) = self.store.get(&live_key).await? {
                        if let Ok(status) = serde_json::from_str::<LiveStatus>(&raw) {
                            return Ok(status);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("Corrupt live status for {}, recomputing: {}", expert_id, err);
                }
            }
        }

        self.materialize(expert_id, None).await
    }

    /// Record a presence heartbeat, refreshing the live status
    pub async fn record_heartbeat(&self, expert_id: &str) -> Result<LiveStatus, LiveError> {
        let live_key = StateKey::live(expert_id);
        let now = Utc::now();

        for _ in 0..HEARTBEAT_ATTEMPTS {
            let raw = self.store.get(&live_key).await?;
            let previous: Option<LiveStatus> = raw
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok());

            let updated = match &previous {
                // A live reservation owns the status word; only bump the heartbeat
                Some(prev) if prev.active_reservation.is_some() => LiveStatus {
                    last_heartbeat: Some(now),
                    ..prev.clone()
                },
                _ => {
                    let snapshot = self.workload.snapshot(expert_id, Some(now), now).await;
                    let next_available_slot = match previous.as_ref() {
                        Some(prev) if prev.next_available_slot.is_some() => {
                            prev.next_available_slot
                        }
                        _ => self.next_slot_best_effort(expert_id, now).await,
                    };
                    LiveStatus {
                        expert_id: expert_id.to_string(),
                        current_status: snapshot.status,
                        workload: snapshot.workload,
                        next_available_slot,
                        last_heartbeat: Some(now),
                        instant_booking_enabled: snapshot.instant_booking_enabled,
                        active_reservation: None,
                    }
                }
            };

            let updated_json = serde_json::to_string(&updated).map_err(StateStoreError::from)?;
            if self
                .store
                .compare_and_set(&live_key, raw.as_deref(), &updated_json, self.status_ttl)
                .await?
            {
                if let Some(prev) = previous {
                    if prev.current_status != updated.current_status {
                        self.publish_transition(&prev, &updated).await;
                    }
                }
                return Ok(updated);
            }
        }

        Err(LiveError::StateConflict(format!(
            "heartbeat for {} lost {} consecutive races",
            expert_id, HEARTBEAT_ATTEMPTS
        )))
    }

    /// Per-day free intervals over the next `days` days
    pub async fn get_availability_heatmap(
        &self,
        expert_id: &str,
        days: u32,
    ) -> Result<Vec<DayAvailability>, LiveError> {
        let record = self.cached_expert(expert_id).await?;
        self.availability.heatmap(&record, Utc::now(), days).await
    }

    /// Score and rank experts against the criteria
    ///
    /// Collaborator outages degrade to an empty report with a diagnostic;
    /// malformed criteria are rejected before any I/O.
    pub async fn match_experts(&self, criteria: &MatchCriteria) -> Result<MatchReport, LiveError> {
        criteria.validate()?;

        let criteria = self.resolve_criteria(criteria).await;

        let filter = ExpertFilter {
            expertise: criteria.required_expertise.clone(),
            location: criteria.location.clone(),
            limit: usize::from(criteria.limit) * 5,
        };
        let records = match self.profiles.list_active_experts(&filter).await {
            Ok(records) => records,
            Err(err) => {
                tracing::error!("Expert directory unavailable: {}", err);
                return Ok(MatchReport::degraded(format!(
                    "expert directory unavailable: {}",
                    err
                )));
            }
        };

        let mut candidates = Vec::with_capacity(records.len());
        for record in records {
            let live = match self.get_live_status(&record.expert_id).await {
                Ok(live) => live,
                Err(err) => {
                    tracing::warn!(
                        "Live status unavailable for {}, scoring as offline: {}",
                        record.expert_id,
                        err
                    );
                    LiveStatus::offline(record.expert_id.clone())
                }
            };
            candidates.push((record, live));
        }

        Ok(self.matcher.rank(&criteria, candidates))
    }

    /// Synchronously grant or reject an instant booking
    pub async fn request_instant_booking(
        &self,
        expert_id: &str,
        client_id: &str,
        duration_mins: u32,
    ) -> Result<BookingOutcome, LiveError> {
        // Materialize the status and sweep any expired reservation first, so
        // the arbiter always races against a live value
        self.get_live_status(expert_id).await?;

        Arc::clone(&self.arbiter)
            .reserve(expert_id, client_id, duration_mins)
            .await
    }

    /// Convert a reservation into a durable booking; returns the booking id
    pub async fn confirm_reservation(&self, token: &str) -> Result<String, LiveError> {
        self.arbiter.confirm(token).await
    }

    /// Release a reservation without booking
    pub async fn cancel_reservation(&self, token: &str) -> Result<(), LiveError> {
        self.arbiter.cancel(token).await
    }

    /// Schedule a pre-session reminder, keyed by booking id
    pub fn schedule_booking_reminder(
        &self,
        booking_id: impl Into<String>,
        expert_id: impl Into<String>,
        remind_in: Duration,
    ) {
        let booking_id = booking_id.into();
        let expert_id = expert_id.into();
        let publisher = Arc::clone(&self.publisher);
        let event_booking_id = booking_id.clone();

        self.timers.schedule(booking_id, remind_in, async move {
            publisher
                .publish(
                    TOPIC_BOOKING,
                    LiveEvent::BookingReminder {
                        booking_id: event_booking_id,
                        expert_id,
                    },
                )
                .await;
        });
    }

    /// Cancel a booking and revoke its pending reminder
    pub async fn cancel_booking(&self, booking_id: &str) -> Result<(), LiveError> {
        self.bookings.cancel_booking(booking_id).await?;
        self.timers.cancel(booking_id);
        Ok(())
    }

    /// Spawn the background recomputation loop
    pub fn start(self: Arc<Self>) {
        let service = Arc::clone(&self);
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => service.refresh_all().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::info!("Recomputation loop stopped");
        });

        let mut slot = self.refresh_handle.lock().expect("refresh handle poisoned");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Signal the loop to stop and wait for it, then drop all pending timers
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self
            .refresh_handle
            .lock()
            .expect("refresh handle poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.timers.shutdown();
    }

    /// One pass of the recomputation loop; per-expert failures are isolated
    async fn refresh_all(&self) {
        let experts = match self
            .profiles
            .list_active_experts(&ExpertFilter::default())
            .await
        {
            Ok(experts) => experts,
            Err(err) => {
                tracing::warn!("Skipping refresh pass, expert listing failed: {}", err);
                return;
            }
        };

        tracing::debug!("Refreshing live status for {} experts", experts.len());
        for record in experts {
            if let Err(err) = self.refresh_expert(&record).await {
                tracing::warn!("Refresh failed for {}: {}", record.expert_id, err);
            }
        }
    }

    async fn refresh_expert(&self, record: &ExpertRecord) -> Result<(), LiveError> {
        let live_key = StateKey::live(&record.expert_id);
        let raw = self.store.get(&live_key).await?;
        let previous: Option<LiveStatus> = raw
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok());

        if let Some(prev) = &previous {
            if let Some(token) = &prev.active_reservation {
                if self
                    .store
                    .get(&StateKey::reservation(token))
                    .await?
                    .is_some()
                {
                    // Live reservation owns this status; never overwrite it
                    return Ok(());
                }
                self.arbiter.expire(&record.expert_id, token).await;
                return Ok(());
            }
        }

        let now = Utc::now();
        let last_heartbeat = previous.as_ref().and_then(|p| p.last_heartbeat);
        let snapshot = self
            .workload
            .snapshot_for_record(record, last_heartbeat, now)
            .await;
        let next_available_slot = self.next_slot_best_effort(&record.expert_id, now).await;

        let updated = LiveStatus {
            expert_id: record.expert_id.clone(),
            current_status: snapshot.status,
            workload: snapshot.workload,
            next_available_slot,
            last_heartbeat,
            instant_booking_enabled: snapshot.instant_booking_enabled,
            active_reservation: None,
        };
        let updated_json = serde_json::to_string(&updated).map_err(StateStoreError::from)?;

        if !self
            .store
            .compare_and_set(&live_key, raw.as_deref(), &updated_json, self.status_ttl)
            .await?
        {
            // A reservation or heartbeat got in first; its value wins
            tracing::debug!("Refresh for {} lost a concurrent write", record.expert_id);
            return Ok(());
        }

        if let Some(prev) = previous {
            if prev.current_status != updated.current_status {
                self.publish_transition(&prev, &updated).await;
            }
        }
        Ok(())
    }

    /// First write of a live status for an expert nothing is known about
    async fn materialize(&self, expert_id: &str, last_heartbeat: Option<chrono::DateTime<Utc>>) -> Result<LiveStatus, LiveError> {
        let now = Utc::now();
        let snapshot = self.workload.snapshot(expert_id, last_heartbeat, now).await;
        let next_available_slot = self.next_slot_best_effort(expert_id, now).await;

        let status = LiveStatus {
            expert_id: expert_id.to_string(),
            current_status: snapshot.status,
            workload: snapshot.workload,
            next_available_slot,
            last_heartbeat,
            instant_booking_enabled: snapshot.instant_booking_enabled,
            active_reservation: None,
        };
        let status_json = serde_json::to_string(&status).map_err(StateStoreError::from)?;

        let live_key = StateKey::live(expert_id);
        if self
            .store
            .compare_and_set(&live_key, None, &status_json, self.status_ttl)
            .await?
        {
            return Ok(status);
        }

        // Lost the creation race; whatever won is fresher
        match self.store.get(&live_key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| LiveError::StaleState(format!("unreadable live status: {}", e))),
            None => Ok(status),
        }
    }

    async fn next_slot_best_effort(
        &self,
        expert_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> Option<chrono::DateTime<Utc>> {
        let record = self.cached_expert(expert_id).await.ok()?;
        match self.availability.free_slots(&record, now, self.horizon_days).await {
            Ok(free) => free.first().map(|slot| slot.start),
            Err(err) => {
                tracing::debug!("Next-slot search failed for {}: {}", expert_id, err);
                None
            }
        }
    }

    async fn cached_expert(&self, expert_id: &str) -> Result<ExpertRecord, LiveError> {
        if let Some(hit) = self.expert_cache.get(expert_id).await {
            return Ok(hit);
        }

        let record = retry_once("get_expert", || self.profiles.get_expert(expert_id)).await?;
        self.expert_cache
            .insert(expert_id.to_string(), record.clone())
            .await;
        Ok(record)
    }

    /// Fill in extracted tags when the request carries only free text
    async fn resolve_criteria(&self, criteria: &MatchCriteria) -> MatchCriteria {
        let mut resolved = criteria.clone();
        let needs_tags =
            resolved.required_expertise.is_empty() && resolved.preferred_expertise.is_empty();

        if let (true, Some(extractor), Some(text)) =
            (needs_tags, &self.extractor, resolved.request_text.as_deref())
        {
            match extractor.extract_tags(text).await {
                Ok(tags) if !tags.is_empty() => resolved.required_expertise = tags,
                Ok(_) => {}
                Err(err) => {
                    // Matcher falls back to the fixed keyword list
                    tracing::warn!("Entity extraction unavailable: {}", err);
                }
            }
        }

        resolved
    }

    async fn publish_transition(&self, previous: &LiveStatus, current: &LiveStatus) {
        self.publisher
            .publish(
                TOPIC_STATUS,
                LiveEvent::StatusChanged {
                    expert_id: current.expert_id.clone(),
                    previous: previous.current_status,
                    current: current.current_status,
                    workload: current.workload,
                },
            )
            .await;
    }
}
