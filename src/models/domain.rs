use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Expert profile as owned by the profile subsystem (read-only here)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertRecord {
    #[serde(rename = "expertId")]
    pub expert_id: String,
    pub name: String,
    #[serde(rename = "weeklySlots", default)]
    pub weekly_slots: Vec<WeeklySlot>,
    #[serde(rename = "hourlyRate")]
    pub hourly_rate: RateRange,
    #[serde(default)]
    pub expertise: Vec<ExpertiseTag>,
    #[serde(rename = "ratingAverage", default)]
    pub rating_average: f64,
    #[serde(rename = "responseTimeHours", default)]
    pub response_time_hours: f64,
    #[serde(rename = "activeEngagements", default)]
    pub active_engagements: u32,
    #[serde(rename = "completedEngagements", default)]
    pub completed_engagements: u32,
    #[serde(rename = "certificationCount", default)]
    pub certification_count: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
}

impl ExpertRecord {
    /// Case-insensitive check for an expertise tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.expertise
            .iter()
            .any(|t| t.tag.eq_ignore_ascii_case(tag))
    }

    /// Highest years-of-experience across the expert's tags
    pub fn max_years(&self) -> u8 {
        self.expertise.iter().map(|t| t.years).max().unwrap_or(0)
    }
}

fn default_true() -> bool {
    true
}

/// A declared weekly availability slot
///
/// `end <= start` means the slot wraps past midnight into the next day.
/// Slots on the same day may overlap in source data; the scheduler merges
/// them by union instead of rejecting the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// IANA timezone name, e.g. "Europe/Berlin"
    pub timezone: String,
}

/// Hourly rate range
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateRange {
    pub min: f64,
    pub max: f64,
}

impl RateRange {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Expertise tag with years of experience
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertiseTag {
    pub tag: String,
    #[serde(default)]
    pub years: u8,
}

/// Discrete live presence status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertStatus {
    Available,
    Busy,
    InConsultation,
    Offline,
}

/// Ephemeral, TTL-bound live status for one expert
///
/// Held as a JSON value in the state store under `live:{expert_id}` and
/// mutated exclusively through compare-and-set. `active_reservation` carries
/// the token of the instant-booking reservation currently holding the
/// expert, so concurrent writers can tell a live hold from a stale value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    #[serde(rename = "expertId")]
    pub expert_id: String,
    #[serde(rename = "currentStatus")]
    pub current_status: ExpertStatus,
    /// Bounded capacity figure, 0-100
    pub workload: u8,
    #[serde(rename = "nextAvailableSlot", default)]
    pub next_available_slot: Option<DateTime<Utc>>,
    #[serde(rename = "lastHeartbeat", default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(rename = "instantBookingEnabled")]
    pub instant_booking_enabled: bool,
    #[serde(rename = "activeReservation", default)]
    pub active_reservation: Option<String>,
}

impl LiveStatus {
    /// Conservative fallback when nothing is known about the expert
    pub fn offline(expert_id: impl Into<String>) -> Self {
        Self {
            expert_id: expert_id.into(),
            current_status: ExpertStatus::Offline,
            workload: 100,
            next_available_slot: None,
            last_heartbeat: None,
            instant_booking_enabled: false,
            active_reservation: None,
        }
    }

    /// `instant_booking_enabled` is only ever true for an available expert
    /// under the workload cap
    pub fn invariant_holds(&self) -> bool {
        !self.instant_booking_enabled
            || (self.current_status == ExpertStatus::Available && self.workload < 80)
    }
}

/// Half-open interval of absolute time `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Free intervals for a single calendar day, as returned by the heatmap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub free: Vec<TimeSlot>,
}

/// Request urgency level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// High and critical requests demand an expert who can start now
    pub fn is_elevated(&self) -> bool {
        matches!(self, Urgency::High | Urgency::Critical)
    }
}

/// Snapshot of an expert's availability attached to a match result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    pub status: ExpertStatus,
    pub workload: u8,
    #[serde(rename = "nextAvailableSlot", default)]
    pub next_available_slot: Option<DateTime<Utc>>,
}

impl From<&LiveStatus> for AvailabilitySnapshot {
    fn from(live: &LiveStatus) -> Self {
        Self {
            status: live.current_status,
            workload: live.workload,
            next_available_slot: live.next_available_slot,
        }
    }
}

/// One scored candidate in a ranked match response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "expertId")]
    pub expert_id: String,
    pub name: String,
    /// Weighted score, 0-100
    pub score: f64,
    #[serde(rename = "matchReasons")]
    pub match_reasons: Vec<String>,
    pub availability: AvailabilitySnapshot,
    #[serde(rename = "estimatedCost")]
    pub estimated_cost: Option<f64>,
}

/// Ranked matches plus a diagnostic when matching had to degrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub matches: Vec<MatchResult>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
    #[serde(default)]
    pub diagnostic: Option<String>,
}

impl MatchReport {
    /// Empty result carrying the reason matching could not run
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            matches: Vec::new(),
            total_candidates: 0,
            diagnostic: Some(reason.into()),
        }
    }
}

/// Short-lived exclusive hold on an expert's instant-booking eligibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReservation {
    pub token: String,
    #[serde(rename = "expertId")]
    pub expert_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "requestedStart")]
    pub requested_start: DateTime<Utc>,
    #[serde(rename = "durationMins")]
    pub duration_mins: u32,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

/// Outcome of an instant-booking request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    Granted { token: String },
    Rejected { reason: RejectionReason },
}

/// Why an instant-booking request was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The expert is not currently eligible, or another reservation won the race
    ExpertUnavailable,
    /// The requested duration is zero or otherwise unusable
    InvalidRequest,
}

/// Confirmed booking as seen through the booking collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "bookingId")]
    pub booking_id: String,
    #[serde(rename = "expertId")]
    pub expert_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Whether this booking occupies the expert's calendar
    pub fn blocks_calendar(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::InProgress)
    }
}

/// Scoring weights (must sum to 1.0)
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub expertise: f64,
    pub price: f64,
    pub rating: f64,
    pub experience: f64,
    pub availability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            expertise: 0.40,
            price: 0.20,
            rating: 0.15,
            experience: 0.15,
            availability: 0.10,
        }
    }
}
