use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::ExpertStatus;

/// Topic for expert presence transitions
pub const TOPIC_STATUS: &str = "live.status";
/// Topic for instant-booking lifecycle events
pub const TOPIC_BOOKING: &str = "live.booking";

/// Events published by the core to the outbound channel
///
/// Delivery is fire-and-forget; transport is a collaborator concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    StatusChanged {
        expert_id: String,
        previous: ExpertStatus,
        current: ExpertStatus,
        workload: u8,
    },
    ReservationGranted {
        expert_id: String,
        client_id: String,
        token: String,
        expires_at: DateTime<Utc>,
    },
    ReservationConfirmed {
        expert_id: String,
        token: String,
        booking_id: String,
    },
    ReservationCancelled {
        expert_id: String,
        token: String,
    },
    ReservationExpired {
        expert_id: String,
        token: String,
    },
    BookingReminder {
        booking_id: String,
        expert_id: String,
    },
}

impl LiveEvent {
    /// Default topic for this event kind
    pub fn topic(&self) -> &'static str {
        match self {
            LiveEvent::StatusChanged { .. } => TOPIC_STATUS,
            _ => TOPIC_BOOKING,
        }
    }
}
