use chrono::{DateTime, Duration, Utc};

use crate::models::ExpertStatus;

/// Workload above which instant booking is switched off
pub const INSTANT_BOOKING_WORKLOAD_CAP: u8 = 80;

/// Inputs for one status/workload derivation
#[derive(Debug, Clone, Copy)]
pub struct WorkloadInputs {
    pub active_engagements: u32,
    pub max_active_engagements: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub stale_threshold: Duration,
    /// Whether an engagement's time window contains `now`
    pub in_session_now: bool,
    pub now: DateTime<Utc>,
}

/// Derived status figures for one expert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    pub status: ExpertStatus,
    /// Always within 0-100, clamped against concurrent engagement-count drift
    pub workload: u8,
    pub instant_booking_enabled: bool,
}

/// Derive status, workload and instant-booking eligibility
pub fn compute_workload(inputs: &WorkloadInputs) -> WorkloadSnapshot {
    let ratio = if inputs.max_active_engagements == 0 {
        if inputs.active_engagements > 0 { 1.0 } else { 0.0 }
    } else {
        (f64::from(inputs.active_engagements) / f64::from(inputs.max_active_engagements)).min(1.0)
    };
    let workload = (ratio * 100.0).round().clamp(0.0, 100.0) as u8;

    let heartbeat_stale = match inputs.last_heartbeat {
        Some(seen) => inputs.now - seen > inputs.stale_threshold,
        None => true,
    };

    let status = if heartbeat_stale {
        ExpertStatus::Offline
    } else if inputs.in_session_now {
        ExpertStatus::InConsultation
    } else if inputs.max_active_engagements > 0
        && inputs.active_engagements >= inputs.max_active_engagements
    {
        ExpertStatus::Busy
    } else {
        ExpertStatus::Available
    };

    WorkloadSnapshot {
        status,
        workload,
        instant_booking_enabled: status == ExpertStatus::Available
            && workload < INSTANT_BOOKING_WORKLOAD_CAP,
    }
}

/// Conservative snapshot when the expert record cannot be read: never offer
/// an unknown-state expert for instant work
pub fn failsafe_offline() -> WorkloadSnapshot {
    WorkloadSnapshot {
        status: ExpertStatus::Offline,
        workload: 100,
        instant_booking_enabled: false,
    }
}
