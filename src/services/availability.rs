use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveTime, TimeZone, Utc};

use crate::core::schedule::{merge_slots, project_weekly_slots, subtract_busy};
use crate::error::LiveError;
use crate::models::{DayAvailability, ExpertRecord, TimeSlot};
use crate::services::repos::{retry_once, BookingRepository};

/// Default planning horizon in days
pub const DEFAULT_HORIZON_DAYS: u32 = 7;

/// Computes an expert's free/busy time slots
///
/// Merges declared weekly availability (by union, tolerating overlapping
/// source data) with confirmed engagements from the booking collaborator.
/// Pure read: no state is mutated anywhere.
pub struct AvailabilityScheduler {
    bookings: Arc<dyn BookingRepository>,
}

impl AvailabilityScheduler {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }

    /// Ordered, non-overlapping free intervals within
    /// `[from, from + horizon_days)`
    ///
    /// An expert with zero declared slots yields an empty sequence, without
    /// touching the booking collaborator.
    pub async fn free_slots(
        &self,
        expert: &ExpertRecord,
        from: DateTime<Utc>,
        horizon_days: u32,
    ) -> Result<Vec<TimeSlot>, LiveError> {
        let declared = project_weekly_slots(&expert.weekly_slots, from, horizon_days);
        if declared.is_empty() {
            return Ok(Vec::new());
        }

        let window = TimeSlot::new(from, from + Duration::days(i64::from(horizon_days)));
        let expert_id = expert.expert_id.clone();
        let bookings = retry_once("list_confirmed_bookings", || {
            self.bookings.list_confirmed_bookings(&expert_id, &window)
        })
        .await?;

        let busy: Vec<TimeSlot> = bookings
            .iter()
            .filter(|b| b.status.blocks_calendar())
            .map(|b| TimeSlot::new(b.start, b.end))
            .collect();

        Ok(subtract_busy(declared, busy))
    }

    /// Free intervals grouped per calendar day (UTC), `days` days ahead
    pub async fn heatmap(
        &self,
        expert: &ExpertRecord,
        from: DateTime<Utc>,
        days: u32,
    ) -> Result<Vec<DayAvailability>, LiveError> {
        let free = self.free_slots(expert, from, days).await?;
        let mut heatmap = Vec::with_capacity(days as usize);

        for offset in 0..u64::from(days) {
            let date = from.date_naive() + Days::new(offset);
            let day_start = Utc
                .from_utc_datetime(&date.and_time(NaiveTime::MIN));
            let day = TimeSlot::new(day_start, day_start + Duration::days(1));

            let in_day: Vec<TimeSlot> = free
                .iter()
                .filter(|slot| slot.overlaps(&day))
                .map(|slot| TimeSlot::new(slot.start.max(day.start), slot.end.min(day.end)))
                .collect();

            heatmap.push(DayAvailability {
                date,
                free: merge_slots(in_day),
            });
        }

        Ok(heatmap)
    }

    /// Start of the first free interval within the default horizon
    pub async fn next_available_slot(
        &self,
        expert: &ExpertRecord,
        from: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LiveError> {
        let free = self.free_slots(expert, from, DEFAULT_HORIZON_DAYS).await?;
        Ok(free.first().map(|slot| slot.start))
    }
}
