use chrono::{DateTime, Datelike, Days, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{TimeSlot, WeeklySlot};

/// Project declared weekly slots onto an absolute time window
///
/// Returns merged, ordered, non-overlapping intervals clipped to
/// `[from, from + horizon_days)`. A slot whose end is not after its start
/// wraps past midnight and is split into two same-day intervals before
/// merging. Unknown timezone names fall back to UTC.
pub fn project_weekly_slots(
    slots: &[WeeklySlot],
    from: DateTime<Utc>,
    horizon_days: u32,
) -> Vec<TimeSlot> {
    let window = TimeSlot::new(from, from + Duration::days(i64::from(horizon_days)));
    let mut projected = Vec::new();

    for slot in slots {
        let tz: Tz = slot.timezone.parse().unwrap_or_else(|_| {
            tracing::debug!("Unknown timezone '{}', assuming UTC", slot.timezone);
            Tz::UTC
        });

        // Walk one local day beyond each window edge so that timezone offsets
        // and midnight wraps cannot drop an interval.
        let first_date = from.with_timezone(&tz).date_naive() - Days::new(1);

        for offset in 0..=(u64::from(horizon_days) + 2) {
            let date = first_date + Days::new(offset);
            if date.weekday() != slot.weekday {
                continue;
            }

            let spans_midnight = slot.end <= slot.start;
            let parts: Vec<(chrono::NaiveDateTime, chrono::NaiveDateTime)> = if spans_midnight {
                let next = date + Days::new(1);
                let midnight = next.and_time(chrono::NaiveTime::MIN);
                vec![
                    (date.and_time(slot.start), midnight),
                    (midnight, next.and_time(slot.end)),
                ]
            } else {
                vec![(date.and_time(slot.start), date.and_time(slot.end))]
            };

            for (local_start, local_end) in parts {
                let (Some(start), Some(end)) = (
                    tz.from_local_datetime(&local_start).earliest(),
                    tz.from_local_datetime(&local_end).earliest(),
                ) else {
                    // Local time skipped by a DST transition
                    continue;
                };

                let candidate = TimeSlot::new(start.with_timezone(&Utc), end.with_timezone(&Utc));
                if let Some(clipped) = clip(candidate, &window) {
                    projected.push(clipped);
                }
            }
        }
    }

    merge_slots(projected)
}

/// Merge a set of intervals by union, returning them sorted and non-overlapping
pub fn merge_slots(mut slots: Vec<TimeSlot>) -> Vec<TimeSlot> {
    slots.retain(|s| !s.is_empty());
    slots.sort_by_key(|s| (s.start, s.end));

    let mut merged: Vec<TimeSlot> = Vec::with_capacity(slots.len());
    for slot in slots {
        match merged.last_mut() {
            Some(last) if slot.start <= last.end => {
                last.end = last.end.max(slot.end);
            }
            _ => merged.push(slot),
        }
    }
    merged
}

/// Subtract busy intervals from free intervals
///
/// `free` must be sorted and non-overlapping (the output of `merge_slots`);
/// `busy` may be arbitrary and is merged internally.
pub fn subtract_busy(free: Vec<TimeSlot>, busy: Vec<TimeSlot>) -> Vec<TimeSlot> {
    let busy = merge_slots(busy);
    let mut result = Vec::with_capacity(free.len());

    for slot in free {
        let mut cursor = slot.start;
        for b in busy.iter().filter(|b| b.overlaps(&slot)) {
            if b.start > cursor {
                result.push(TimeSlot::new(cursor, b.start.min(slot.end)));
            }
            cursor = cursor.max(b.end);
            if cursor >= slot.end {
                break;
            }
        }
        if cursor < slot.end {
            result.push(TimeSlot::new(cursor, slot.end));
        }
    }

    result
}

fn clip(slot: TimeSlot, window: &TimeSlot) -> Option<TimeSlot> {
    let clipped = TimeSlot::new(slot.start.max(window.start), slot.end.min(window.end));
    (!clipped.is_empty()).then_some(clipped)
}
