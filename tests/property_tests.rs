// Property-based checks for the pure core invariants

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use savoro_live::core::{
    compute_workload, merge_slots, score_expert, subtract_busy, WorkloadInputs,
    INSTANT_BOOKING_WORKLOAD_CAP,
};
use savoro_live::models::{
    ExpertRecord, ExpertStatus, ExpertiseTag, LiveStatus, MatchCriteria, RateRange, ScoringWeights,
    TimeSlot, Urgency,
};
use savoro_live::Matcher;

fn base() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 7, 0, 0, 0).unwrap()
}

/// Slots as minute offsets from a fixed origin, any order, possibly empty
fn arb_slots(max_len: usize) -> impl Strategy<Value = Vec<TimeSlot>> {
    prop::collection::vec((0i64..10_000, 0i64..10_000), 0..max_len).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(a, b)| {
                TimeSlot::new(
                    base() + Duration::minutes(a.min(b)),
                    base() + Duration::minutes(a.max(b)),
                )
            })
            .collect()
    })
}

fn arb_record() -> impl Strategy<Value = ExpertRecord> {
    (
        0u32..20,
        0u32..500,
        0u32..50,
        0.0f64..=5.0,
        1.0f64..500.0,
        0u8..40,
    )
        .prop_map(|(active, completed, certs, rating, rate, years)| ExpertRecord {
            expert_id: "e1".to_string(),
            name: "Expert".to_string(),
            weekly_slots: vec![],
            hourly_rate: RateRange { min: rate, max: rate + 20.0 },
            expertise: vec![ExpertiseTag { tag: "haccp".to_string(), years }],
            rating_average: rating,
            response_time_hours: 2.0,
            active_engagements: active,
            completed_engagements: completed,
            certification_count: certs,
            location: None,
            is_active: true,
        })
}

proptest! {
    #[test]
    fn prop_workload_is_bounded(
        active in 0u32..1000,
        max in 0u32..50,
        heartbeat_age_mins in proptest::option::of(0i64..10_000),
        in_session in any::<bool>(),
    ) {
        let now = base();
        let snapshot = compute_workload(&WorkloadInputs {
            active_engagements: active,
            max_active_engagements: max,
            last_heartbeat: heartbeat_age_mins.map(|age| now - Duration::minutes(age)),
            stale_threshold: Duration::minutes(30),
            in_session_now: in_session,
            now,
        });

        prop_assert!(snapshot.workload <= 100);
        if snapshot.instant_booking_enabled {
            prop_assert_eq!(snapshot.status, ExpertStatus::Available);
            prop_assert!(snapshot.workload < INSTANT_BOOKING_WORKLOAD_CAP);
        }
    }

    #[test]
    fn prop_merge_is_sorted_and_non_overlapping(slots in arb_slots(30)) {
        let merged = merge_slots(slots.clone());

        for pair in merged.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
        // Union is preserved: every input interval sits inside one merged interval
        for slot in slots.iter().filter(|s| !s.is_empty()) {
            prop_assert!(merged
                .iter()
                .any(|m| m.start <= slot.start && slot.end <= m.end));
        }
    }

    #[test]
    fn prop_subtraction_never_returns_busy_time(
        free in arb_slots(10),
        busy in arb_slots(10),
    ) {
        let free = merge_slots(free);
        let result = subtract_busy(free.clone(), busy.clone());

        for slot in &result {
            prop_assert!(!slot.is_empty());
            for b in &busy {
                prop_assert!(!slot.overlaps(b));
            }
            // Nothing outside the original free time is invented
            prop_assert!(free
                .iter()
                .any(|f| f.start <= slot.start && slot.end <= f.end));
        }
    }

    #[test]
    fn prop_score_is_bounded(
        record in arb_record(),
        workload in 0u8..=100,
        budget in proptest::option::of(1.0f64..500.0),
        urgency_elevated in any::<bool>(),
    ) {
        let live = LiveStatus {
            expert_id: "e1".to_string(),
            current_status: ExpertStatus::Available,
            workload,
            next_available_slot: None,
            last_heartbeat: Some(base()),
            instant_booking_enabled: false,
            active_reservation: None,
        };
        let criteria = MatchCriteria {
            required_expertise: vec!["haccp".to_string()],
            budget_min: budget,
            budget_max: budget.map(|b| b + 40.0),
            urgency: if urgency_elevated { Urgency::High } else { Urgency::Low },
            ..Default::default()
        };
        let wanted = vec!["haccp".to_string()];

        let (score, _) = score_expert(
            &record,
            &live,
            &criteria,
            &wanted,
            &ScoringWeights::default(),
        );

        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn prop_ranking_is_sorted_and_within_limit(
        ratings in prop::collection::vec(0.0f64..=5.0, 1..20),
        limit in 1u16..10,
    ) {
        let matcher = Matcher::with_default_weights();
        let candidates: Vec<(ExpertRecord, LiveStatus)> = ratings
            .iter()
            .enumerate()
            .map(|(i, &rating)| {
                let record = ExpertRecord {
                    expert_id: format!("e{}", i),
                    name: format!("Expert {}", i),
                    weekly_slots: vec![],
                    hourly_rate: RateRange { min: 90.0, max: 110.0 },
                    expertise: vec![ExpertiseTag { tag: "haccp".to_string(), years: 10 }],
                    rating_average: rating,
                    response_time_hours: 2.0,
                    active_engagements: 1,
                    completed_engagements: 50,
                    certification_count: 5,
                    location: None,
                    is_active: true,
                };
                let live = LiveStatus {
                    expert_id: format!("e{}", i),
                    current_status: ExpertStatus::Available,
                    workload: 20,
                    next_available_slot: None,
                    last_heartbeat: Some(base()),
                    instant_booking_enabled: true,
                    active_reservation: None,
                };
                (record, live)
            })
            .collect();
        let criteria = MatchCriteria {
            required_expertise: vec!["haccp".to_string()],
            budget_min: Some(80.0),
            budget_max: Some(120.0),
            limit,
            ..Default::default()
        };

        let report = matcher.rank(&criteria, candidates);

        prop_assert!(report.matches.len() <= usize::from(limit));
        for pair in report.matches.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }
}
