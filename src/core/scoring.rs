use crate::models::{ExpertRecord, ExpertStatus, LiveStatus, MatchCriteria, ScoringWeights};

/// Caps for the experience factor
const YEARS_CAP: f64 = 20.0;
const COMPLETED_CAP: f64 = 100.0;
const CERTIFICATION_CAP: f64 = 10.0;

/// Calculate a match score (0-100) for an expert against request criteria
///
/// Scoring formula (weights sum to 1.0):
/// ```text
/// score = (
///     expertise_factor    * 0.40 +   # fraction of wanted tags covered
///     price_factor        * 0.20 +   # rate midpoint close to budget midpoint
///     rating_factor       * 0.15 +   # ratingAverage / 5
///     experience_factor   * 0.15 +   # years + engagements + certifications
///     availability_factor * 0.10     # can start now, when urgency demands it
/// ) * 100
/// ```
///
/// `wanted_tags` is the lowercased union of required and preferred expertise
/// (already resolved through keyword fallback by the matcher). Returns the
/// score and the human-readable reasons behind it.
pub fn score_expert(
    record: &ExpertRecord,
    live: &LiveStatus,
    criteria: &MatchCriteria,
    wanted_tags: &[String],
    weights: &ScoringWeights,
) -> (f64, Vec<String>) {
    let mut reasons = Vec::new();

    // Expertise coverage
    let matched: Vec<&str> = wanted_tags
        .iter()
        .filter(|t| record.has_tag(t))
        .map(String::as_str)
        .collect();
    let expertise_factor = if wanted_tags.is_empty() {
        0.0
    } else {
        matched.len() as f64 / wanted_tags.len() as f64
    };
    if !matched.is_empty() {
        reasons.push(format!(
            "Covers {} of {} requested expertise areas ({})",
            matched.len(),
            wanted_tags.len(),
            matched.join(", ")
        ));
    }

    // Price fit
    let price_factor = match criteria.budget_midpoint() {
        None => {
            reasons.push("No budget constraint".to_string());
            1.0
        }
        Some(budget_mid) if budget_mid <= 0.0 => 0.0,
        Some(budget_mid) => {
            let rate_mid = record.hourly_rate.midpoint();
            let relative_distance = (rate_mid - budget_mid).abs() / budget_mid;
            let factor = (1.0 - relative_distance).clamp(0.0, 1.0);
            if factor >= 0.75 {
                reasons.push(format!("Rate {:.0}/h fits the requested budget", rate_mid));
            }
            factor
        }
    };

    // Rating
    let rating_factor = (record.rating_average / 5.0).clamp(0.0, 1.0);
    if record.rating_average >= 4.0 {
        reasons.push(format!("Highly rated ({:.1}/5)", record.rating_average));
    }

    // Experience: capped years, completed engagements and certifications
    let experience_factor = 0.5 * (f64::from(record.max_years()).min(YEARS_CAP) / YEARS_CAP)
        + 0.3 * (f64::from(record.completed_engagements).min(COMPLETED_CAP) / COMPLETED_CAP)
        + 0.2 * (f64::from(record.certification_count).min(CERTIFICATION_CAP) / CERTIFICATION_CAP);
    if record.max_years() >= 5 {
        reasons.push(format!(
            "{}+ years of experience, {} completed engagements",
            record.max_years(),
            record.completed_engagements
        ));
    }

    // Availability for urgency
    let availability_factor = if criteria.urgency.is_elevated() {
        let can_start_now = live.current_status == ExpertStatus::Available
            || (live.current_status == ExpertStatus::InConsultation && live.workload < 80);
        if can_start_now {
            reasons.push("Can start immediately".to_string());
            1.0
        } else {
            0.0
        }
    } else {
        1.0
    };

    let score = (expertise_factor * weights.expertise
        + price_factor * weights.price
        + rating_factor * weights.rating
        + experience_factor * weights.experience
        + availability_factor * weights.availability)
        * 100.0;

    (score.clamp(0.0, 100.0), reasons)
}
