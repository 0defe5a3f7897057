use crate::core::{keywords::extract_keywords, scoring::score_expert};
use crate::models::{
    AvailabilitySnapshot, ExpertRecord, LiveStatus, MatchCriteria, MatchReport, MatchResult,
    ScoringWeights,
};

/// Candidates scoring below this are discarded
pub const SCORE_FLOOR: f64 = 50.0;

/// Assumed engagement length per complexity point, for the cost estimate
const HOURS_PER_COMPLEXITY: f64 = 1.5;

/// Ranks candidate experts against request criteria
///
/// Pure function over externally supplied snapshots: deterministic for
/// identical inputs, safely reentrant, no I/O.
#[derive(Debug, Clone)]
pub struct Matcher {
    weights: ScoringWeights,
}

impl Matcher {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn with_default_weights() -> Self {
        Self {
            weights: ScoringWeights::default(),
        }
    }

    /// Score, filter and rank candidates
    ///
    /// Ties are broken by higher rating, then lower workload, then expert id,
    /// so identical inputs always produce identical ordered output.
    pub fn rank(
        &self,
        criteria: &MatchCriteria,
        candidates: Vec<(ExpertRecord, LiveStatus)>,
    ) -> MatchReport {
        let total_candidates = candidates.len();
        let wanted_tags = effective_tags(criteria);

        let mut scored: Vec<(MatchResult, f64, u8)> = candidates
            .into_iter()
            .filter(|(record, _)| record.is_active)
            .filter(|(record, _)| location_compatible(record, criteria))
            .filter_map(|(record, live)| {
                let (score, reasons) =
                    score_expert(&record, &live, criteria, &wanted_tags, &self.weights);
                if score < SCORE_FLOOR {
                    return None;
                }

                let estimated_cost = record.hourly_rate.midpoint()
                    * f64::from(criteria.complexity)
                    * HOURS_PER_COMPLEXITY;

                let result = MatchResult {
                    expert_id: record.expert_id.clone(),
                    name: record.name.clone(),
                    score,
                    match_reasons: reasons,
                    availability: AvailabilitySnapshot::from(&live),
                    estimated_cost: Some(estimated_cost),
                };
                Some((result, record.rating_average, live.workload))
            })
            .collect();

        scored.sort_by(|(a, a_rating, a_workload), (b, b_rating, b_workload)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b_rating
                        .partial_cmp(a_rating)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a_workload.cmp(b_workload))
                .then_with(|| a.expert_id.cmp(&b.expert_id))
        });

        let mut matches: Vec<MatchResult> = scored.into_iter().map(|(r, _, _)| r).collect();
        matches.truncate(criteria.limit as usize);

        MatchReport {
            matches,
            total_candidates,
            diagnostic: None,
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_default_weights()
    }
}

/// Lowercased, deduplicated union of required and preferred expertise
///
/// When the request carries no explicit tags, tags are derived from the
/// free-form text through the fixed food-industry keyword list.
pub fn effective_tags(criteria: &MatchCriteria) -> Vec<String> {
    let mut tags: Vec<String> = criteria
        .required_expertise
        .iter()
        .chain(criteria.preferred_expertise.iter())
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if tags.is_empty() {
        if let Some(text) = criteria.request_text.as_deref() {
            tags = extract_keywords(text);
        }
    }

    tags.sort();
    tags.dedup();
    tags
}

fn location_compatible(record: &ExpertRecord, criteria: &MatchCriteria) -> bool {
    match (&criteria.location, &record.location) {
        (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
        // Unknown expert location is not held against the expert
        _ => true,
    }
}
