//! Fallback keyword extraction for free-form request text.
//!
//! When a request arrives without explicit expertise tags and the entity
//! extraction collaborator is unavailable, the matching engine scans the
//! request text against this fixed food-industry vocabulary instead of
//! failing the request.

/// Fixed food-industry vocabulary, lowercase, ordered for deterministic output
pub const FOOD_INDUSTRY_KEYWORDS: &[&str] = &[
    "haccp",
    "food safety",
    "hygiene",
    "allergen",
    "labeling",
    "quality audit",
    "cold chain",
    "supply chain",
    "sourcing",
    "packaging",
    "menu",
    "costing",
    "nutrition",
    "catering",
    "kitchen design",
    "franchising",
    "pastry",
    "baking",
    "fermentation",
    "brewing",
    "butchery",
    "dairy",
    "seafood",
    "sommelier",
    "organic",
];

/// Extract known keywords from free-form text (case-insensitive substring
/// match, vocabulary order, no duplicates)
pub fn extract_keywords(text: &str) -> Vec<String> {
    let haystack = text.to_lowercase();
    FOOD_INDUSTRY_KEYWORDS
        .iter()
        .filter(|kw| haystack.contains(*kw))
        .map(|kw| (*kw).to_string())
        .collect()
}
