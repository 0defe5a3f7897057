// Core algorithm exports
pub mod keywords;
pub mod matcher;
pub mod schedule;
pub mod scoring;
pub mod workload;

pub use keywords::{extract_keywords, FOOD_INDUSTRY_KEYWORDS};
pub use matcher::{effective_tags, Matcher, SCORE_FLOOR};
pub use schedule::{merge_slots, project_weekly_slots, subtract_busy};
pub use scoring::score_expert;
pub use workload::{
    compute_workload, failsafe_offline, WorkloadInputs, WorkloadSnapshot,
    INSTANT_BOOKING_WORKLOAD_CAP,
};
