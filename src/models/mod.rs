// Model exports
pub mod criteria;
pub mod domain;
pub mod events;

pub use criteria::MatchCriteria;
pub use domain::{
    AvailabilitySnapshot, Booking, BookingOutcome, BookingReservation, BookingStatus,
    DayAvailability, ExpertRecord, ExpertStatus, ExpertiseTag, LiveStatus, MatchReport,
    MatchResult, RateRange, RejectionReason, ScoringWeights, TimeSlot, Urgency, WeeklySlot,
};
pub use events::{LiveEvent, TOPIC_BOOKING, TOPIC_STATUS};
