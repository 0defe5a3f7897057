//! Savoro Live - live availability and matching core for the Savoro
//! expert marketplace
//!
//! This library computes real-time expert availability, ranks experts
//! against consultation requests, and arbitrates instant bookings through
//! an atomic compare-and-set over a shared state store.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{init_tracing, Settings};
pub use core::{effective_tags, Matcher};
pub use error::LiveError;
pub use models::{
    BookingOutcome, DayAvailability, ExpertRecord, ExpertStatus, LiveStatus, MatchCriteria,
    MatchReport, MatchResult, ScoringWeights,
};
pub use services::{
    AvailabilityScheduler, EventPublisher, InMemoryStateStore, InstantBookingArbiter, LiveService,
    RedisStateStore, StateStore, WorkloadCalculator,
};
