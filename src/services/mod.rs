pub mod availability;
pub mod booking;
pub mod live;
pub mod publisher;
pub mod redis_store;
pub mod repos;
pub mod state_store;
pub mod timers;
pub mod workload;

pub use availability::{AvailabilityScheduler, DEFAULT_HORIZON_DAYS};
pub use booking::InstantBookingArbiter;
pub use live::{EntityExtractor, LiveService};
pub use publisher::{EventPublisher, NoopPublisher};
pub use redis_store::RedisStateStore;
pub use repos::{BookingRepository, ExpertFilter, ProfileRepository, RepoError};
pub use state_store::{InMemoryStateStore, StateKey, StateStore, StateStoreError};
pub use timers::TaskScheduler;
pub use workload::WorkloadCalculator;
