pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod notifier;
pub mod policy;
pub mod reference;
pub mod schedules;
pub mod seats;
pub mod sweeper;

pub use error::BookingError;
pub use events::{ChannelSink, EventBus};
pub use manager::{Actor, BookingManager, CreateBooking, CustomerProfile};
pub use metrics::BookingMetrics;
pub use notifier::NotificationService;
pub use policy::BookingPolicy;
pub use schedules::ScheduleManager;
pub use seats::SeatLockManager;
pub use sweeper::{SweepDuty, SweepReport, Sweeper};

#[cfg(test)]
pub(crate) mod testing;
