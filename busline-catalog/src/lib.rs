pub mod pricing;
pub mod schedule;

pub use pricing::{PricingConfig, PricingEngine};
pub use schedule::{NewSchedule, ScheduleError};
