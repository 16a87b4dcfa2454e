pub mod models;
pub mod pii;

pub use models::booking::{Booking, BookingStatus, ContactInfo, Gender, Passenger, PriceBreakdown};
pub use models::events::{BookingEvent, EventKind};
pub use models::schedule::{Schedule, ScheduleStatus};
pub use models::seat::{ScheduleAvailability, SeatAvailability, SeatLock, SeatState};
pub use pii::Masked;
