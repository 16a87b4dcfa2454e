pub mod clock;
pub mod events;
pub mod notification;
pub mod payment;
pub mod repository;

use busline_shared::{BookingStatus, ScheduleStatus};
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::EventSink;
pub use notification::{DispatchError, EmailMessage, NotificationDispatcher};
pub use payment::PaymentSignal;
pub use repository::{
    BookingRepository, LockRequest, ScheduleRepository, SeatLockRepository, Store, Transition,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Seats unavailable: {0:?}")]
    SeatConflict(Vec<u32>),
    #[error("Session does not hold locks on seats: {0:?}")]
    LockNotHeld(Vec<u32>),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Booking {id} is {current}")]
    StatusMismatch { id: Uuid, current: BookingStatus },
    #[error("Schedule {id} is {current}")]
    ScheduleStatusMismatch { id: Uuid, current: ScheduleStatus },
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound { entity, id: id.to_string() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
