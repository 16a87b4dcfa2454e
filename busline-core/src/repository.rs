use async_trait::async_trait;
use busline_shared::{Booking, BookingStatus, Schedule, ScheduleStatus, SeatLock};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::StoreResult;

/// Seats a session wants to hold on one schedule.
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<u32>,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Conditional status change on one booking.
///
/// Applied only when the current status is one of `from`; otherwise the store reports
/// `StatusMismatch` with the status it found.
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking_id: Uuid,
    pub from: Vec<BookingStatus>,
    pub to: BookingStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Drop the booking's seat claims in the same transaction
    pub release_seats: bool,
}

/// Repository trait for schedule data access
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>>;

    async fn list_schedules(&self, status: Option<ScheduleStatus>) -> StoreResult<Vec<Schedule>>;

    async fn set_schedule_status(&self, id: Uuid, status: ScheduleStatus) -> StoreResult<Schedule>;

    /// Scheduled trips whose departure time has passed become in progress. Returns them.
    async fn start_departed_schedules(&self, now: DateTime<Utc>) -> StoreResult<Vec<Schedule>>;
}

/// Repository trait for seat locks.
///
/// Implementations enforce at most one lock row per (schedule, seat) at the storage level
/// so that two processes racing for the same seat cannot both succeed.
#[async_trait]
pub trait SeatLockRepository: Send + Sync {
    /// All-or-nothing: either every requested seat is locked (or refreshed, when the same
    /// session already holds it) or nothing is written and `SeatConflict` lists every seat
    /// held by another session's unexpired lock or by an active booking.
    async fn acquire_locks(&self, request: &LockRequest, now: DateTime<Utc>) -> StoreResult<Vec<SeatLock>>;

    async fn release_locks(&self, schedule_id: Uuid, session_id: &str) -> StoreResult<u64>;

    /// Move the expiry of the session's unexpired locks. Returns the refreshed locks.
    async fn extend_locks(
        &self,
        schedule_id: Uuid,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SeatLock>>;

    /// Unexpired locks only
    async fn active_locks(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<SeatLock>>;

    /// Seats claimed by active (pending or confirmed) bookings
    async fn booked_seats(&self, schedule_id: Uuid) -> StoreResult<Vec<u32>>;

    async fn purge_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a pending booking, claim its seats and consume the session's locks on them,
    /// in one transaction. Fails with `LockNotHeld` when the session does not hold an
    /// unexpired lock on every seat, `SeatConflict` when an active booking already claims one.
    async fn create_booking(&self, booking: &Booking, now: DateTime<Utc>) -> StoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn get_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>>;

    async fn list_bookings_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Booking>>;

    async fn list_bookings_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Booking>>;

    async fn transition_booking(&self, transition: &Transition) -> StoreResult<Booking>;

    /// Pending bookings created at or before `created_before` become expired, seats released.
    async fn expire_pending(&self, created_before: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// Mark the schedule completed and move its confirmed bookings to completed.
    /// A cancelled schedule is left alone (`ScheduleStatusMismatch`).
    async fn complete_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// Mark the schedule cancelled and cancel its active bookings, releasing their seats.
    /// A completed schedule is left alone (`ScheduleStatusMismatch`).
    async fn cancel_schedule(&self, schedule_id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// Confirmed bookings with a future departure inside their reminder lead window and
    /// no reminder sent yet.
    async fn due_reminders(&self, now: DateTime<Utc>, default_lead_minutes: i64) -> StoreResult<Vec<Booking>>;

    /// Stamp `reminder_sent_at` if it is still unset. Returns false when someone else got there first.
    async fn mark_reminder_sent(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    async fn clear_reminder_mark(&self, booking_id: Uuid) -> StoreResult<()>;

    /// Hard delete (admin only). Seat claims go with it.
    async fn delete_booking(&self, id: Uuid) -> StoreResult<bool>;
}

/// Everything the booking core needs from persistence.
pub trait Store: ScheduleRepository + SeatLockRepository + BookingRepository {}

impl<T> Store for T where T: ScheduleRepository + SeatLockRepository + BookingRepository {}
