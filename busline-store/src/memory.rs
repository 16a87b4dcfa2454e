use async_trait::async_trait;
use busline_core::repository::{
    BookingRepository, LockRequest, ScheduleRepository, SeatLockRepository, Transition,
};
use busline_core::{StoreError, StoreResult};
use busline_shared::{Booking, BookingStatus, Schedule, ScheduleStatus, SeatLock};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    schedules: HashMap<Uuid, Schedule>,
    /// Keyed like the `seat_locks` primary key
    locks: HashMap<(Uuid, u32), SeatLock>,
    bookings: HashMap<Uuid, Booking>,
    /// Active seat claims, keyed like the `booking_seats` primary key
    booking_seats: HashMap<(Uuid, u32), Uuid>,
}

impl State {
    fn release_claims(&mut self, booking_id: Uuid) {
        self.booking_seats.retain(|_, owner| *owner != booking_id);
    }
}

/// In-process store with the same transactional semantics as the Postgres repository.
///
/// Every operation runs under one mutex, which plays the role of the database transaction
/// and of the primary keys on `seat_locks` and `booking_seats`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lock rows, expired or not
    pub async fn lock_rows(&self) -> usize {
        self.state.lock().await.locks.len()
    }
}

#[async_trait]
impl ScheduleRepository for MemoryStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.schedules.contains_key(&schedule.id) {
            return Err(StoreError::Database(format!("duplicate schedule id {}", schedule.id)));
        }
        state.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.state.lock().await.schedules.get(&id).cloned())
    }

    async fn list_schedules(&self, status: Option<ScheduleStatus>) -> StoreResult<Vec<Schedule>> {
        let state = self.state.lock().await;
        let mut schedules: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.departure_at);
        Ok(schedules)
    }

    async fn set_schedule_status(&self, id: Uuid, status: ScheduleStatus) -> StoreResult<Schedule> {
        let mut state = self.state.lock().await;
        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("schedule", id))?;
        schedule.status = status;
        Ok(schedule.clone())
    }

    async fn start_departed_schedules(&self, now: DateTime<Utc>) -> StoreResult<Vec<Schedule>> {
        let mut state = self.state.lock().await;
        let mut started: Vec<Schedule> = state
            .schedules
            .values_mut()
            .filter(|s| s.status == ScheduleStatus::Scheduled && s.departure_at <= now)
            .map(|s| {
                s.status = ScheduleStatus::InProgress;
                s.clone()
            })
            .collect();
        started.sort_by_key(|s| s.departure_at);
        Ok(started)
    }
}

#[async_trait]
impl SeatLockRepository for MemoryStore {
    async fn acquire_locks(&self, request: &LockRequest, now: DateTime<Utc>) -> StoreResult<Vec<SeatLock>> {
        let mut state = self.state.lock().await;
        let schedule_id = request.schedule_id;

        let conflicts: BTreeSet<u32> = request
            .seat_numbers
            .iter()
            .copied()
            .filter(|seat| {
                let key = (schedule_id, *seat);
                if state.booking_seats.contains_key(&key) {
                    return true;
                }
                matches!(
                    state.locks.get(&key),
                    Some(lock) if lock.is_active(now) && lock.session_id != request.session_id
                )
            })
            .collect();

        if !conflicts.is_empty() {
            return Err(StoreError::SeatConflict(conflicts.into_iter().collect()));
        }

        let mut granted = Vec::with_capacity(request.seat_numbers.len());
        for seat in &request.seat_numbers {
            let key = (schedule_id, *seat);
            let created_at = match state.locks.get(&key) {
                Some(lock) if lock.is_active(now) => lock.created_at,
                _ => now,
            };
            let lock = SeatLock {
                schedule_id,
                seat_number: *seat,
                session_id: request.session_id.clone(),
                expires_at: request.expires_at,
                created_at,
            };
            state.locks.insert(key, lock.clone());
            granted.push(lock);
        }
        Ok(granted)
    }

    async fn release_locks(&self, schedule_id: Uuid, session_id: &str) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.locks.len();
        state
            .locks
            .retain(|(sid, _), lock| !(*sid == schedule_id && lock.session_id == session_id));
        Ok((before - state.locks.len()) as u64)
    }

    async fn extend_locks(
        &self,
        schedule_id: Uuid,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SeatLock>> {
        let mut state = self.state.lock().await;
        let mut extended: Vec<SeatLock> = state
            .locks
            .values_mut()
            .filter(|lock| {
                lock.schedule_id == schedule_id && lock.session_id == session_id && lock.is_active(now)
            })
            .map(|lock| {
                lock.expires_at = expires_at;
                lock.clone()
            })
            .collect();
        extended.sort_by_key(|l| l.seat_number);
        Ok(extended)
    }

    async fn active_locks(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<SeatLock>> {
        let state = self.state.lock().await;
        let mut locks: Vec<SeatLock> = state
            .locks
            .values()
            .filter(|lock| lock.schedule_id == schedule_id && lock.is_active(now))
            .cloned()
            .collect();
        locks.sort_by_key(|l| l.seat_number);
        Ok(locks)
    }

    async fn booked_seats(&self, schedule_id: Uuid) -> StoreResult<Vec<u32>> {
        let state = self.state.lock().await;
        let mut seats: Vec<u32> = state
            .booking_seats
            .keys()
            .filter(|(sid, _)| *sid == schedule_id)
            .map(|(_, seat)| *seat)
            .collect();
        seats.sort_unstable();
        Ok(seats)
    }

    async fn purge_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.locks.len();
        state.locks.retain(|_, lock| lock.is_active(now));
        Ok((before - state.locks.len()) as u64)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn create_booking(&self, booking: &Booking, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let schedule_id = booking.schedule_id;

        if !state.schedules.contains_key(&schedule_id) {
            return Err(StoreError::not_found("schedule", schedule_id));
        }
        if state.bookings.values().any(|b| b.reference == booking.reference) {
            return Err(StoreError::Database(format!("duplicate reference {}", booking.reference)));
        }

        let booked: Vec<u32> = booking
            .seat_numbers
            .iter()
            .copied()
            .filter(|seat| state.booking_seats.contains_key(&(schedule_id, *seat)))
            .collect();
        if !booked.is_empty() {
            return Err(StoreError::SeatConflict(booked));
        }

        let missing: Vec<u32> = booking
            .seat_numbers
            .iter()
            .copied()
            .filter(|seat| {
                !matches!(
                    state.locks.get(&(schedule_id, *seat)),
                    Some(lock) if lock.is_active(now) && lock.session_id == booking.session_id
                )
            })
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::LockNotHeld(missing));
        }

        for seat in &booking.seat_numbers {
            state.locks.remove(&(schedule_id, *seat));
            state.booking_seats.insert((schedule_id, *seat), booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn get_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state.bookings.values().find(|b| b.reference == reference).cloned())
    }

    async fn list_bookings_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.is_owned_by(customer_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_bookings_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn transition_booking(&self, transition: &Transition) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&transition.booking_id)
            .ok_or_else(|| StoreError::not_found("booking", transition.booking_id))?;

        if !transition.from.contains(&booking.status) {
            return Err(StoreError::StatusMismatch {
                id: booking.id,
                current: booking.status,
            });
        }

        booking.apply_status(transition.to, transition.at);
        if let Some(reason) = &transition.reason {
            booking.cancellation_reason = Some(reason.clone());
        }
        let updated = booking.clone();

        if transition.release_seats {
            state.release_claims(transition.booking_id);
        }
        Ok(updated)
    }

    async fn expire_pending(&self, created_before: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut state = self.state.lock().await;
        let mut expired = Vec::new();
        for booking in state.bookings.values_mut() {
            if booking.status == BookingStatus::Pending && booking.created_at <= created_before {
                booking.apply_status(BookingStatus::Expired, now);
                expired.push(booking.clone());
            }
        }
        for booking in &expired {
            state.release_claims(booking.id);
        }
        expired.sort_by_key(|b| b.created_at);
        Ok(expired)
    }

    async fn complete_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut state = self.state.lock().await;
        let schedule = state
            .schedules
            .get_mut(&schedule_id)
            .ok_or_else(|| StoreError::not_found("schedule", schedule_id))?;
        if schedule.status == ScheduleStatus::Cancelled {
            return Err(StoreError::ScheduleStatusMismatch { id: schedule_id, current: schedule.status });
        }
        schedule.status = ScheduleStatus::Completed;

        let mut completed = Vec::new();
        for booking in state.bookings.values_mut() {
            if booking.schedule_id == schedule_id && booking.status == BookingStatus::Confirmed {
                booking.apply_status(BookingStatus::Completed, now);
                completed.push(booking.clone());
            }
        }
        for booking in &completed {
            state.release_claims(booking.id);
        }
        Ok(completed)
    }

    async fn cancel_schedule(&self, schedule_id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut state = self.state.lock().await;
        let schedule = state
            .schedules
            .get_mut(&schedule_id)
            .ok_or_else(|| StoreError::not_found("schedule", schedule_id))?;
        if schedule.status == ScheduleStatus::Completed {
            return Err(StoreError::ScheduleStatusMismatch { id: schedule_id, current: schedule.status });
        }
        schedule.status = ScheduleStatus::Cancelled;

        let mut cancelled = Vec::new();
        for booking in state.bookings.values_mut() {
            if booking.schedule_id == schedule_id && booking.status.is_active() {
                booking.apply_status(BookingStatus::Cancelled, now);
                booking.cancellation_reason = Some(reason.to_string());
                cancelled.push(booking.clone());
            }
        }
        for booking in &cancelled {
            state.release_claims(booking.id);
        }
        state.locks.retain(|(sid, _), _| *sid != schedule_id);
        Ok(cancelled)
    }

    async fn due_reminders(&self, now: DateTime<Utc>, default_lead_minutes: i64) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut due: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Confirmed && b.reminder_sent_at.is_none())
            .filter(|b| {
                let lead = b.reminder_lead_minutes.unwrap_or(default_lead_minutes);
                state.schedules.get(&b.schedule_id).map_or(false, |s| {
                    let window_end = Duration::try_minutes(lead).and_then(|d| now.checked_add_signed(d));
                    // A lead too large to represent covers every future departure
                    s.departure_at > now && window_end.map_or(lead > 0, |end| s.departure_at <= end)
                })
            })
            .cloned()
            .collect();
        due.sort_by_key(|b| b.created_at);
        Ok(due)
    }

    async fn mark_reminder_sent(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.bookings.get_mut(&booking_id) {
            Some(booking) if booking.reminder_sent_at.is_none() => {
                booking.reminder_sent_at = Some(at);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("booking", booking_id)),
        }
    }

    async fn clear_reminder_mark(&self, booking_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(booking) = state.bookings.get_mut(&booking_id) {
            booking.reminder_sent_at = None;
        }
        Ok(())
    }

    async fn delete_booking(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let removed = state.bookings.remove(&id).is_some();
        if removed {
            state.release_claims(id);
        }
        Ok(removed)
    }
}
