use busline_core::{Clock, LockRequest, ScheduleRepository, SeatLockRepository, Store};
use busline_shared::{Schedule, ScheduleAvailability, SeatAvailability, SeatLock, SeatState};
use chrono::Duration;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::metrics::BookingMetrics;
use crate::policy::BookingPolicy;

/// Short-lived exclusive claims on seats while a customer fills in the booking form.
pub struct SeatLockManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    metrics: BookingMetrics,
}

impl SeatLockManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: BookingPolicy, metrics: BookingMetrics) -> Self {
        Self { store, clock, policy, metrics }
    }

    /// Lock every requested seat for the session, or none of them.
    pub async fn lock(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[u32],
        session_id: &str,
        ttl_minutes: Option<i64>,
    ) -> BookingResult<Vec<SeatLock>> {
        let session_id = require_session(session_id)?;
        validate_seat_list(seat_numbers)?;

        let now = self.clock.now();
        let schedule = self.bookable_schedule(schedule_id, now).await?;
        validate_seat_range(&schedule, seat_numbers)?;

        let ttl = self.policy.lock_ttl(ttl_minutes);
        let request = LockRequest {
            schedule_id,
            seat_numbers: seat_numbers.to_vec(),
            session_id: session_id.to_string(),
            expires_at: now + ttl,
        };

        match self.store.acquire_locks(&request, now).await {
            Ok(locks) => {
                info!(
                    schedule_id = %schedule_id,
                    seats = ?seat_numbers,
                    expires_at = %request.expires_at,
                    "Seats locked"
                );
                Ok(locks)
            }
            Err(e) => {
                let err = BookingError::from(e);
                if let BookingError::SeatConflict { seats } = &err {
                    self.metrics.seat_conflicts.inc();
                    debug!(schedule_id = %schedule_id, conflicting = ?seats, "Seat lock refused");
                }
                Err(err)
            }
        }
    }

    /// Drop all of the session's locks on the schedule. Idempotent.
    pub async fn release(&self, schedule_id: Uuid, session_id: &str) -> BookingResult<u64> {
        let session_id = require_session(session_id)?;
        let released = self.store.release_locks(schedule_id, session_id).await?;
        debug!(schedule_id = %schedule_id, released, "Seat locks released");
        Ok(released)
    }

    /// Push the session's unexpired locks forward by `additional_minutes`, never past
    /// the maximum lock window measured from now.
    pub async fn extend(
        &self,
        schedule_id: Uuid,
        session_id: &str,
        additional_minutes: i64,
    ) -> BookingResult<Vec<SeatLock>> {
        let session_id = require_session(session_id)?;
        if additional_minutes <= 0 {
            return Err(BookingError::validation("additional_minutes must be positive"));
        }

        let now = self.clock.now();
        let held: Vec<SeatLock> = self
            .store
            .active_locks(schedule_id, now)
            .await?
            .into_iter()
            .filter(|lock| lock.session_id == session_id)
            .collect();

        let Some(latest) = held.iter().map(|lock| lock.expires_at).max() else {
            return Err(BookingError::NotFound(format!("seat locks for session {}", session_id)));
        };

        // Anything past the maximum window is cut below anyway
        let additional = Duration::minutes(additional_minutes.min(self.policy.lock_ttl_max.num_minutes()));
        let expires_at = (latest + additional).min(now + self.policy.lock_ttl_max);
        let locks = self.store.extend_locks(schedule_id, session_id, expires_at, now).await?;
        if locks.is_empty() {
            // Expired between the read and the update
            return Err(BookingError::NotFound(format!("seat locks for session {}", session_id)));
        }
        Ok(locks)
    }

    /// Seat-by-seat view at request time. Expired locks count as available.
    pub async fn query_availability(
        &self,
        schedule_id: Uuid,
        session_id: Option<&str>,
    ) -> BookingResult<ScheduleAvailability> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))?;

        let now = self.clock.now();
        let booked: HashSet<u32> = self.store.booked_seats(schedule_id).await?.into_iter().collect();
        let locks: HashMap<u32, SeatLock> = self
            .store
            .active_locks(schedule_id, now)
            .await?
            .into_iter()
            .map(|lock| (lock.seat_number, lock))
            .collect();

        let seats = (1..=schedule.total_seats)
            .map(|seat_number| {
                if booked.contains(&seat_number) {
                    return SeatAvailability { seat_number, state: SeatState::Booked, locked_until: None };
                }
                match locks.get(&seat_number) {
                    Some(lock) => {
                        let state = if session_id == Some(lock.session_id.as_str()) {
                            SeatState::Held
                        } else {
                            SeatState::Locked
                        };
                        SeatAvailability { seat_number, state, locked_until: Some(lock.expires_at) }
                    }
                    None => SeatAvailability { seat_number, state: SeatState::Available, locked_until: None },
                }
            })
            .collect();

        Ok(ScheduleAvailability {
            schedule_id,
            total_seats: schedule.total_seats,
            available_seats: schedule.total_seats.saturating_sub(booked.len() as u32),
            seats,
        })
    }

    /// Delete lock rows that have already lapsed
    pub async fn purge_expired(&self) -> BookingResult<u64> {
        let purged = self.store.purge_expired_locks(self.clock.now()).await?;
        if purged > 0 {
            debug!(purged, "Expired seat locks purged");
        }
        Ok(purged)
    }

    async fn bookable_schedule(&self, schedule_id: Uuid, now: chrono::DateTime<chrono::Utc>) -> BookingResult<Schedule> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))?;
        ensure_bookable(&schedule, now)?;
        Ok(schedule)
    }
}

fn require_session(session_id: &str) -> BookingResult<&str> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(BookingError::validation("session_id is required"));
    }
    Ok(trimmed)
}

pub(crate) fn ensure_bookable(schedule: &Schedule, now: chrono::DateTime<chrono::Utc>) -> BookingResult<()> {
    if schedule.accepts_bookings(now) {
        return Ok(());
    }
    let reason = if schedule.status.is_closed() {
        format!("schedule is {}", schedule.status)
    } else {
        "booking window has closed".to_string()
    };
    Err(BookingError::ScheduleUnavailable(reason))
}

pub(crate) fn validate_seat_list(seat_numbers: &[u32]) -> BookingResult<()> {
    if seat_numbers.is_empty() {
        return Err(BookingError::validation("at least one seat is required"));
    }
    let unique: BTreeSet<u32> = seat_numbers.iter().copied().collect();
    if unique.len() != seat_numbers.len() {
        return Err(BookingError::validation("duplicate seat numbers"));
    }
    Ok(())
}

pub(crate) fn validate_seat_range(schedule: &Schedule, seat_numbers: &[u32]) -> BookingResult<()> {
    let invalid: Vec<u32> = seat_numbers.iter().copied().filter(|s| !schedule.has_seat(*s)).collect();
    if !invalid.is_empty() {
        return Err(BookingError::Validation(format!(
            "seats {:?} outside 1..={}",
            invalid, schedule.total_seats
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use busline_shared::ScheduleStatus;

    #[tokio::test]
    async fn test_overlapping_lock_requests_conflict() {
        let h = Harness::new().await;

        h.seats.lock(h.schedule_id, &[1, 2], "session-a", None).await.unwrap();
        let err = h.seats.lock(h.schedule_id, &[2, 3], "session-b", None).await.unwrap_err();

        assert!(matches!(err, BookingError::SeatConflict { seats } if seats == vec![2]));
        // Seat 3 was not left behind for session-b
        let availability = h.seats.query_availability(h.schedule_id, Some("session-b")).await.unwrap();
        assert_eq!(availability.state_of(3), Some(SeatState::Available));
        assert_eq!(h.metrics.seat_conflicts.get(), 1);
    }

    #[tokio::test]
    async fn test_same_session_relock_refreshes() {
        let h = Harness::new().await;

        let first = h.seats.lock(h.schedule_id, &[5], "session-a", Some(10)).await.unwrap();
        h.clock.advance(Duration::minutes(5));
        let second = h.seats.lock(h.schedule_id, &[5], "session-a", Some(10)).await.unwrap();

        assert!(second[0].expires_at > first[0].expires_at);
    }

    #[tokio::test]
    async fn test_lock_expires_without_purge() {
        let h = Harness::new().await;

        h.seats.lock(h.schedule_id, &[7], "session-a", None).await.unwrap();
        h.clock.advance(Duration::minutes(16));

        let availability = h.seats.query_availability(h.schedule_id, None).await.unwrap();
        assert_eq!(availability.state_of(7), Some(SeatState::Available));
        h.seats.lock(h.schedule_id, &[7], "session-b", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_validation() {
        let h = Harness::new().await;

        let empty = h.seats.lock(h.schedule_id, &[], "session-a", None).await.unwrap_err();
        assert!(matches!(empty, BookingError::Validation(_)));

        let duplicate = h.seats.lock(h.schedule_id, &[1, 1], "session-a", None).await.unwrap_err();
        assert!(matches!(duplicate, BookingError::Validation(_)));

        let out_of_range = h.seats.lock(h.schedule_id, &[0, 41], "session-a", None).await.unwrap_err();
        assert!(matches!(out_of_range, BookingError::Validation(_)));

        let no_session = h.seats.lock(h.schedule_id, &[1], "  ", None).await.unwrap_err();
        assert!(matches!(no_session, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_closed_schedule_refuses_locks() {
        let h = Harness::new().await;
        h.store.set_schedule_status(h.schedule_id, ScheduleStatus::Cancelled).await.unwrap();

        let err = h.seats.lock(h.schedule_id, &[1], "session-a", None).await.unwrap_err();
        assert!(matches!(err, BookingError::ScheduleUnavailable(_)));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1, 2], "session-a", None).await.unwrap();

        assert_eq!(h.seats.release(h.schedule_id, "session-a").await.unwrap(), 2);
        assert_eq!(h.seats.release(h.schedule_id, "session-a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extend_is_capped_and_requires_locks() {
        let h = Harness::new().await;

        let err = h.seats.extend(h.schedule_id, "session-a", 5).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));

        h.seats.lock(h.schedule_id, &[3], "session-a", Some(10)).await.unwrap();
        h.clock.advance(Duration::minutes(8));
        let extended = h.seats.extend(h.schedule_id, "session-a", 30).await.unwrap();

        assert_eq!(extended[0].expires_at, h.clock.now() + Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_extreme_minutes_are_clamped() {
        let h = Harness::new().await;

        let locks = h.seats.lock(h.schedule_id, &[4], "session-a", Some(i64::MAX)).await.unwrap();
        assert_eq!(locks[0].expires_at, h.clock.now() + Duration::minutes(15));

        let locks = h.seats.lock(h.schedule_id, &[5], "session-b", Some(i64::MIN)).await.unwrap();
        assert_eq!(locks[0].expires_at, h.clock.now() + Duration::minutes(10));

        let extended = h.seats.extend(h.schedule_id, "session-b", i64::MAX / 120).await.unwrap();
        assert_eq!(extended[0].expires_at, h.clock.now() + Duration::minutes(15));

        let err = h.seats.extend(h.schedule_id, "session-b", i64::MIN).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_locks_on_one_seat_have_one_winner() {
        let h = Harness::new().await;
        let mut tasks = tokio::task::JoinSet::new();

        for i in 0..16 {
            let seats = h.seats.clone();
            let schedule_id = h.schedule_id;
            tasks.spawn(async move { seats.lock(schedule_id, &[12], &format!("session-{}", i), None).await });
        }

        let mut granted = 0;
        let mut refused = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => granted += 1,
                Err(BookingError::SeatConflict { seats }) => {
                    assert_eq!(seats, vec![12]);
                    refused += 1;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!((granted, refused), (1, 15));
        assert_eq!(h.store.lock_rows().await, 1);
    }

    #[tokio::test]
    async fn test_availability_marks_own_locks_held() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1], "session-a", None).await.unwrap();
        h.seats.lock(h.schedule_id, &[2], "session-b", None).await.unwrap();

        let availability = h.seats.query_availability(h.schedule_id, Some("session-a")).await.unwrap();

        assert_eq!(availability.state_of(1), Some(SeatState::Held));
        assert_eq!(availability.state_of(2), Some(SeatState::Locked));
        assert_eq!(availability.state_of(3), Some(SeatState::Available));
        assert_eq!(availability.available_seats, 40);
    }

    #[tokio::test]
    async fn test_purge_removes_only_lapsed_rows() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1], "session-a", Some(10)).await.unwrap();
        h.clock.advance(Duration::minutes(5));
        h.seats.lock(h.schedule_id, &[2], "session-b", Some(10)).await.unwrap();
        h.clock.advance(Duration::minutes(6));

        assert_eq!(h.seats.purge_expired().await.unwrap(), 1);
        assert_eq!(h.store.lock_rows().await, 1);
    }
}
