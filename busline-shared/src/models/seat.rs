use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exclusive, time-bounded claim on one seat of one schedule.
///
/// A lock whose `expires_at` is at or before "now" is semantically absent: availability
/// queries and new lock requests ignore it, and the purge sweep deletes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatLock {
    pub schedule_id: Uuid,
    pub seat_number: u32,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SeatLock {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Available,
    /// Locked by a different session
    Locked,
    /// Locked by the asking session
    Held,
    /// Referenced by an active booking
    Booked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatAvailability {
    pub seat_number: u32,
    pub state: SeatState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleAvailability {
    pub schedule_id: Uuid,
    pub total_seats: u32,
    pub available_seats: u32,
    pub seats: Vec<SeatAvailability>,
}

impl ScheduleAvailability {
    pub fn state_of(&self, seat_number: u32) -> Option<SeatState> {
        self.seats
            .iter()
            .find(|s| s.seat_number == seat_number)
            .map(|s| s.state)
    }
}
