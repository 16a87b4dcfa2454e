use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a scheduled trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "SCHEDULED",
            ScheduleStatus::InProgress => "IN_PROGRESS",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Cancelled => "CANCELLED",
        }
    }

    /// Completed and cancelled trips never take new bookings.
    pub fn is_closed(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(ScheduleStatus::Scheduled),
            "IN_PROGRESS" => Ok(ScheduleStatus::InProgress),
            "COMPLETED" => Ok(ScheduleStatus::Completed),
            "CANCELLED" => Ok(ScheduleStatus::Cancelled),
            other => Err(format!("unknown schedule status: {}", other)),
        }
    }
}

/// A scheduled bus trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub total_seats: u32,
    /// Price of one seat in currency minor units
    pub price_per_seat: i64,
    pub booking_closes_at: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether a booking (or seat lock) may be taken at `now`.
    pub fn accepts_bookings(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_closed() && now < self.booking_closes_at && now < self.departure_at
    }

    pub fn has_seat(&self, seat_number: u32) -> bool {
        seat_number >= 1 && seat_number <= self.total_seats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn schedule(status: ScheduleStatus) -> Schedule {
        let now = Utc::now();
        Schedule {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            departure_city: "Hanoi".to_string(),
            arrival_city: "Hai Phong".to_string(),
            departure_at: now + Duration::hours(6),
            arrival_at: now + Duration::hours(9),
            total_seats: 40,
            price_per_seat: 150_000,
            booking_closes_at: now + Duration::hours(5),
            status,
            created_at: now,
        }
    }

    #[test]
    fn closed_schedules_refuse_bookings() {
        let now = Utc::now();
        assert!(schedule(ScheduleStatus::Scheduled).accepts_bookings(now));
        assert!(!schedule(ScheduleStatus::Completed).accepts_bookings(now));
        assert!(!schedule(ScheduleStatus::Cancelled).accepts_bookings(now));
        assert!(!schedule(ScheduleStatus::Scheduled).accepts_bookings(now + Duration::hours(5)));
    }

    #[test]
    fn seat_range_is_one_based() {
        let s = schedule(ScheduleStatus::Scheduled);
        assert!(!s.has_seat(0));
        assert!(s.has_seat(1));
        assert!(s.has_seat(40));
        assert!(!s.has_seat(41));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ScheduleStatus::Scheduled,
            ScheduleStatus::InProgress,
            ScheduleStatus::Completed,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ScheduleStatus>().unwrap(), status);
        }
    }
}
