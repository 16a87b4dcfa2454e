use busline_shared::{Schedule, ScheduleStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

pub const MAX_SEATS_PER_BUS: u32 = 100;

/// Per-seat fare ceiling in minor units, keeps every booking total well inside `i64`
pub const MAX_PRICE_PER_SEAT: i64 = 1_000_000_000_000;

/// Admin input for a new trip
#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub total_seats: u32,
    pub price_per_seat: i64,
    /// Defaults to `departure_at - default_cutoff`
    #[serde(default)]
    pub booking_closes_at: Option<DateTime<Utc>>,
}

impl NewSchedule {
    pub fn into_schedule(self, default_cutoff: Duration, now: DateTime<Utc>) -> Result<Schedule, ScheduleError> {
        if self.departure_city.trim().is_empty() || self.arrival_city.trim().is_empty() {
            return Err(ScheduleError::Invalid("departure and arrival city are required".to_string()));
        }
        if self.arrival_at <= self.departure_at {
            return Err(ScheduleError::Invalid("arrival must be after departure".to_string()));
        }
        if self.departure_at <= now {
            return Err(ScheduleError::Invalid("departure must be in the future".to_string()));
        }
        if self.total_seats == 0 || self.total_seats > MAX_SEATS_PER_BUS {
            return Err(ScheduleError::Invalid(format!(
                "total_seats must be between 1 and {}",
                MAX_SEATS_PER_BUS
            )));
        }
        if self.price_per_seat <= 0 || self.price_per_seat > MAX_PRICE_PER_SEAT {
            return Err(ScheduleError::Invalid(format!(
                "price_per_seat must be between 1 and {}",
                MAX_PRICE_PER_SEAT
            )));
        }

        let booking_closes_at = self
            .booking_closes_at
            .unwrap_or(self.departure_at - default_cutoff);
        if booking_closes_at > self.departure_at {
            return Err(ScheduleError::Invalid("booking cutoff must not be after departure".to_string()));
        }

        Ok(Schedule {
            id: Uuid::new_v4(),
            route_id: self.route_id,
            bus_id: self.bus_id,
            departure_city: self.departure_city.trim().to_string(),
            arrival_city: self.arrival_city.trim().to_string(),
            departure_at: self.departure_at,
            arrival_at: self.arrival_at,
            total_seats: self.total_seats,
            price_per_seat: self.price_per_seat,
            booking_closes_at,
            status: ScheduleStatus::Scheduled,
            created_at: now,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid schedule: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(now: DateTime<Utc>) -> NewSchedule {
        NewSchedule {
            route_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            departure_city: "Da Nang".to_string(),
            arrival_city: "Hue".to_string(),
            departure_at: now + Duration::days(2),
            arrival_at: now + Duration::days(2) + Duration::hours(3),
            total_seats: 30,
            price_per_seat: 180_000,
            booking_closes_at: None,
        }
    }

    #[test]
    fn test_cutoff_defaults_before_departure() {
        let now = Utc::now();
        let schedule = input(now).into_schedule(Duration::minutes(30), now).unwrap();

        assert_eq!(schedule.booking_closes_at, schedule.departure_at - Duration::minutes(30));
        assert_eq!(schedule.status, ScheduleStatus::Scheduled);
    }

    #[test]
    fn test_rejects_bad_input() {
        let now = Utc::now();

        let mut no_seats = input(now);
        no_seats.total_seats = 0;
        assert!(no_seats.into_schedule(Duration::minutes(30), now).is_err());

        let mut backwards = input(now);
        backwards.arrival_at = backwards.departure_at - Duration::hours(1);
        assert!(backwards.into_schedule(Duration::minutes(30), now).is_err());

        let mut late_cutoff = input(now);
        late_cutoff.booking_closes_at = Some(late_cutoff.departure_at + Duration::minutes(1));
        assert!(late_cutoff.into_schedule(Duration::minutes(30), now).is_err());

        let mut free = input(now);
        free.price_per_seat = 0;
        assert!(free.into_schedule(Duration::minutes(30), now).is_err());
    }

    #[test]
    fn test_price_ceiling() {
        let now = Utc::now();

        let mut at_ceiling = input(now);
        at_ceiling.price_per_seat = MAX_PRICE_PER_SEAT;
        assert!(at_ceiling.into_schedule(Duration::minutes(30), now).is_ok());

        let mut huge = input(now);
        huge.price_per_seat = i64::MAX;
        assert!(matches!(
            huge.into_schedule(Duration::minutes(30), now),
            Err(ScheduleError::Invalid(msg)) if msg.contains("price_per_seat")
        ));
    }
}
