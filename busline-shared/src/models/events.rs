use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::booking::Booking;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    BookingExpired,
    BookingCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BookingCreated => "booking.created",
            EventKind::BookingConfirmed => "booking.confirmed",
            EventKind::BookingCancelled => "booking.cancelled",
            EventKind::BookingExpired => "booking.expired",
            EventKind::BookingCompleted => "booking.completed",
        }
    }
}

/// Emitted after a booking transition has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEvent {
    pub kind: EventKind,
    pub booking: Booking,
    pub occurred_at: DateTime<Utc>,
}

impl BookingEvent {
    pub fn new(kind: EventKind, booking: Booking, occurred_at: DateTime<Utc>) -> Self {
        Self { kind, booking, occurred_at }
    }

    pub fn created(booking: Booking, at: DateTime<Utc>) -> Self {
        Self::new(EventKind::BookingCreated, booking, at)
    }

    pub fn confirmed(booking: Booking, at: DateTime<Utc>) -> Self {
        Self::new(EventKind::BookingConfirmed, booking, at)
    }

    pub fn cancelled(booking: Booking, at: DateTime<Utc>) -> Self {
        Self::new(EventKind::BookingCancelled, booking, at)
    }

    pub fn expired(booking: Booking, at: DateTime<Utc>) -> Self {
        Self::new(EventKind::BookingExpired, booking, at)
    }

    pub fn completed(booking: Booking, at: DateTime<Utc>) -> Self {
        Self::new(EventKind::BookingCompleted, booking, at)
    }

    /// Partition key for downstream consumers
    pub fn key(&self) -> String {
        self.booking.schedule_id.to_string()
    }
}
