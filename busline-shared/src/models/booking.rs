use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pii::Masked;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
            BookingStatus::Completed => "completed",
        }
    }

    /// Active bookings hold their seats.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "expired" => Ok(BookingStatus::Expired),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub phone: Masked<String>,
    #[serde(default)]
    pub email: Option<Masked<String>>,
}

/// Who to reach about the booking. Guests supply it; customers default to their account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub phone: Option<Masked<String>>,
}

/// All amounts are currency minor units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub fare: i64,
    pub convenience_fee: i64,
    pub bank_charge: i64,
    pub total: i64,
    pub currency: String,
}

/// The purchase record for one or more seats on a schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    /// `None` for guest bookings
    pub customer_id: Option<String>,
    pub contact: ContactInfo,
    pub schedule_id: Uuid,
    pub session_id: String,
    pub seat_numbers: Vec<u32>,
    pub passengers: Vec<Passenger>,
    pub price: PriceBreakdown,
    pub status: BookingStatus,
    pub reminder_lead_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn is_owned_by(&self, customer_id: &str) -> bool {
        self.customer_id.as_deref() == Some(customer_id)
    }

    /// Lead time before departure at which the trip reminder goes out.
    pub fn reminder_lead(&self, default_minutes: i64) -> Duration {
        Duration::minutes(self.reminder_lead_minutes.unwrap_or(default_minutes))
    }

    /// Stamp a transition onto the record. Callers check that it is legal first.
    pub fn apply_status(&mut self, status: BookingStatus, at: DateTime<Utc>) {
        match status {
            BookingStatus::Confirmed => self.confirmed_at = Some(at),
            BookingStatus::Cancelled => self.cancelled_at = Some(at),
            BookingStatus::Expired => self.expired_at = Some(at),
            BookingStatus::Completed => self.completed_at = Some(at),
            BookingStatus::Pending => {}
        }
        self.status = status;
        self.updated_at = at;
    }
}
