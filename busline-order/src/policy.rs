use chrono::Duration;

/// Longest per-booking reminder lead a customer may ask for (30 days)
pub const MAX_REMINDER_LEAD_MINUTES: i64 = 30 * 24 * 60;

/// Time windows that govern locks, payment and reminders
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub lock_ttl_default: Duration,
    pub lock_ttl_min: Duration,
    pub lock_ttl_max: Duration,
    /// Pending bookings older than this expire
    pub payment_window: Duration,
    pub reminder_lead_minutes: i64,
    /// Default gap between booking close and departure for new schedules
    pub booking_cutoff: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            lock_ttl_default: Duration::minutes(15),
            lock_ttl_min: Duration::minutes(10),
            lock_ttl_max: Duration::minutes(15),
            payment_window: Duration::minutes(15),
            reminder_lead_minutes: 24 * 60,
            booking_cutoff: Duration::minutes(30),
        }
    }
}

impl BookingPolicy {
    /// Requested minutes are clamped before they become a `Duration`, so any client
    /// value is safe.
    pub fn lock_ttl(&self, requested_minutes: Option<i64>) -> Duration {
        let requested = match requested_minutes {
            Some(minutes) => Duration::minutes(
                minutes
                    .max(self.lock_ttl_min.num_minutes())
                    .min(self.lock_ttl_max.num_minutes()),
            ),
            None => self.lock_ttl_default,
        };
        requested.max(self.lock_ttl_min).min(self.lock_ttl_max)
    }
}
