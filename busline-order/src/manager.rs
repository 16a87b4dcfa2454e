use busline_catalog::PricingEngine;
use busline_core::{BookingRepository, Clock, PaymentSignal, ScheduleRepository, Store, StoreError, Transition};
use busline_shared::{Booking, BookingEvent, BookingStatus, ContactInfo, Masked, Passenger, ScheduleStatus};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::events::EventBus;
use crate::metrics::BookingMetrics;
use crate::policy::{BookingPolicy, MAX_REMINDER_LEAD_MINUTES};
use crate::reference;
use crate::seats::{ensure_bookable, validate_seat_list, validate_seat_range};

const MAX_PASSENGER_AGE: u8 = 120;

/// Who is asking for a state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Customer(String),
    Admin,
    /// Payment gateway callbacks and scheduled jobs
    System,
}

impl Actor {
    pub fn can_access(&self, booking: &Booking) -> bool {
        match self {
            Actor::Admin | Actor::System => true,
            Actor::Customer(id) => booking.is_owned_by(id),
        }
    }

    fn default_reason(&self) -> &'static str {
        match self {
            Actor::Customer(_) => "cancelled by customer",
            Actor::Admin => "cancelled by administrator",
            Actor::System => "cancelled by system",
        }
    }
}

/// Authenticated customer placing a booking
#[derive(Debug, Clone)]
pub struct CustomerProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub schedule_id: Uuid,
    pub session_id: String,
    pub seat_numbers: Vec<u32>,
    pub passengers: Vec<Passenger>,
    /// Required for guests; customers fall back to their account details
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub reminder_lead_minutes: Option<i64>,
}

/// Manages the booking lifecycle: `pending → confirmed → completed`,
/// `pending | confirmed → cancelled`, `pending → expired`.
pub struct BookingManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    pricing: PricingEngine,
    policy: BookingPolicy,
    events: EventBus,
    metrics: BookingMetrics,
}

impl BookingManager {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        pricing: PricingEngine,
        policy: BookingPolicy,
        events: EventBus,
        metrics: BookingMetrics,
    ) -> Self {
        Self { store, clock, pricing, policy, events, metrics }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    /// Turn the session's seat locks into a pending booking.
    pub async fn create(&self, input: CreateBooking, customer: Option<&CustomerProfile>) -> BookingResult<Booking> {
        validate_seat_list(&input.seat_numbers)?;
        validate_passengers(&input)?;
        if input.session_id.trim().is_empty() {
            return Err(BookingError::validation("session_id is required"));
        }
        if let Some(lead) = input.reminder_lead_minutes {
            if !(1..=MAX_REMINDER_LEAD_MINUTES).contains(&lead) {
                return Err(BookingError::Validation(format!(
                    "reminder_lead_minutes must be between 1 and {}",
                    MAX_REMINDER_LEAD_MINUTES
                )));
            }
        }
        let contact = resolve_contact(input.contact.clone(), customer, &input.passengers)?;

        let now = self.clock.now();
        let schedule = self
            .store
            .get_schedule(input.schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", input.schedule_id)))?;
        ensure_bookable(&schedule, now)?;
        validate_seat_range(&schedule, &input.seat_numbers)?;

        let price = self
            .pricing
            .calculate(schedule.price_per_seat, input.seat_numbers.len() as u32);

        let mut seat_numbers = input.seat_numbers;
        seat_numbers.sort_unstable();

        let booking = Booking {
            id: Uuid::new_v4(),
            reference: reference::generate(),
            customer_id: customer.map(|c| c.id.clone()),
            contact,
            schedule_id: schedule.id,
            session_id: input.session_id.trim().to_string(),
            seat_numbers,
            passengers: input.passengers,
            price,
            status: BookingStatus::Pending,
            reminder_lead_minutes: input.reminder_lead_minutes,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            expired_at: None,
            completed_at: None,
            reminder_sent_at: None,
        };

        if let Err(e) = self.store.create_booking(&booking, now).await {
            let err = BookingError::from(e);
            if matches!(err, BookingError::SeatConflict { .. }) {
                self.metrics.seat_conflicts.inc();
            }
            return Err(err);
        }

        info!(
            booking_id = %booking.id,
            reference = %booking.reference,
            schedule_id = %booking.schedule_id,
            seats = ?booking.seat_numbers,
            total = booking.price.total,
            "Booking created"
        );
        self.metrics.record_transition(BookingStatus::Pending.as_str(), 1);
        self.events.publish(BookingEvent::created(booking.clone(), now)).await;
        Ok(booking)
    }

    /// Transition: pending → confirmed (payment received)
    pub async fn confirm(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.get(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::for_transition(booking.status, BookingStatus::Confirmed));
        }

        let now = self.clock.now();
        let confirmed = self
            .apply(Transition {
                booking_id,
                from: vec![BookingStatus::Pending],
                to: BookingStatus::Confirmed,
                at: now,
                reason: None,
                release_seats: false,
            })
            .await?;

        info!(booking_id = %booking_id, reference = %confirmed.reference, "Booking confirmed");
        self.events.publish(BookingEvent::confirmed(confirmed.clone(), now)).await;
        Ok(confirmed)
    }

    /// Transition: pending | confirmed → cancelled, seats released
    pub async fn cancel(&self, booking_id: Uuid, actor: &Actor, reason: Option<String>) -> BookingResult<Booking> {
        self.cancel_from(booking_id, actor, reason, &[BookingStatus::Pending, BookingStatus::Confirmed])
            .await
    }

    async fn cancel_from(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
        from: &[BookingStatus],
    ) -> BookingResult<Booking> {
        let booking = self.get(booking_id).await?;
        if !actor.can_access(&booking) {
            return Err(BookingError::Forbidden("booking belongs to another customer".to_string()));
        }
        if !from.contains(&booking.status) {
            return Err(BookingError::for_transition(booking.status, BookingStatus::Cancelled));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| actor.default_reason().to_string());
        let now = self.clock.now();
        let cancelled = self
            .apply(Transition {
                booking_id,
                from: from.to_vec(),
                to: BookingStatus::Cancelled,
                at: now,
                reason: Some(reason),
                release_seats: true,
            })
            .await?;

        info!(
            booking_id = %booking_id,
            previous = %booking.status,
            reason = cancelled.cancellation_reason.as_deref().unwrap_or_default(),
            "Booking cancelled"
        );
        self.events.publish(BookingEvent::cancelled(cancelled.clone(), now)).await;
        Ok(cancelled)
    }

    /// Expire every pending booking older than the payment window. Idempotent.
    pub async fn expire_pending(&self) -> BookingResult<Vec<Booking>> {
        let now = self.clock.now();
        let expired = self.store.expire_pending(now - self.policy.payment_window, now).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "Pending bookings expired");
            self.metrics.record_transition(BookingStatus::Expired.as_str(), expired.len());
        }
        self.events
            .publish_all(expired.iter().cloned().map(|b| BookingEvent::expired(b, now)))
            .await;
        Ok(expired)
    }

    /// Mark the schedule completed; its confirmed bookings complete with it.
    /// Pending bookings are left to expiry.
    pub async fn complete_schedule(&self, schedule_id: Uuid) -> BookingResult<Vec<Booking>> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))?;
        if schedule.status == ScheduleStatus::Cancelled {
            return Err(BookingError::validation("a cancelled schedule cannot be completed"));
        }

        let now = self.clock.now();
        let completed = self.store.complete_schedule(schedule_id, now).await?;
        info!(schedule_id = %schedule_id, bookings = completed.len(), "Schedule completed");
        self.metrics.record_transition(BookingStatus::Completed.as_str(), completed.len());
        self.events
            .publish_all(completed.iter().cloned().map(|b| BookingEvent::completed(b, now)))
            .await;
        Ok(completed)
    }

    /// Cancel the schedule and every active booking on it
    pub async fn cancel_schedule(&self, schedule_id: Uuid, reason: Option<String>) -> BookingResult<Vec<Booking>> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))?;
        if schedule.status == ScheduleStatus::Completed {
            return Err(BookingError::validation("a completed schedule cannot be cancelled"));
        }

        let reason = reason.unwrap_or_else(|| "schedule cancelled by operator".to_string());
        let now = self.clock.now();
        let cancelled = self.store.cancel_schedule(schedule_id, &reason, now).await?;
        warn!(schedule_id = %schedule_id, bookings = cancelled.len(), "Schedule cancelled");
        self.metrics.record_transition(BookingStatus::Cancelled.as_str(), cancelled.len());
        self.events
            .publish_all(cancelled.iter().cloned().map(|b| BookingEvent::cancelled(b, now)))
            .await;
        Ok(cancelled)
    }

    pub async fn handle_payment_signal(&self, signal: PaymentSignal) -> BookingResult<Booking> {
        match signal {
            PaymentSignal::PaymentSuccess { booking_id, reference } => {
                if let Some(reference) = reference {
                    let booking = self.get(booking_id).await?;
                    if booking.reference != reference {
                        return Err(BookingError::validation("payment reference does not match booking"));
                    }
                }
                self.confirm(booking_id).await
            }
            // A failed charge only undoes a booking that was never paid for
            PaymentSignal::PaymentFailed { booking_id, reason } => {
                let reason = Some(format!("payment failed: {}", reason));
                self.cancel_from(booking_id, &Actor::System, reason, &[BookingStatus::Pending]).await
            }
        }
    }

    pub async fn get(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))
    }

    /// Lookup by the shareable reference code, case-insensitive
    pub async fn get_by_reference(&self, reference: &str) -> BookingResult<Booking> {
        let normalized = reference.trim().to_ascii_uppercase();
        self.store
            .get_booking_by_reference(&normalized)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", normalized)))
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_bookings_for_customer(customer_id).await?)
    }

    pub async fn list_for_schedule(&self, schedule_id: Uuid) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_bookings_for_schedule(schedule_id).await?)
    }

    /// Admin hard delete
    pub async fn delete(&self, booking_id: Uuid) -> BookingResult<()> {
        if !self.store.delete_booking(booking_id).await? {
            return Err(BookingError::NotFound(format!("booking {}", booking_id)));
        }
        warn!(booking_id = %booking_id, "Booking deleted");
        Ok(())
    }

    /// Run a conditional transition; a concurrent change surfaces as the usual state error.
    async fn apply(&self, transition: Transition) -> BookingResult<Booking> {
        let to = transition.to;
        match self.store.transition_booking(&transition).await {
            Ok(booking) => {
                self.metrics.record_transition(to.as_str(), 1);
                Ok(booking)
            }
            Err(StoreError::StatusMismatch { current, .. }) => Err(BookingError::for_transition(current, to)),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_passengers(input: &CreateBooking) -> BookingResult<()> {
    if input.passengers.len() != input.seat_numbers.len() {
        return Err(BookingError::Validation(format!(
            "{} passengers for {} seats",
            input.passengers.len(),
            input.seat_numbers.len()
        )));
    }
    for (i, passenger) in input.passengers.iter().enumerate() {
        if passenger.name.trim().is_empty() {
            return Err(BookingError::Validation(format!("passenger {} has no name", i + 1)));
        }
        if passenger.age > MAX_PASSENGER_AGE {
            return Err(BookingError::Validation(format!("passenger {} age out of range", i + 1)));
        }
    }
    Ok(())
}

fn resolve_contact(
    contact: Option<ContactInfo>,
    customer: Option<&CustomerProfile>,
    passengers: &[Passenger],
) -> BookingResult<ContactInfo> {
    let contact = match (contact, customer) {
        (Some(contact), _) => contact,
        (None, Some(CustomerProfile { email: Some(email), name, .. })) => ContactInfo {
            name: name
                .clone()
                .or_else(|| passengers.first().map(|p| p.name.clone()))
                .unwrap_or_default(),
            email: Masked::new(email.clone()),
            phone: passengers.first().map(|p| p.phone.clone()),
        },
        _ => return Err(BookingError::validation("contact name and email are required")),
    };

    if contact.name.trim().is_empty() {
        return Err(BookingError::validation("contact name is required"));
    }
    let email = contact.email.expose().trim();
    if email.is_empty() || !email.contains('@') {
        return Err(BookingError::validation("a valid contact email is required"));
    }
    Ok(contact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_input, Harness};
    use busline_core::SeatLockRepository;
    use busline_shared::{EventKind, SeatState};
    use chrono::Duration;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn test_create_converts_locks_into_booking() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[3, 4], "session-a", None).await.unwrap();

        let booking = h.manager.create(create_input(h.schedule_id, &[4, 3], "session-a"), None).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.seat_numbers, vec![3, 4]);
        assert!(booking.reference.starts_with("BL-"));
        assert_eq!(h.store.lock_rows().await, 0);
        assert_eq!(h.store.booked_seats(h.schedule_id).await.unwrap(), vec![3, 4]);

        let availability = h.seats.query_availability(h.schedule_id, None).await.unwrap();
        assert_eq!(availability.state_of(3), Some(SeatState::Booked));
        assert_eq!(availability.available_seats, 38);
        assert_eq!(h.next_event().await.kind, EventKind::BookingCreated);
    }

    #[tokio::test]
    async fn test_create_prices_booking() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1, 2], "session-a", None).await.unwrap();

        let booking = h.manager.create(create_input(h.schedule_id, &[1, 2], "session-a"), None).await.unwrap();

        // 150000 per seat
        assert_eq!(booking.price.fare, 300_000);
        assert_eq!(booking.price.convenience_fee, 15_000);
        assert_eq!(booking.price.bank_charge, 6_000);
        assert_eq!(booking.price.total, 321_000);
    }

    #[tokio::test]
    async fn test_create_requires_session_locks() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1], "session-a", None).await.unwrap();

        // Seat 2 was never locked
        let err = h.manager.create(create_input(h.schedule_id, &[1, 2], "session-a"), None).await.unwrap_err();
        assert!(matches!(err, BookingError::SeatConflict { seats } if seats == vec![2]));

        // Another session's lock is not enough
        let err = h.manager.create(create_input(h.schedule_id, &[1], "session-b"), None).await.unwrap_err();
        assert!(matches!(err, BookingError::SeatConflict { .. }));

        // Nothing was consumed by the failed attempts
        assert_eq!(h.store.lock_rows().await, 1);
    }

    #[tokio::test]
    async fn test_create_after_lock_expiry_fails() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1], "session-a", None).await.unwrap();
        h.clock.advance(Duration::minutes(16));

        let err = h.manager.create(create_input(h.schedule_id, &[1], "session-a"), None).await.unwrap_err();
        assert!(matches!(err, BookingError::SeatConflict { .. }));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let h = Harness::new().await;

        let mut mismatch = create_input(h.schedule_id, &[1, 2], "session-a");
        mismatch.passengers.pop();
        assert!(matches!(h.manager.create(mismatch, None).await, Err(BookingError::Validation(_))));

        let mut nameless = create_input(h.schedule_id, &[1], "session-a");
        nameless.passengers[0].name = " ".to_string();
        assert!(matches!(h.manager.create(nameless, None).await, Err(BookingError::Validation(_))));

        let mut too_old = create_input(h.schedule_id, &[1], "session-a");
        too_old.passengers[0].age = 121;
        assert!(matches!(h.manager.create(too_old, None).await, Err(BookingError::Validation(_))));

        let mut no_contact = create_input(h.schedule_id, &[1], "session-a");
        no_contact.contact = None;
        assert!(matches!(h.manager.create(no_contact, None).await, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_customer_contact_defaults_to_account() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[9], "session-a", None).await.unwrap();
        let mut input = create_input(h.schedule_id, &[9], "session-a");
        input.contact = None;
        let customer = CustomerProfile {
            id: "cust-1".to_string(),
            name: Some("Tran Thi B".to_string()),
            email: Some("b@example.com".to_string()),
        };

        let booking = h.manager.create(input, Some(&customer)).await.unwrap();

        assert_eq!(booking.customer_id.as_deref(), Some("cust-1"));
        assert_eq!(booking.contact.email.expose(), "b@example.com");
        assert_eq!(h.manager.list_for_customer("cust-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_refused_after_cutoff() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1], "session-a", None).await.unwrap();
        h.clock.set(h.schedule.booking_closes_at);

        let err = h.manager.create(create_input(h.schedule_id, &[1], "session-a"), None).await.unwrap_err();
        assert!(matches!(err, BookingError::ScheduleUnavailable(_)));
    }

    #[tokio::test]
    async fn test_confirm_once() {
        let h = Harness::new().await;
        let booking = h.pending_booking(&[1], "session-a").await;

        let confirmed = h.manager.confirm(booking.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.confirmed_at, Some(h.clock.now()));

        let again = h.manager.confirm(booking.id).await.unwrap_err();
        assert!(matches!(again, BookingError::AlreadyInState(BookingStatus::Confirmed)));

        let missing = h.manager.confirm(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(missing, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_releases_seats_for_rebooking() {
        let h = Harness::new().await;
        let booking = h.pending_booking(&[1, 2], "session-a").await;
        h.manager.confirm(booking.id).await.unwrap();

        let cancelled = h.manager.cancel(booking.id, &Actor::Admin, Some("duplicate".to_string())).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("duplicate"));
        assert!(cancelled.cancelled_at.is_some());

        // Freed seats can be locked and booked by someone else
        h.pending_booking(&[1, 2], "session-b").await;
    }

    #[tokio::test]
    async fn test_cancel_checks_actor_and_state() {
        let h = Harness::new().await;
        let booking = h.pending_booking(&[1], "session-a").await;

        let stranger = Actor::Customer("someone-else".to_string());
        let err = h.manager.cancel(booking.id, &stranger, None).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        h.manager.cancel(booking.id, &Actor::System, None).await.unwrap();
        let err = h.manager.cancel(booking.id, &Actor::Admin, None).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyInState(BookingStatus::Cancelled)));

        // Cancelled is terminal
        let err = h.manager.confirm(booking.id).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition { from: BookingStatus::Cancelled, to: BookingStatus::Confirmed }
        ));
    }

    #[tokio::test]
    async fn test_expire_pending_after_window() {
        let h = Harness::new().await;
        let stale = h.pending_booking(&[1], "session-a").await;
        h.clock.advance(Duration::minutes(10));
        let fresh = h.pending_booking(&[2], "session-b").await;
        h.clock.advance(Duration::minutes(6));

        let expired = h.manager.expire_pending().await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_eq!(h.manager.get(fresh.id).await.unwrap().status, BookingStatus::Pending);

        // Idempotent, and the seat is free again
        assert!(h.manager.expire_pending().await.unwrap().is_empty());
        assert_eq!(h.store.booked_seats(h.schedule_id).await.unwrap(), vec![2]);

        let err = h.manager.confirm(stale.id).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { from: BookingStatus::Expired, .. }));
    }

    #[tokio::test]
    async fn test_complete_schedule_leaves_pending() {
        let h = Harness::new().await;
        let confirmed = h.pending_booking(&[1], "session-a").await;
        h.manager.confirm(confirmed.id).await.unwrap();
        let pending = h.pending_booking(&[2], "session-b").await;

        let completed = h.manager.complete_schedule(h.schedule_id).await.unwrap();

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, BookingStatus::Completed);
        assert_eq!(h.manager.get(pending.id).await.unwrap().status, BookingStatus::Pending);
        let schedule = h.store.get_schedule(h.schedule_id).await.unwrap().unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Completed);

        // No new locks or bookings on a completed schedule
        let err = h.seats.lock(h.schedule_id, &[5], "session-c", None).await.unwrap_err();
        assert!(matches!(err, BookingError::ScheduleUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancel_schedule_cascades() {
        let h = Harness::new().await;
        let a = h.pending_booking(&[1], "session-a").await;
        let b = h.pending_booking(&[2], "session-b").await;
        h.manager.confirm(b.id).await.unwrap();
        h.seats.lock(h.schedule_id, &[3], "session-c", None).await.unwrap();

        let cancelled = h.manager.cancel_schedule(h.schedule_id, None).await.unwrap();

        assert_eq!(cancelled.len(), 2);
        assert!(cancelled.iter().all(|b| b.status == BookingStatus::Cancelled));
        assert_eq!(h.manager.get(a.id).await.unwrap().status, BookingStatus::Cancelled);
        assert!(h.store.booked_seats(h.schedule_id).await.unwrap().is_empty());
        assert_eq!(h.store.lock_rows().await, 0);
    }

    #[tokio::test]
    async fn test_payment_signals() {
        let h = Harness::new().await;
        let paid = h.pending_booking(&[1], "session-a").await;
        let failed = h.pending_booking(&[2], "session-b").await;

        let wrong_reference = PaymentSignal::PaymentSuccess { booking_id: paid.id, reference: Some("BL-NOPE0000".to_string()) };
        assert!(matches!(h.manager.handle_payment_signal(wrong_reference).await, Err(BookingError::Validation(_))));

        let confirmed = h
            .manager
            .handle_payment_signal(PaymentSignal::PaymentSuccess { booking_id: paid.id, reference: Some(paid.reference.clone()) })
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        let cancelled = h
            .manager
            .handle_payment_signal(PaymentSignal::PaymentFailed { booking_id: failed.id, reason: "card declined".to_string() })
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("payment failed: card declined"));
    }

    #[tokio::test]
    async fn test_reference_lookup_and_delete() {
        let h = Harness::new().await;
        let booking = h.pending_booking(&[1], "session-a").await;

        let found = h.manager.get_by_reference(&booking.reference.to_lowercase()).await.unwrap();
        assert_eq!(found.id, booking.id);

        h.manager.delete(booking.id).await.unwrap();
        assert!(matches!(h.manager.get(booking.id).await, Err(BookingError::NotFound(_))));
        assert!(matches!(h.manager.delete(booking.id).await, Err(BookingError::NotFound(_))));
        assert!(h.store.get_booking(booking.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reminder_lead_is_bounded() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[1], "session-a", None).await.unwrap();

        for lead in [0, -30, MAX_REMINDER_LEAD_MINUTES + 1, 1_000_000_000_000, i64::MAX] {
            let mut input = create_input(h.schedule_id, &[1], "session-a");
            input.reminder_lead_minutes = Some(lead);
            let err = h.manager.create(input, None).await.unwrap_err();
            assert!(matches!(err, BookingError::Validation(_)), "lead {} accepted", lead);
        }

        let mut input = create_input(h.schedule_id, &[1], "session-a");
        input.reminder_lead_minutes = Some(MAX_REMINDER_LEAD_MINUTES);
        let booking = h.manager.create(input, None).await.unwrap();
        assert_eq!(booking.reminder_lead_minutes, Some(MAX_REMINDER_LEAD_MINUTES));
    }

    #[tokio::test]
    async fn test_payment_failure_leaves_confirmed_booking() {
        let h = Harness::new().await;
        let booking = h.pending_booking(&[1], "session-a").await;
        h.manager.confirm(booking.id).await.unwrap();

        let late_failure = PaymentSignal::PaymentFailed { booking_id: booking.id, reason: "chargeback".to_string() };
        let err = h.manager.handle_payment_signal(late_failure).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition { from: BookingStatus::Confirmed, to: BookingStatus::Cancelled }
        ));

        let unchanged = h.manager.get(booking.id).await.unwrap();
        assert_eq!(unchanged.status, BookingStatus::Confirmed);
        assert_eq!(h.store.booked_seats(h.schedule_id).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_schedule_end_states_are_exclusive() {
        let h = Harness::new().await;
        h.manager.complete_schedule(h.schedule_id).await.unwrap();

        let err = h.manager.cancel_schedule(h.schedule_id, None).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));

        // The store refuses too, whatever the caller checked beforehand
        let err = h.store.cancel_schedule(h.schedule_id, "late", h.clock.now()).await.unwrap_err();
        assert!(matches!(BookingError::from(err), BookingError::Validation(_)));
        let schedule = h.store.get_schedule(h.schedule_id).await.unwrap().unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_schedule_close_has_one_outcome() {
        let h = Harness::new().await;
        let manager = h.manager.clone();
        let id = h.schedule_id;

        let (completed, cancelled) =
            tokio::join!(manager.complete_schedule(id), h.manager.cancel_schedule(id, None));

        assert!(completed.is_ok() ^ cancelled.is_ok());
        let schedule = h.store.get_schedule(id).await.unwrap().unwrap();
        let expected = if completed.is_ok() { ScheduleStatus::Completed } else { ScheduleStatus::Cancelled };
        assert_eq!(schedule.status, expected);
    }

    #[tokio::test]
    async fn test_full_event_queue_does_not_block_create() {
        // Capacity one and nobody reading
        let h = Harness::with_event_capacity(1).await;

        let created = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            for seat in 1..=3 {
                h.pending_booking(&[seat], &format!("session-{}", seat)).await;
            }
        })
        .await;

        assert!(created.is_ok(), "create waited on the event queue");
        assert_eq!(h.store.booked_seats(h.schedule_id).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(
            h.metrics.notification_failures.with_label_values(&["booking.created"]).get(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_on_shared_seat_have_one_winner() {
        let h = Harness::new().await;
        h.seats.lock(h.schedule_id, &[7], "session-a", None).await.unwrap();

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let manager = h.manager.clone();
            let input = create_input(h.schedule_id, &[7], "session-a");
            tasks.spawn(async move { manager.create(input, None).await });
        }

        let (mut won, mut conflicts) = (0, 0);
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => won += 1,
                Err(BookingError::SeatConflict { seats }) => {
                    assert_eq!(seats, vec![7]);
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!((won, conflicts), (1, 7));
        assert_eq!(h.store.booked_seats(h.schedule_id).await.unwrap(), vec![7]);
    }
}
