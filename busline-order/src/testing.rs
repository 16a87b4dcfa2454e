use async_trait::async_trait;
use busline_catalog::PricingEngine;
use busline_core::{Clock, DispatchError, EmailMessage, ManualClock, NotificationDispatcher, ScheduleRepository, Store};
use busline_shared::{
    Booking, BookingEvent, BookingStatus, ContactInfo, Gender, Masked, Passenger, PriceBreakdown, Schedule,
    ScheduleStatus,
};
use busline_store::MemoryStore;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{ChannelSink, EventBus};
use crate::manager::{BookingManager, CreateBooking};
use crate::metrics::BookingMetrics;
use crate::notifier::NotificationService;
use crate::policy::BookingPolicy;
use crate::seats::SeatLockManager;
use crate::sweeper::Sweeper;

/// Dispatcher that keeps what it was asked to send
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Provider("smtp unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn passenger(seat: u32) -> Passenger {
    Passenger {
        name: format!("Passenger {}", seat),
        age: 30,
        gender: Gender::Other,
        phone: Masked::from("+84900000000"),
        email: None,
    }
}

pub fn create_input(schedule_id: Uuid, seats: &[u32], session: &str) -> CreateBooking {
    CreateBooking {
        schedule_id,
        session_id: session.to_string(),
        seat_numbers: seats.to_vec(),
        passengers: seats.iter().map(|s| passenger(*s)).collect(),
        contact: Some(ContactInfo {
            name: "Nguyen Van A".to_string(),
            email: Masked::from("guest@example.com"),
            phone: None,
        }),
        reminder_lead_minutes: None,
    }
}

pub fn sample_booking() -> Booking {
    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        reference: "BL-TEST2345".to_string(),
        customer_id: None,
        contact: ContactInfo {
            name: "Nguyen Van A".to_string(),
            email: Masked::from("guest@example.com"),
            phone: None,
        },
        schedule_id: Uuid::new_v4(),
        session_id: "session-a".to_string(),
        seat_numbers: vec![1, 2],
        passengers: vec![passenger(1), passenger(2)],
        price: PriceBreakdown {
            fare: 300_000,
            convenience_fee: 15_000,
            bank_charge: 6_000,
            total: 321_000,
            currency: "VND".to_string(),
        },
        status: BookingStatus::Pending,
        reminder_lead_minutes: None,
        created_at: now,
        updated_at: now,
        confirmed_at: None,
        cancelled_at: None,
        cancellation_reason: None,
        expired_at: None,
        completed_at: None,
        reminder_sent_at: None,
    }
}

/// In-memory store, manual clock and one bookable 40-seat schedule departing in two days
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub metrics: BookingMetrics,
    pub seats: Arc<SeatLockManager>,
    pub manager: Arc<BookingManager>,
    pub schedule: Schedule,
    pub schedule_id: Uuid,
    events: tokio::sync::Mutex<mpsc::Receiver<BookingEvent>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_event_capacity(256).await
    }

    /// Nothing drains the event channel unless a test calls `next_event`
    pub async fn with_event_capacity(capacity: usize) -> Self {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let metrics = BookingMetrics::new().unwrap();
        let policy = BookingPolicy::default();

        let schedule = Schedule {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            departure_city: "Hanoi".to_string(),
            arrival_city: "Hai Phong".to_string(),
            departure_at: now + Duration::days(2),
            arrival_at: now + Duration::days(2) + Duration::hours(2),
            total_seats: 40,
            price_per_seat: 150_000,
            booking_closes_at: now + Duration::days(2) - Duration::minutes(30),
            status: ScheduleStatus::Scheduled,
            created_at: now,
        };
        store.insert_schedule(&schedule).await.unwrap();

        let (sink, rx) = ChannelSink::channel(capacity);
        let events = EventBus::new().with_sink(Arc::new(sink.with_metrics(metrics.clone())));
        let dyn_store: Arc<dyn Store> = store.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let seats = Arc::new(SeatLockManager::new(dyn_store.clone(), dyn_clock.clone(), policy.clone(), metrics.clone()));
        let manager = Arc::new(BookingManager::new(
            dyn_store,
            dyn_clock,
            PricingEngine::default(),
            policy,
            events,
            metrics.clone(),
        ));

        Self {
            store,
            clock,
            metrics,
            seats,
            manager,
            schedule_id: schedule.id,
            schedule,
            events: tokio::sync::Mutex::new(rx),
        }
    }

    /// Lock the seats for the session and book them
    pub async fn pending_booking(&self, seats: &[u32], session: &str) -> Booking {
        self.seats.lock(self.schedule_id, seats, session, None).await.unwrap();
        self.manager.create(create_input(self.schedule_id, seats, session), None).await.unwrap()
    }

    pub async fn next_event(&self) -> BookingEvent {
        self.events.lock().await.recv().await.unwrap()
    }

    pub fn sweeper(&self, dispatcher: Arc<dyn NotificationDispatcher>) -> Sweeper {
        let notifier = NotificationService::new(dispatcher, std::time::Duration::from_secs(5), self.metrics.clone());
        Sweeper::new(
            self.store.clone(),
            self.clock.clone(),
            self.manager.clone(),
            self.seats.clone(),
            notifier,
            self.metrics.clone(),
        )
    }
}
