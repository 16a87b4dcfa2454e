use busline_catalog::{PricingConfig, PricingEngine};
use busline_core::{Clock, EventSink, NotificationDispatcher, Store};
use busline_order::{
    BookingManager, BookingMetrics, BookingPolicy, ChannelSink, EventBus, NotificationService, ScheduleManager,
    SeatLockManager, Sweeper,
};
use busline_order::policy::MAX_REMINDER_LEAD_MINUTES;
use busline_shared::BookingEvent;
use busline_store::app_config::{BookingRules, Config};
use busline_store::RedisClient;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 1024;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub webhook_secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingManager>,
    pub seats: Arc<SeatLockManager>,
    pub schedules: Arc<ScheduleManager>,
    pub sweeper: Arc<Sweeper>,
    pub metrics: BookingMetrics,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit_per_minute: i64,
    pub auth: AuthConfig,
}

/// Background pieces handed to `worker::spawn`
pub struct Workers {
    pub notifier: NotificationService,
    pub events: mpsc::Receiver<BookingEvent>,
}

pub fn booking_policy(rules: &BookingRules) -> BookingPolicy {
    BookingPolicy {
        lock_ttl_default: Duration::minutes(rules.lock_minutes_default),
        lock_ttl_min: Duration::minutes(rules.lock_minutes_min),
        lock_ttl_max: Duration::minutes(rules.lock_minutes_max),
        payment_window: Duration::minutes(rules.payment_window_minutes),
        reminder_lead_minutes: rules.reminder_lead_minutes.clamp(1, MAX_REMINDER_LEAD_MINUTES),
        booking_cutoff: Duration::minutes(rules.booking_cutoff_minutes),
    }
}

pub fn pricing_config(rules: &BookingRules) -> PricingConfig {
    PricingConfig {
        convenience_fee_bps: rules.convenience_fee_bps,
        bank_charge_bps: rules.bank_charge_bps,
        minimum_total: rules.minimum_total,
        currency: rules.currency.clone(),
        ..PricingConfig::default()
    }
}

impl AppState {
    /// Wire the booking core onto a store. `sinks` receive every booking event in
    /// addition to the in-process notification channel.
    pub fn assemble(
        config: &Config,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        sinks: Vec<Arc<dyn EventSink>>,
        redis: Option<Arc<RedisClient>>,
    ) -> anyhow::Result<(Self, Workers)> {
        let metrics = BookingMetrics::new()?;
        let policy = booking_policy(&config.booking_rules);

        let (channel, events) = ChannelSink::channel(EVENT_BUFFER);
        let channel = channel.with_metrics(metrics.clone());
        let bus = sinks
            .into_iter()
            .fold(EventBus::new().with_sink(Arc::new(channel)), |bus, sink| bus.with_sink(sink));

        let seats = Arc::new(SeatLockManager::new(store.clone(), clock.clone(), policy.clone(), metrics.clone()));
        let bookings = Arc::new(BookingManager::new(
            store.clone(),
            clock.clone(),
            PricingEngine::new(pricing_config(&config.booking_rules)),
            policy.clone(),
            bus,
            metrics.clone(),
        ));
        let schedules = Arc::new(ScheduleManager::new(store.clone(), clock.clone(), policy));

        let notifier = NotificationService::new(
            dispatcher,
            std::time::Duration::from_secs(config.notifications.timeout_seconds),
            metrics.clone(),
        );
        let sweeper = Arc::new(Sweeper::new(
            store,
            clock,
            bookings.clone(),
            seats.clone(),
            notifier.clone(),
            metrics.clone(),
        ));

        let state = AppState {
            bookings,
            seats,
            schedules,
            sweeper,
            metrics,
            redis,
            rate_limit_per_minute: config.redis.rate_limit_per_minute,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
                webhook_secret: config.auth.webhook_secret.clone(),
            },
        };

        Ok((state, Workers { notifier, events }))
    }
}
