use busline_core::{BookingRepository, Clock, ScheduleRepository, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::BookingResult;
use crate::manager::BookingManager;
use crate::metrics::BookingMetrics;
use crate::notifier::NotificationService;
use crate::seats::SeatLockManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDuty {
    ExpirePending,
    StartDeparted,
    SendReminders,
    PurgeLocks,
}

impl SweepDuty {
    pub const ALL: [SweepDuty; 4] = [
        SweepDuty::ExpirePending,
        SweepDuty::StartDeparted,
        SweepDuty::SendReminders,
        SweepDuty::PurgeLocks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SweepDuty::ExpirePending => "expire_pending",
            SweepDuty::StartDeparted => "start_departed",
            SweepDuty::SendReminders => "send_reminders",
            SweepDuty::PurgeLocks => "purge_locks",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub schedules_started: usize,
    pub reminders_sent: usize,
    pub reminder_failures: usize,
    pub locks_purged: u64,
    pub failed_duties: Vec<&'static str>,
}

/// Periodic reconciliation of time-based transitions
pub struct Sweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    bookings: Arc<BookingManager>,
    seats: Arc<SeatLockManager>,
    notifier: NotificationService,
    metrics: BookingMetrics,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        bookings: Arc<BookingManager>,
        seats: Arc<SeatLockManager>,
        notifier: NotificationService,
        metrics: BookingMetrics,
    ) -> Self {
        Self { store, clock, bookings, seats, notifier, metrics }
    }

    /// Run every duty once. A failing duty is recorded and the others still run.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for duty in SweepDuty::ALL {
            let outcome = match duty {
                SweepDuty::ExpirePending => self.bookings.expire_pending().await.map(|expired| {
                    report.expired = expired.len();
                }),
                SweepDuty::StartDeparted => self.start_departed().await.map(|started| {
                    report.schedules_started = started;
                }),
                SweepDuty::SendReminders => self.send_reminders().await.map(|(sent, failed)| {
                    report.reminders_sent = sent;
                    report.reminder_failures = failed;
                }),
                SweepDuty::PurgeLocks => self.seats.purge_expired().await.map(|purged| {
                    report.locks_purged = purged;
                }),
            };

            let label = match &outcome {
                Ok(()) => "ok",
                Err(e) => {
                    error!(duty = duty.as_str(), "Sweep duty failed: {}", e);
                    report.failed_duties.push(duty.as_str());
                    "error"
                }
            };
            self.metrics.sweep_runs.with_label_values(&[duty.as_str(), label]).inc();
        }

        info!(
            expired = report.expired,
            schedules_started = report.schedules_started,
            reminders_sent = report.reminders_sent,
            reminder_failures = report.reminder_failures,
            locks_purged = report.locks_purged,
            "Sweep finished"
        );
        report
    }

    async fn start_departed(&self) -> BookingResult<usize> {
        let started = self.store.start_departed_schedules(self.clock.now()).await?;
        for schedule in &started {
            info!(schedule_id = %schedule.id, departure_at = %schedule.departure_at, "Schedule in progress");
        }
        Ok(started.len())
    }

    /// Returns (sent, failed). A failure un-stamps the booking so the next sweep retries it.
    async fn send_reminders(&self) -> BookingResult<(usize, usize)> {
        let now = self.clock.now();
        let due = self
            .store
            .due_reminders(now, self.bookings.policy().reminder_lead_minutes)
            .await?;

        let mut sent = 0;
        let mut failed = 0;
        for booking in due {
            match self.store.mark_reminder_sent(booking.id, now).await {
                Ok(true) => {}
                // Another sweeper got it first
                Ok(false) => continue,
                Err(e) => {
                    warn!(booking_id = %booking.id, "Could not claim reminder: {}", e);
                    failed += 1;
                    continue;
                }
            }

            let delivered = match self.store.get_schedule(booking.schedule_id).await {
                Ok(Some(schedule)) => self
                    .notifier
                    .send_reminder(&booking, &schedule)
                    .await
                    .map_err(|e| e.to_string()),
                Ok(None) => Err(format!("schedule {} missing", booking.schedule_id)),
                Err(e) => Err(e.to_string()),
            };

            match delivered {
                Ok(()) => sent += 1,
                Err(reason) => {
                    failed += 1;
                    warn!(booking_id = %booking.id, "Reminder not delivered, will retry: {}", reason);
                    if let Err(e) = self.store.clear_reminder_mark(booking.id).await {
                        error!(booking_id = %booking.id, "Failed to clear reminder mark: {}", e);
                    }
                }
            }
        }
        Ok((sent, failed))
    }

    /// Sweep on a fixed interval. Runs never overlap; ticks missed while a sweep is
    /// still running are skipped. A panicking run is logged and the loop keeps going.
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = every.as_secs(), "Sweeper started");
            loop {
                ticker.tick().await;
                let sweeper = self.clone();
                if let Err(e) = tokio::spawn(async move { sweeper.run_once().await }).await {
                    error!("Sweep run aborted: {}", e);
                }
            }
        })
    }
}
