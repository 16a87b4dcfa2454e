use busline_core::{DispatchError, EmailMessage, NotificationDispatcher};
use busline_shared::{Booking, BookingEvent, EventKind, Schedule};
use html_escape::encode_text;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::metrics::BookingMetrics;

/// Turns booking events into customer email.
///
/// Every send is bounded by `timeout`. Failures are logged and counted here and never
/// travel back to the transition that produced the event.
#[derive(Clone)]
pub struct NotificationService {
    dispatcher: Arc<dyn NotificationDispatcher>,
    timeout: Duration,
    metrics: BookingMetrics,
}

impl NotificationService {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, timeout: Duration, metrics: BookingMetrics) -> Self {
        Self { dispatcher, timeout, metrics }
    }

    /// Consume events until every sender is gone
    pub async fn run(self, mut events: mpsc::Receiver<BookingEvent>) {
        info!(provider = self.dispatcher.name(), "Notification worker started");
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        info!("Notification worker stopped");
    }

    pub async fn handle(&self, event: &BookingEvent) {
        let Some(message) = render_event(event) else {
            return;
        };
        if let Err(e) = self.dispatch(&message).await {
            self.metrics
                .notification_failures
                .with_label_values(&[event.kind.as_str()])
                .inc();
            error!(
                booking_id = %event.booking.id,
                kind = event.kind.as_str(),
                provider = self.dispatcher.name(),
                "Notification failed: {}",
                e
            );
        }
    }

    /// Unlike event mail, reminder failures are returned so the sweeper can retry them.
    pub async fn send_reminder(&self, booking: &Booking, schedule: &Schedule) -> Result<(), DispatchError> {
        let result = self.dispatch(&render_reminder(booking, schedule)).await;
        if result.is_err() {
            self.metrics.notification_failures.with_label_values(&["booking.reminder"]).inc();
        }
        result
    }

    async fn dispatch(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        match tokio::time::timeout(self.timeout, self.dispatcher.send(message)).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!(subject = %message.subject, "Notification sent");
                }
                result
            }
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        }
    }
}

fn seat_list(booking: &Booking) -> String {
    booking
        .seat_numbers
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `None` for events that do not warrant an email
pub fn render_event(event: &BookingEvent) -> Option<EmailMessage> {
    let booking = &event.booking;
    let (subject, body) = match event.kind {
        EventKind::BookingCreated => (
            format!("Booking {} received", booking.reference),
            format!(
                "<p>We are holding seats {} for you.</p><p>Total due: {} {}. Please complete payment to confirm.</p>",
                seat_list(booking),
                booking.price.total,
                booking.price.currency
            ),
        ),
        EventKind::BookingConfirmed => (
            format!("Booking {} confirmed", booking.reference),
            format!(
                "<p>Your booking is confirmed. Seats: {}.</p><p>Amount paid: {} {}.</p>",
                seat_list(booking),
                booking.price.total,
                booking.price.currency
            ),
        ),
        EventKind::BookingCancelled => (
            format!("Booking {} cancelled", booking.reference),
            format!(
                "<p>Your booking has been cancelled.</p><p>Reason: {}</p>",
                encode_text(booking.cancellation_reason.as_deref().unwrap_or("not given"))
            ),
        ),
        EventKind::BookingExpired => (
            format!("Booking {} expired", booking.reference),
            "<p>We did not receive payment in time and the seats have been released.</p>".to_string(),
        ),
        EventKind::BookingCompleted => return None,
    };

    Some(EmailMessage {
        to: booking.contact.email.expose().clone(),
        subject,
        html_body: format!("<p>Hello {},</p>{}", encode_text(&booking.contact.name), body),
    })
}

pub fn render_reminder(booking: &Booking, schedule: &Schedule) -> EmailMessage {
    EmailMessage {
        to: booking.contact.email.expose().clone(),
        subject: format!(
            "Trip reminder: {} to {} on {}",
            schedule.departure_city,
            schedule.arrival_city,
            schedule.departure_at.format("%Y-%m-%d %H:%M UTC")
        ),
        html_body: format!(
            "<p>Hello {},</p><p>Your bus departs from {} at {}. Booking {}, seats {}.</p>",
            encode_text(&booking.contact.name),
            encode_text(&schedule.departure_city),
            schedule.departure_at.format("%Y-%m-%d %H:%M UTC"),
            booking.reference,
            seat_list(booking)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_booking, RecordingDispatcher};
    use async_trait::async_trait;
    use chrono::Utc;

    struct SlowDispatcher;

    #[async_trait]
    impl NotificationDispatcher for SlowDispatcher {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn send(&self, _message: &EmailMessage) -> Result<(), DispatchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_event_mail_goes_to_contact() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let metrics = BookingMetrics::new().unwrap();
        let service = NotificationService::new(dispatcher.clone(), Duration::from_secs(5), metrics);

        let booking = sample_booking();
        service.handle(&BookingEvent::confirmed(booking.clone(), Utc::now())).await;
        service.handle(&BookingEvent::completed(booking.clone(), Utc::now())).await;

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "guest@example.com");
        assert!(sent[0].subject.contains(&booking.reference));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_counted_not_raised() {
        let metrics = BookingMetrics::new().unwrap();
        let service = NotificationService::new(Arc::new(SlowDispatcher), Duration::from_secs(45), metrics.clone());

        service.handle(&BookingEvent::created(sample_booking(), Utc::now())).await;

        let failures = metrics.notification_failures.with_label_values(&["booking.created"]).get();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_worker_drains_channel() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let service = NotificationService::new(dispatcher.clone(), Duration::from_secs(5), BookingMetrics::new().unwrap());
        let (tx, rx) = mpsc::channel(8);

        let worker = tokio::spawn(service.run(rx));
        tx.send(BookingEvent::created(sample_booking(), Utc::now())).await.unwrap();
        tx.send(BookingEvent::expired(sample_booking(), Utc::now())).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        assert_eq!(dispatcher.sent().len(), 2);
    }

    #[test]
    fn test_customer_text_is_escaped() {
        let mut booking = sample_booking();
        booking.contact.name = "<script>alert(1)</script>".to_string();
        booking.cancellation_reason = Some("<b>Tom & Jerry</b>".to_string());

        let message = render_event(&BookingEvent::cancelled(booking, Utc::now())).unwrap();

        assert!(!message.html_body.contains("<script>"));
        assert!(!message.html_body.contains("<b>"));
        assert!(message.html_body.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(message.html_body.contains("&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;"));
    }
}
