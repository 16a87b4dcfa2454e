use async_trait::async_trait;
use busline_core::EventSink;
use busline_shared::BookingEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::metrics::BookingMetrics;

/// Fans committed booking events out to every subscribed sink.
///
/// A failing sink is logged and skipped; the transition that produced the event has
/// already been committed and is never rolled back.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub async fn publish(&self, event: BookingEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.publish(&event).await {
                warn!(
                    sink = sink.name(),
                    kind = event.kind.as_str(),
                    booking_id = %event.booking.id,
                    "Failed to publish booking event: {}",
                    e
                );
            }
        }
    }

    pub async fn publish_all(&self, events: impl IntoIterator<Item = BookingEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }
}

/// Hands events to an in-process consumer (the notification worker).
///
/// Never waits for queue space: when the worker is behind, the event is dropped and
/// counted as a notification failure.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<BookingEvent>,
    metrics: Option<BookingMetrics>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<BookingEvent>) -> Self {
        Self { sender, metrics: None }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BookingEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn with_metrics(mut self, metrics: BookingMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.notification_failures.with_label_values(&[event.kind.as_str()]).inc();
                }
                Err("notification queue is full".into())
            }
            Err(TrySendError::Closed(_)) => Err("notification worker has stopped".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_booking;
    use chrono::Utc;

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_waiting() {
        let metrics = BookingMetrics::new().unwrap();
        let (sink, mut rx) = ChannelSink::channel(1);
        let bus = EventBus::new().with_sink(Arc::new(sink.with_metrics(metrics.clone())));

        let publishing = async {
            bus.publish(BookingEvent::created(sample_booking(), Utc::now())).await;
            bus.publish(BookingEvent::confirmed(sample_booking(), Utc::now())).await;
        };
        tokio::time::timeout(std::time::Duration::from_secs(1), publishing)
            .await
            .expect("publish must not wait for the consumer");

        let dropped = metrics.notification_failures.with_label_values(&["booking.confirmed"]).get();
        assert_eq!(dropped, 1);
        assert_eq!(rx.recv().await.unwrap().kind.as_str(), "booking.created");
    }
}
