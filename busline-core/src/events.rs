use async_trait::async_trait;
use busline_shared::BookingEvent;

/// Subscriber side of the booking event bus.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(
        &self,
        event: &BookingEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
