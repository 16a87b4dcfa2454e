use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for the booking core, registered on their own registry so that several
/// instances (tests, embedded use) never collide.
#[derive(Clone)]
pub struct BookingMetrics {
    registry: Registry,
    pub transitions: IntCounterVec,
    pub seat_conflicts: IntCounter,
    pub notification_failures: IntCounterVec,
    pub sweep_runs: IntCounterVec,
}

impl BookingMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("busline".to_string()), None)?;

        let transitions = IntCounterVec::new(
            Opts::new("booking_transitions_total", "Booking state transitions"),
            &["status"],
        )?;
        let seat_conflicts = IntCounter::new("seat_conflicts_total", "Seat lock or booking requests refused for taken seats")?;
        let notification_failures = IntCounterVec::new(
            Opts::new("notification_failures_total", "Notifications that could not be delivered"),
            &["kind"],
        )?;
        let sweep_runs = IntCounterVec::new(
            Opts::new("sweep_duty_runs_total", "Sweeper duty executions"),
            &["duty", "outcome"],
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(seat_conflicts.clone()))?;
        registry.register(Box::new(notification_failures.clone()))?;
        registry.register(Box::new(sweep_runs.clone()))?;

        Ok(Self { registry, transitions, seat_conflicts, notification_failures, sweep_runs })
    }

    pub fn record_transition(&self, status: &str, count: usize) {
        self.transitions.with_label_values(&[status]).inc_by(count as u64);
    }

    /// Prometheus text exposition
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_namespace() {
        let metrics = BookingMetrics::new().unwrap();
        metrics.record_transition("confirmed", 2);
        metrics.seat_conflicts.inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("busline_booking_transitions_total{status=\"confirmed\"} 2"));
        assert!(text.contains("busline_seat_conflicts_total 1"));
    }
}
