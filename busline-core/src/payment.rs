use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome reported by the payment gateway for a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentSignal {
    PaymentSuccess {
        booking_id: Uuid,
        #[serde(default)]
        reference: Option<String>,
    },
    PaymentFailed {
        booking_id: Uuid,
        reason: String,
    },
}

impl PaymentSignal {
    pub fn booking_id(&self) -> Uuid {
        match self {
            PaymentSignal::PaymentSuccess { booking_id, .. } => *booking_id,
            PaymentSignal::PaymentFailed { booking_id, .. } => *booking_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gateway_payload() {
        let id = Uuid::new_v4();
        let json = serde_json::json!({"type": "PAYMENT_FAILED", "booking_id": id, "reason": "card declined"});
        let signal: PaymentSignal = serde_json::from_value(json).unwrap();
        assert_eq!(
            signal,
            PaymentSignal::PaymentFailed { booking_id: id, reason: "card declined".to_string() }
        );
        assert_eq!(signal.booking_id(), id);
    }
}
