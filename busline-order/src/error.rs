use busline_core::StoreError;
use busline_shared::BookingStatus;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Seats unavailable: {seats:?}")]
    SeatConflict { seats: Vec<u32> },

    #[error("Schedule unavailable: {0}")]
    ScheduleUnavailable(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Booking is already {0}")]
    AlreadyInState(BookingStatus),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl BookingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BookingError::Validation(message.into())
    }

    /// Rejection for moving a booking that currently sits in `current` to `to`.
    pub(crate) fn for_transition(current: BookingStatus, to: BookingStatus) -> Self {
        if current == to {
            BookingError::AlreadyInState(current)
        } else {
            BookingError::InvalidTransition { from: current, to }
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            // A seat the session no longer holds is, from the caller's side, a seat it cannot have
            StoreError::SeatConflict(seats) | StoreError::LockNotHeld(seats) => BookingError::SeatConflict { seats },
            StoreError::NotFound { entity, id } => BookingError::NotFound(format!("{} {}", entity, id)),
            StoreError::ScheduleStatusMismatch { current, .. } => {
                BookingError::Validation(format!("schedule is already {}", current))
            }
            other => BookingError::Store(other),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_distinguishes_repeat() {
        assert!(matches!(
            BookingError::for_transition(BookingStatus::Confirmed, BookingStatus::Confirmed),
            BookingError::AlreadyInState(BookingStatus::Confirmed)
        ));
        assert!(matches!(
            BookingError::for_transition(BookingStatus::Expired, BookingStatus::Confirmed),
            BookingError::InvalidTransition { from: BookingStatus::Expired, to: BookingStatus::Confirmed }
        ));
    }

    #[test]
    fn test_lock_not_held_surfaces_as_conflict() {
        let err: BookingError = StoreError::LockNotHeld(vec![4, 5]).into();
        assert!(matches!(err, BookingError::SeatConflict { seats } if seats == vec![4, 5]));
    }
}
