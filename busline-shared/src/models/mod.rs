pub mod booking;
pub mod events;
pub mod schedule;
pub mod seat;
