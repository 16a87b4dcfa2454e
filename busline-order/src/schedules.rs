use busline_catalog::{NewSchedule, ScheduleError};
use busline_core::{Clock, ScheduleRepository, Store};
use busline_shared::{Schedule, ScheduleStatus};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::policy::BookingPolicy;

/// Admin-side schedule registry
pub struct ScheduleManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl ScheduleManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: BookingPolicy) -> Self {
        Self { store, clock, policy }
    }

    pub async fn create(&self, input: NewSchedule) -> BookingResult<Schedule> {
        let schedule = input
            .into_schedule(self.policy.booking_cutoff, self.clock.now())
            .map_err(|ScheduleError::Invalid(msg)| BookingError::Validation(msg))?;
        self.store.insert_schedule(&schedule).await?;
        info!(
            schedule_id = %schedule.id,
            route = %format!("{} -> {}", schedule.departure_city, schedule.arrival_city),
            departure_at = %schedule.departure_at,
            "Schedule created"
        );
        Ok(schedule)
    }

    pub async fn get(&self, schedule_id: Uuid) -> BookingResult<Schedule> {
        self.store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))
    }

    pub async fn list(&self, status: Option<ScheduleStatus>) -> BookingResult<Vec<Schedule>> {
        Ok(self.store.list_schedules(status).await?)
    }
}
