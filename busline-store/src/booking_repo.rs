use async_trait::async_trait;
use busline_core::repository::{
    BookingRepository, LockRequest, ScheduleRepository, SeatLockRepository, Transition,
};
use busline_core::{StoreError, StoreResult};
use busline_shared::{
    Booking, BookingStatus, ContactInfo, Passenger, PriceBreakdown, Schedule, ScheduleStatus, SeatLock,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use uuid::Uuid;

const SCHEDULE_COLUMNS: &str = "id, route_id, bus_id, departure_city, arrival_city, departure_at, arrival_at, \
     total_seats, price_per_seat, booking_closes_at, status, created_at";

const BOOKING_COLUMNS: &str = "id, reference, customer_id, contact, schedule_id, session_id, seat_numbers, \
     passengers, fare, convenience_fee, bank_charge, total, currency, status, reminder_lead_minutes, \
     created_at, updated_at, confirmed_at, cancelled_at, cancellation_reason, expired_at, completed_at, \
     reminder_sent_at";

const LOCK_COLUMNS: &str = "schedule_id, seat_number, session_id, expires_at, created_at";

/// Upper bound on a reminder lead, keeps the interval arithmetic inside `int`.
const MAX_REMINDER_WINDOW_MINUTES: i64 = 30 * 24 * 60;

/// Postgres-backed repository for schedules, seat locks and bookings.
///
/// Seat exclusivity rests on two primary keys: `seat_locks (schedule_id, seat_number)` and
/// `booking_seats (schedule_id, seat_number)`. Multi-row changes run in one transaction.
#[derive(Clone)]
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> StoreResult<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(db_err)
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    route_id: Uuid,
    bus_id: Uuid,
    departure_city: String,
    arrival_city: String,
    departure_at: DateTime<Utc>,
    arrival_at: DateTime<Utc>,
    total_seats: i32,
    price_per_seat: i64,
    booking_closes_at: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            id: row.id,
            route_id: row.route_id,
            bus_id: row.bus_id,
            departure_city: row.departure_city,
            arrival_city: row.arrival_city,
            departure_at: row.departure_at,
            arrival_at: row.arrival_at,
            total_seats: row.total_seats.max(0) as u32,
            price_per_seat: row.price_per_seat,
            booking_closes_at: row.booking_closes_at,
            status: row.status.parse::<ScheduleStatus>().map_err(StoreError::Database)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatLockRow {
    schedule_id: Uuid,
    seat_number: i32,
    session_id: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SeatLockRow> for SeatLock {
    fn from(row: SeatLockRow) -> Self {
        SeatLock {
            schedule_id: row.schedule_id,
            seat_number: row.seat_number.max(0) as u32,
            session_id: row.session_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    customer_id: Option<String>,
    contact: Json<ContactInfo>,
    schedule_id: Uuid,
    session_id: String,
    seat_numbers: Vec<i32>,
    passengers: Json<Vec<Passenger>>,
    fare: i64,
    convenience_fee: i64,
    bank_charge: i64,
    total: i64,
    currency: String,
    status: String,
    reminder_lead_minutes: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    expired_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    reminder_sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            customer_id: row.customer_id,
            contact: row.contact.0,
            schedule_id: row.schedule_id,
            session_id: row.session_id,
            seat_numbers: row.seat_numbers.into_iter().map(|s| s.max(0) as u32).collect(),
            passengers: row.passengers.0,
            price: PriceBreakdown {
                fare: row.fare,
                convenience_fee: row.convenience_fee,
                bank_charge: row.bank_charge,
                total: row.total,
                currency: row.currency,
            },
            status: row.status.parse::<BookingStatus>().map_err(StoreError::Database)?,
            reminder_lead_minutes: row.reminder_lead_minutes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            confirmed_at: row.confirmed_at,
            cancelled_at: row.cancelled_at,
            cancellation_reason: row.cancellation_reason,
            expired_at: row.expired_at,
            completed_at: row.completed_at,
            reminder_sent_at: row.reminder_sent_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn seat_params(seats: &[u32]) -> Vec<i32> {
    seats.iter().map(|s| *s as i32).collect()
}

/// Why a guarded schedule update touched no row
async fn schedule_refusal(tx: &mut Transaction<'_, Postgres>, schedule_id: Uuid) -> StoreResult<StoreError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM schedules WHERE id = $1")
        .bind(schedule_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(match status {
        None => StoreError::not_found("schedule", schedule_id),
        Some(raw) => {
            let current = raw.parse::<ScheduleStatus>().map_err(StoreError::Database)?;
            StoreError::ScheduleStatusMismatch { id: schedule_id, current }
        }
    })
}

pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn release_claims(tx: &mut Transaction<'_, Postgres>, booking_ids: &[Uuid]) -> StoreResult<()> {
    if booking_ids.is_empty() {
        return Ok(());
    }
    sqlx::query("DELETE FROM booking_seats WHERE booking_id = ANY($1)")
        .bind(booking_ids)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl ScheduleRepository for PgBookingRepository {
    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (id, route_id, bus_id, departure_city, arrival_city, departure_at, arrival_at,
                                   total_seats, price_per_seat, booking_closes_at, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.route_id)
        .bind(schedule.bus_id)
        .bind(&schedule.departure_city)
        .bind(&schedule.arrival_city)
        .bind(schedule.departure_at)
        .bind(schedule.arrival_at)
        .bind(schedule.total_seats as i32)
        .bind(schedule.price_per_seat)
        .bind(schedule.booking_closes_at)
        .bind(schedule.status.as_str())
        .bind(schedule.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let row: Option<ScheduleRow> =
            sqlx::query_as(&format!("SELECT {} FROM schedules WHERE id = $1", SCHEDULE_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Schedule::try_from).transpose()
    }

    async fn list_schedules(&self, status: Option<ScheduleStatus>) -> StoreResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM schedules WHERE ($1::text IS NULL OR status = $1) ORDER BY departure_at",
            SCHEDULE_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn set_schedule_status(&self, id: Uuid, status: ScheduleStatus) -> StoreResult<Schedule> {
        let row: Option<ScheduleRow> = sqlx::query_as(&format!(
            "UPDATE schedules SET status = $2 WHERE id = $1 RETURNING {}",
            SCHEDULE_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.ok_or_else(|| StoreError::not_found("schedule", id))?.try_into()
    }

    async fn start_departed_schedules(&self, now: DateTime<Utc>) -> StoreResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            r#"
            UPDATE schedules SET status = 'IN_PROGRESS'
            WHERE status = 'SCHEDULED' AND departure_at <= $1
            RETURNING {}
            "#,
            SCHEDULE_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut started = rows.into_iter().map(Schedule::try_from).collect::<StoreResult<Vec<_>>>()?;
        started.sort_by_key(|s| s.departure_at);
        Ok(started)
    }
}

#[async_trait]
impl SeatLockRepository for PgBookingRepository {
    async fn acquire_locks(&self, request: &LockRequest, now: DateTime<Utc>) -> StoreResult<Vec<SeatLock>> {
        let seats = seat_params(&request.seat_numbers);
        let mut tx = self.begin().await?;

        let booked: Vec<i32> = sqlx::query_scalar(
            "SELECT seat_number FROM booking_seats WHERE schedule_id = $1 AND seat_number = ANY($2)",
        )
        .bind(request.schedule_id)
        .bind(&seats)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        // The conditional upsert is the race guard: a row owned by another session is only
        // taken over once it has expired.
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO seat_locks (schedule_id, seat_number, session_id, expires_at, created_at)
            SELECT $1, seat, $3, $4, $5 FROM UNNEST($2::int[]) AS seat
            ON CONFLICT (schedule_id, seat_number) DO UPDATE
                SET session_id = EXCLUDED.session_id,
                    expires_at = EXCLUDED.expires_at,
                    created_at = CASE
                        WHEN seat_locks.session_id = EXCLUDED.session_id AND seat_locks.expires_at > $5
                        THEN seat_locks.created_at
                        ELSE EXCLUDED.created_at
                    END
                WHERE seat_locks.session_id = EXCLUDED.session_id OR seat_locks.expires_at <= $5
            RETURNING {}
            "#,
            LOCK_COLUMNS
        ))
        .bind(request.schedule_id)
        .bind(&seats)
        .bind(&request.session_id)
        .bind(request.expires_at)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let granted: BTreeSet<i32> = rows.iter().map(|r| r.seat_number).collect();
        let conflicts: BTreeSet<u32> = seats
            .iter()
            .filter(|s| !granted.contains(s) || booked.contains(s))
            .map(|s| *s as u32)
            .collect();

        if !conflicts.is_empty() {
            tx.rollback().await.map_err(db_err)?;
            return Err(StoreError::SeatConflict(conflicts.into_iter().collect()));
        }

        tx.commit().await.map_err(db_err)?;
        let mut locks: Vec<SeatLock> = rows.into_iter().map(SeatLock::from).collect();
        locks.sort_by_key(|l| l.seat_number);
        Ok(locks)
    }

    async fn release_locks(&self, schedule_id: Uuid, session_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_locks WHERE schedule_id = $1 AND session_id = $2")
            .bind(schedule_id)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn extend_locks(
        &self,
        schedule_id: Uuid,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SeatLock>> {
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            r#"
            UPDATE seat_locks SET expires_at = $3
            WHERE schedule_id = $1 AND session_id = $2 AND expires_at > $4
            RETURNING {}
            "#,
            LOCK_COLUMNS
        ))
        .bind(schedule_id)
        .bind(session_id)
        .bind(expires_at)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut locks: Vec<SeatLock> = rows.into_iter().map(SeatLock::from).collect();
        locks.sort_by_key(|l| l.seat_number);
        Ok(locks)
    }

    async fn active_locks(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<SeatLock>> {
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seat_locks WHERE schedule_id = $1 AND expires_at > $2 ORDER BY seat_number",
            LOCK_COLUMNS
        ))
        .bind(schedule_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(SeatLock::from).collect())
    }

    async fn booked_seats(&self, schedule_id: Uuid) -> StoreResult<Vec<u32>> {
        let seats: Vec<i32> = sqlx::query_scalar(
            "SELECT seat_number FROM booking_seats WHERE schedule_id = $1 ORDER BY seat_number",
        )
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(seats.into_iter().map(|s| s.max(0) as u32).collect())
    }

    async fn purge_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_locks WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_booking(&self, booking: &Booking, now: DateTime<Utc>) -> StoreResult<()> {
        let seats = seat_params(&booking.seat_numbers);
        let mut tx = self.begin().await?;

        let booked: Vec<i32> = sqlx::query_scalar(
            "SELECT seat_number FROM booking_seats WHERE schedule_id = $1 AND seat_number = ANY($2) ORDER BY seat_number",
        )
        .bind(booking.schedule_id)
        .bind(&seats)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        if !booked.is_empty() {
            tx.rollback().await.map_err(db_err)?;
            return Err(StoreError::SeatConflict(booked.into_iter().map(|s| s as u32).collect()));
        }

        // Consuming the locks converts them into the booking's claims
        let consumed: Vec<i32> = sqlx::query_scalar(
            r#"
            DELETE FROM seat_locks
            WHERE schedule_id = $1 AND session_id = $2 AND seat_number = ANY($3) AND expires_at > $4
            RETURNING seat_number
            "#,
        )
        .bind(booking.schedule_id)
        .bind(&booking.session_id)
        .bind(&seats)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let missing: Vec<u32> = seats
            .iter()
            .filter(|s| !consumed.contains(s))
            .map(|s| *s as u32)
            .collect();
        if !missing.is_empty() {
            tx.rollback().await.map_err(db_err)?;
            return Err(StoreError::LockNotHeld(missing));
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (id, reference, customer_id, contact, schedule_id, session_id, seat_numbers,
                                  passengers, fare, convenience_fee, bank_charge, total, currency, status,
                                  reminder_lead_minutes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(&booking.customer_id)
        .bind(Json(&booking.contact))
        .bind(booking.schedule_id)
        .bind(&booking.session_id)
        .bind(&seats)
        .bind(Json(&booking.passengers))
        .bind(booking.price.fare)
        .bind(booking.price.convenience_fee)
        .bind(booking.price.bank_charge)
        .bind(booking.price.total)
        .bind(&booking.price.currency)
        .bind(booking.status.as_str())
        .bind(booking.reminder_lead_minutes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO booking_seats (schedule_id, seat_number, booking_id)
            SELECT $1, seat, $3 FROM UNNEST($2::int[]) AS seat
            "#,
        )
        .bind(booking.schedule_id)
        .bind(&seats)
        .bind(booking.id)
        .execute(&mut *tx)
        .await;

        if let Err(err) = claimed {
            tx.rollback().await.map_err(db_err)?;
            if is_unique_violation(&err) {
                return Err(StoreError::SeatConflict(booking.seat_numbers.clone()));
            }
            return Err(db_err(err));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn get_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE reference = $1", BOOKING_COLUMNS))
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE customer_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_bookings(rows)
    }

    async fn list_bookings_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE schedule_id = $1 ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_bookings(rows)
    }

    async fn transition_booking(&self, transition: &Transition) -> StoreResult<Booking> {
        let from: Vec<String> = transition.from.iter().map(|s| s.as_str().to_string()).collect();
        let mut tx = self.begin().await?;

        let row: Option<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET
                status = $2::text,
                updated_at = $3,
                confirmed_at = CASE WHEN $2::text = 'confirmed' THEN $3 ELSE confirmed_at END,
                cancelled_at = CASE WHEN $2::text = 'cancelled' THEN $3 ELSE cancelled_at END,
                expired_at = CASE WHEN $2::text = 'expired' THEN $3 ELSE expired_at END,
                completed_at = CASE WHEN $2::text = 'completed' THEN $3 ELSE completed_at END,
                cancellation_reason = COALESCE($5, cancellation_reason)
            WHERE id = $1 AND status = ANY($4)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(transition.booking_id)
        .bind(transition.to.as_str())
        .bind(transition.at)
        .bind(&from)
        .bind(&transition.reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
                .bind(transition.booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.rollback().await.map_err(db_err)?;
            return match current {
                None => Err(StoreError::not_found("booking", transition.booking_id)),
                Some(status) => Err(StoreError::StatusMismatch {
                    id: transition.booking_id,
                    current: status.parse::<BookingStatus>().map_err(StoreError::Database)?,
                }),
            };
        };

        if transition.release_seats {
            release_claims(&mut tx, &[transition.booking_id]).await?;
        }
        tx.commit().await.map_err(db_err)?;
        row.try_into()
    }

    async fn expire_pending(&self, created_before: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut tx = self.begin().await?;
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET status = 'expired', expired_at = $2, updated_at = $2
            WHERE status = 'pending' AND created_at <= $1
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(created_before)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        release_claims(&mut tx, &ids).await?;
        tx.commit().await.map_err(db_err)?;
        into_bookings(rows)
    }

    async fn complete_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut tx = self.begin().await?;
        let updated = sqlx::query(
            "UPDATE schedules SET status = 'COMPLETED' WHERE id = $1 AND status <> 'CANCELLED'",
        )
        .bind(schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            let err = schedule_refusal(&mut tx, schedule_id).await?;
            tx.rollback().await.map_err(db_err)?;
            return Err(err);
        }

        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET status = 'completed', completed_at = $2, updated_at = $2
            WHERE schedule_id = $1 AND status = 'confirmed'
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(schedule_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        release_claims(&mut tx, &ids).await?;
        tx.commit().await.map_err(db_err)?;
        into_bookings(rows)
    }

    async fn cancel_schedule(&self, schedule_id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut tx = self.begin().await?;
        let updated = sqlx::query(
            "UPDATE schedules SET status = 'CANCELLED' WHERE id = $1 AND status <> 'COMPLETED'",
        )
        .bind(schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            let err = schedule_refusal(&mut tx, schedule_id).await?;
            tx.rollback().await.map_err(db_err)?;
            return Err(err);
        }

        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET status = 'cancelled', cancelled_at = $2, updated_at = $2, cancellation_reason = $3
            WHERE schedule_id = $1 AND status IN ('pending', 'confirmed')
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(schedule_id)
        .bind(now)
        .bind(reason)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        release_claims(&mut tx, &ids).await?;
        sqlx::query("DELETE FROM seat_locks WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        into_bookings(rows)
    }

    async fn due_reminders(&self, now: DateTime<Utc>, default_lead_minutes: i64) -> StoreResult<Vec<Booking>> {
        let columns: String = BOOKING_COLUMNS
            .split(", ")
            .map(|c| format!("b.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM bookings b
            JOIN schedules s ON s.id = b.schedule_id
            WHERE b.status = 'confirmed'
              AND b.reminder_sent_at IS NULL
              AND s.departure_at > $1
              AND s.departure_at <= $1 + make_interval(mins => LEAST(COALESCE(b.reminder_lead_minutes, $2), $3)::int)
            ORDER BY b.created_at
            "#,
            columns
        ))
        .bind(now)
        .bind(default_lead_minutes)
        .bind(MAX_REMINDER_WINDOW_MINUTES)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_bookings(rows)
    }

    async fn mark_reminder_sent(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE bookings SET reminder_sent_at = $2 WHERE id = $1 AND reminder_sent_at IS NULL",
        )
        .bind(booking_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_reminder_mark(&self, booking_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET reminder_sent_at = NULL WHERE id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_booking(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}
