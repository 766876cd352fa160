use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use seatline_core::repository::SeatStore;
use seatline_core::seat::{ensure_all_bookable, ensure_all_lockable, Seat};
use seatline_core::{CoreError, CoreResult};

use crate::database::db_err;

pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    trip_id: Uuid,
    seat_number: String,
    status: String,
    locked_until: Option<DateTime<Utc>>,
    locked_by: Option<String>,
    booking_id: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = CoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            trip_id: row.trip_id,
            seat_number: row.seat_number,
            status: row.status.parse()?,
            locked_until: row.locked_until,
            locked_by: row.locked_by,
            booking_id: row.booking_id,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_FOR_UPDATE: &str = r#"
    SELECT trip_id, seat_number, status, locked_until, locked_by, booking_id, updated_at
    FROM seats
    WHERE trip_id = $1 AND seat_number = ANY($2)
    ORDER BY seat_number
    FOR UPDATE
"#;

async fn lock_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trip_id: Uuid,
    seat_numbers: &[String],
) -> CoreResult<Vec<Seat>> {
    // Rows are locked in seat-number order so overlapping requests cannot deadlock.
    let rows = sqlx::query_as::<_, SeatRow>(SELECT_FOR_UPDATE)
        .bind(trip_id)
        .bind(seat_numbers)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;

    rows.into_iter().map(Seat::try_from).collect()
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn initialize_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO seats (trip_id, seat_number, status)
            SELECT $1, seat, 'available' FROM UNNEST($2::text[]) AS seat
            ON CONFLICT (trip_id, seat_number) DO NOTHING
            "#,
        )
        .bind(trip_id)
        .bind(seat_numbers)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn list_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT trip_id, seat_number, status, locked_until, locked_by, booking_id, updated_at
            FROM seats
            WHERE trip_id = $1
            ORDER BY seat_number
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn lock_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
        holder: &str,
        locked_until: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let rows = lock_rows(&mut tx, trip_id, seat_numbers).await?;
        ensure_all_lockable(&rows, seat_numbers, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE seats
            SET status = 'locked', locked_until = $3, locked_by = $4, booking_id = $5, updated_at = NOW()
            WHERE trip_id = $1 AND seat_number = ANY($2)
            "#,
        )
        .bind(trip_id)
        .bind(seat_numbers)
        .bind(locked_until)
        .bind(holder)
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn unlock_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'available', locked_until = NULL, locked_by = NULL, booking_id = NULL, updated_at = NOW()
            WHERE trip_id = $1 AND seat_number = ANY($2) AND status = 'locked'
            "#,
        )
        .bind(trip_id)
        .bind(seat_numbers)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn mark_booked(&self, trip_id: Uuid, seat_numbers: &[String], booking_id: Uuid) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let rows = lock_rows(&mut tx, trip_id, seat_numbers).await?;
        ensure_all_bookable(&rows, seat_numbers, booking_id, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE seats
            SET status = 'booked', booking_id = $3, locked_until = NULL, locked_by = NULL, updated_at = NOW()
            WHERE trip_id = $1 AND seat_number = ANY($2)
            "#,
        )
        .bind(trip_id)
        .bind(seat_numbers)
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn release_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
    ) -> CoreResult<Vec<String>> {
        let released: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE seats
            SET status = 'available', booking_id = NULL, locked_until = NULL, locked_by = NULL, updated_at = NOW()
            WHERE trip_id = $1 AND seat_number = ANY($2) AND booking_id = $3
            RETURNING seat_number
            "#,
        )
        .bind(trip_id)
        .bind(seat_numbers)
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(released.into_iter().map(|(seat,)| seat).collect())
    }

    async fn sweep_expired_locks(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'available', locked_until = NULL, locked_by = NULL, booking_id = NULL, updated_at = NOW()
            WHERE status = 'locked' AND locked_until < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
