use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use seatline_core::booking::{Booking, BookingTransition, ContactInfo};
use seatline_core::repository::BookingRepository;
use seatline_core::{CoreError, CoreResult, Holder};

use crate::database::db_err;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: Option<Uuid>,
    holder: String,
    seats: Vec<String>,
    total_price: i64,
    currency: String,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    booking_code: String,
    contact_name: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            holder: Holder::parse(&row.holder)?,
            seats: row.seats,
            total_price: row.total_price,
            currency: row.currency,
            status: row.status.parse()?,
            expires_at: row.expires_at,
            booking_code: row.booking_code,
            contact: ContactInfo {
                name: row.contact_name,
                email: row.contact_email,
                phone: row.contact_phone,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, trip_id, user_id, holder, seats, total_price, currency, status, expires_at, \
     booking_code, contact_name, contact_email, contact_phone, created_at, updated_at, cancelled_at";

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create(&self, booking: &Booking) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, trip_id, user_id, holder, seats, total_price, currency, status, expires_at,
                                  booking_code, contact_name, contact_email, contact_phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(booking.user_id)
        .bind(booking.holder.lock_value())
        .bind(&booking.seats)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.expires_at)
        .bind(&booking.booking_code)
        .bind(&booking.contact.name)
        .bind(&booking.contact.email)
        .bind(&booking.contact.phone)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid, limit: i64, offset: i64) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: i64) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'pending' AND expires_at < $1 ORDER BY expires_at LIMIT $2",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn transition(&self, id: Uuid, transition: &BookingTransition) -> CoreResult<Option<Booking>> {
        let from: Vec<String> = transition.from.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $2,
                updated_at = $3,
                expires_at = CASE WHEN $2 = 'pending' THEN expires_at ELSE NULL END,
                cancelled_at = CASE WHEN $2 IN ('cancelled', 'expired') THEN $3 ELSE cancelled_at END
            WHERE id = $1 AND status = ANY($4)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(transition.to.as_str())
            .bind(transition.at)
            .bind(&from)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }
}
