use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use seatline_core::repository::TicketRepository;
use seatline_core::ticket::Ticket;
use seatline_core::{CoreError, CoreResult};

use crate::database::db_err;

pub struct PgTicketRepository {
    pool: PgPool,
}

impl PgTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    booking_id: Uuid,
    trip_id: Uuid,
    seat_number: String,
    ticket_code: String,
    passenger_name: Option<String>,
    passenger_email: Option<String>,
    passenger_phone: Option<String>,
    checked_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            booking_id: row.booking_id,
            trip_id: row.trip_id,
            seat_number: row.seat_number,
            ticket_code: row.ticket_code,
            passenger_name: row.passenger_name,
            passenger_email: row.passenger_email,
            passenger_phone: row.passenger_phone,
            checked_in_at: row.checked_in_at,
            created_at: row.created_at,
        }
    }
}

const TICKET_COLUMNS: &str = "id, booking_id, trip_id, seat_number, ticket_code, passenger_name, \
     passenger_email, passenger_phone, checked_in_at, created_at";

#[async_trait]
impl TicketRepository for PgTicketRepository {
    async fn create_batch(&self, tickets: &[Ticket]) -> CoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut inserted = 0;

        for ticket in tickets {
            let result = sqlx::query(
                r#"
                INSERT INTO tickets (id, booking_id, trip_id, seat_number, ticket_code,
                                     passenger_name, passenger_email, passenger_phone, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (booking_id, seat_number) DO NOTHING
                "#,
            )
            .bind(ticket.id)
            .bind(ticket.booking_id)
            .bind(ticket.trip_id)
            .bind(&ticket.seat_number)
            .bind(&ticket.ticket_code)
            .bind(&ticket.passenger_name)
            .bind(&ticket.passenger_email)
            .bind(&ticket.passenger_phone)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(db_err)?;
        Ok(inserted)
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets WHERE booking_id = $1 ORDER BY seat_number",
            TICKET_COLUMNS
        );
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets WHERE ticket_code = $1", TICKET_COLUMNS);
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(Ticket::from))
    }

    async fn check_in(&self, code: &str, at: DateTime<Utc>) -> CoreResult<Ticket> {
        let sql = format!(
            "UPDATE tickets SET checked_in_at = $2 WHERE ticket_code = $1 AND checked_in_at IS NULL RETURNING {}",
            TICKET_COLUMNS
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(code)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.find_by_code(code).await? {
                Some(_) => Err(CoreError::Conflict(format!("ticket {} already checked in", code))),
                None => Err(CoreError::NotFound(format!("ticket {}", code))),
            },
        }
    }
}
