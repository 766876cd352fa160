use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use seatline_core::payment::{Payment, PaymentOutcome, PaymentStatus};
use seatline_core::repository::PaymentRepository;
use seatline_core::{CoreError, CoreResult};

use crate::database::db_err;

pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    gateway: String,
    gateway_payment_id: String,
    amount: i64,
    currency: String,
    status: String,
    idempotency_key: String,
    transaction_id: Option<String>,
    failure_reason: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            gateway: row.gateway.parse()?,
            gateway_payment_id: row.gateway_payment_id,
            amount: row.amount,
            currency: row.currency,
            status: row.status.parse()?,
            idempotency_key: row.idempotency_key,
            transaction_id: row.transaction_id,
            failure_reason: row.failure_reason,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, booking_id, gateway, gateway_payment_id, amount, currency, status, \
     idempotency_key, transaction_id, failure_reason, paid_at, created_at, updated_at";

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn create(&self, payment: &Payment) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, gateway, gateway_payment_id, amount, currency, status,
                                  idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.gateway.as_str())
        .bind(&payment.gateway_payment_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.idempotency_key)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> CoreResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE gateway_payment_id = $1", PAYMENT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(gateway_payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_latest_by_booking(&self, booking_id: Uuid) -> CoreResult<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY created_at DESC LIMIT 1",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn settle(&self, id: Uuid, outcome: &PaymentOutcome) -> CoreResult<Option<Payment>> {
        let (transaction_id, paid_at, failure_reason) = match outcome {
            PaymentOutcome::Completed { transaction_id, paid_at } => (transaction_id.clone(), Some(*paid_at), None),
            PaymentOutcome::Failed { reason } => (None, None, Some(reason.clone())),
            PaymentOutcome::Cancelled => (None, None, None),
        };

        let sql = format!(
            r#"
            UPDATE payments
            SET status = $2,
                transaction_id = COALESCE($3, transaction_id),
                paid_at = COALESCE($4, paid_at),
                failure_reason = COALESCE($5, failure_reason),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .bind(outcome.status().as_str())
            .bind(transaction_id)
            .bind(paid_at)
            .bind(failure_reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn update_status(&self, id: Uuid, from: PaymentStatus, to: PaymentStatus) -> CoreResult<Option<Payment>> {
        let sql = format!(
            "UPDATE payments SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2 RETURNING {}",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }
}
