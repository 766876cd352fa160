use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::ContactInfo;
use crate::payment::{GatewayKind, PaymentOutcome};
use crate::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub booking_id: Uuid,
    pub booking_code: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub idempotency_key: String,
    pub return_url: String,
    pub webhook_url: String,
    pub customer: ContactInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub gateway_payment_id: String,
    pub payment_url: String,
    pub qr_code_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Body delivered by a gateway webhook, after signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub gateway_payment_id: String,
    pub status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl WebhookPayload {
    pub fn outcome(&self) -> CoreResult<PaymentOutcome> {
        PaymentOutcome::from_gateway_status(&self.status, self.transaction_id.clone(), self.paid_at)
    }
}

/// Gateway answer to a status poll. `None` means still pending on the gateway side.
pub type GatewayStatus = Option<PaymentOutcome>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn create_payment(&self, request: &PaymentRequest) -> CoreResult<PaymentIntent>;

    /// AuthenticationFailure unless `signature` matches the raw payload.
    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> CoreResult<()>;

    async fn check_status(&self, gateway_payment_id: &str) -> CoreResult<GatewayStatus>;

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> CoreResult<()>;
}
