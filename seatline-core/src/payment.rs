use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(CoreError::InternalError(format!("unknown payment status: {}", other))),
        }
    }
}

/// Supported payment gateways.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Momo,
    ZaloPay,
    PayOs,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 3] = [GatewayKind::Momo, GatewayKind::ZaloPay, GatewayKind::PayOs];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Momo => "momo",
            GatewayKind::ZaloPay => "zalopay",
            GatewayKind::PayOs => "payos",
        }
    }

    /// Header carrying the webhook signature for this gateway.
    pub fn signature_header(&self) -> &'static str {
        match self {
            GatewayKind::ZaloPay => "X-Mac",
            GatewayKind::Momo | GatewayKind::PayOs => "X-Signature",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "momo" => Ok(GatewayKind::Momo),
            "zalopay" => Ok(GatewayKind::ZaloPay),
            "payos" => Ok(GatewayKind::PayOs),
            other => Err(CoreError::ValidationError(format!("unsupported payment gateway: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub gateway: GatewayKind,
    pub gateway_payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub idempotency_key: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new_pending(
        booking_id: Uuid,
        gateway: GatewayKind,
        gateway_payment_id: String,
        amount: i64,
        currency: impl Into<String>,
        idempotency_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            gateway,
            gateway_payment_id,
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            idempotency_key,
            transaction_id: None,
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `{bookingID}_{gateway}_{unixSeconds}`
pub fn idempotency_key(booking_id: Uuid, gateway: GatewayKind, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", booking_id, gateway, at.timestamp())
}

/// Terminal result reported by a gateway, either through a webhook or a status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Completed {
        transaction_id: Option<String>,
        paid_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

impl PaymentOutcome {
    /// Maps a gateway status string. Unknown strings are rejected rather than ignored.
    pub fn from_gateway_status(
        status: &str,
        transaction_id: Option<String>,
        paid_at: Option<DateTime<Utc>>,
    ) -> CoreResult<Self> {
        match status.to_ascii_lowercase().as_str() {
            "success" | "completed" => Ok(PaymentOutcome::Completed {
                transaction_id,
                paid_at: paid_at.unwrap_or_else(Utc::now),
            }),
            "failed" | "error" => Ok(PaymentOutcome::Failed {
                reason: format!("gateway reported status {}", status),
            }),
            "cancelled" | "canceled" => Ok(PaymentOutcome::Cancelled),
            other => Err(CoreError::ValidationError(format!("unknown payment status: {}", other))),
        }
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Completed { .. } => PaymentStatus::Completed,
            PaymentOutcome::Failed { .. } => PaymentStatus::Failed,
            PaymentOutcome::Cancelled => PaymentStatus::Cancelled,
        }
    }

    pub fn apply(&self, payment: &mut Payment) {
        payment.status = self.status();
        payment.updated_at = Utc::now();
        match self {
            PaymentOutcome::Completed { transaction_id, paid_at } => {
                payment.transaction_id = transaction_id.clone();
                payment.paid_at = Some(*paid_at);
            }
            PaymentOutcome::Failed { reason } => {
                payment.failure_reason = Some(reason.clone());
            }
            PaymentOutcome::Cancelled => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        let done = PaymentOutcome::from_gateway_status("success", Some("TX1".into()), None).unwrap();
        assert_eq!(done.status(), PaymentStatus::Completed);
        assert_eq!(
            PaymentOutcome::from_gateway_status("COMPLETED", None, None).unwrap().status(),
            PaymentStatus::Completed
        );
        assert_eq!(
            PaymentOutcome::from_gateway_status("error", None, None).unwrap().status(),
            PaymentStatus::Failed
        );
        assert_eq!(
            PaymentOutcome::from_gateway_status("cancelled", None, None).unwrap().status(),
            PaymentStatus::Cancelled
        );
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let result = PaymentOutcome::from_gateway_status("processing", None, None);
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_idempotency_key_format() {
        let booking_id = Uuid::new_v4();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            idempotency_key(booking_id, GatewayKind::ZaloPay, at),
            format!("{}_zalopay_1700000000", booking_id)
        );
    }

    #[test]
    fn test_gateway_kind_parsing() {
        assert_eq!("MoMo".parse::<GatewayKind>().unwrap(), GatewayKind::Momo);
        assert_eq!("payos".parse::<GatewayKind>().unwrap(), GatewayKind::PayOs);
        assert!("paypal".parse::<GatewayKind>().is_err());
        assert_eq!(GatewayKind::ZaloPay.signature_header(), "X-Mac");
    }
}
