use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use seatline_core::booking::BookingStatus;
use seatline_core::gateway::{PaymentRequest, WebhookPayload};
use seatline_core::payment::{idempotency_key, GatewayKind, Payment, PaymentOutcome, PaymentStatus};
use seatline_core::repository::PaymentRepository;
use seatline_core::{CoreError, CoreResult};

use crate::gateways::GatewayRegistry;
use crate::orchestrator::BookingOrchestrator;

/// Base URLs handed to gateways with every payment request.
#[derive(Debug, Clone)]
pub struct PaymentUrls {
    pub return_url_base: String,
    pub webhook_url_base: String,
}

impl PaymentUrls {
    fn return_url(&self, booking_id: Uuid) -> String {
        format!("{}/bookings/{}/payment-result", self.return_url_base.trim_end_matches('/'), booking_id)
    }

    fn webhook_url(&self, kind: GatewayKind) -> String {
        format!("{}/v1/webhooks/{}", self.webhook_url_base.trim_end_matches('/'), kind)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub payment: Payment,
    pub payment_url: String,
    pub qr_code_url: Option<String>,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Keeps local payment records in step with what the gateways report.
pub struct PaymentReconciler {
    payments: Arc<dyn PaymentRepository>,
    gateways: Arc<GatewayRegistry>,
    orchestrator: Arc<BookingOrchestrator>,
    urls: PaymentUrls,
}

impl PaymentReconciler {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        gateways: Arc<GatewayRegistry>,
        orchestrator: Arc<BookingOrchestrator>,
        urls: PaymentUrls,
    ) -> Self {
        Self { payments, gateways, orchestrator, urls }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub async fn create_payment(&self, booking_id: Uuid, kind: GatewayKind) -> CoreResult<PaymentSession> {
        // 1. Booking must still be awaiting payment
        let booking = self.orchestrator.get_booking(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "booking {} is {} and cannot be paid",
                booking.id,
                booking.status.as_str()
            )));
        }
        if booking.is_expired(Utc::now()) {
            return Err(CoreError::InvalidState(format!("booking {} has expired", booking.id)));
        }

        // 2. One live payment per booking
        if let Some(latest) = self.payments.find_latest_by_booking(booking.id).await? {
            if latest.status != PaymentStatus::Failed {
                return Err(CoreError::Conflict(format!(
                    "booking {} already has a {} payment",
                    booking.id,
                    latest.status.as_str()
                )));
            }
        }

        // 3. Gateway intent
        let gateway = self.gateways.get(kind)?;
        let key = idempotency_key(booking.id, kind, Utc::now());
        let request = PaymentRequest {
            booking_id: booking.id,
            booking_code: booking.booking_code.clone(),
            amount: booking.total_price,
            currency: booking.currency.clone(),
            description: format!("Booking {}", booking.booking_code),
            idempotency_key: key.clone(),
            return_url: self.urls.return_url(booking.id),
            webhook_url: self.urls.webhook_url(kind),
            customer: booking.contact.clone(),
        };
        let intent = gateway.create_payment(&request).await.map_err(|e| match e {
            CoreError::UpstreamFailure(_) => e,
            other => CoreError::UpstreamFailure(format!("{} payment creation failed: {}", kind, other)),
        })?;

        // 4. Local record
        let payment = Payment::new_pending(
            booking.id,
            kind,
            intent.gateway_payment_id.clone(),
            booking.total_price,
            booking.currency.clone(),
            key,
        );
        self.payments.create(&payment).await?;
        info!("Payment {} created for booking {} via {}", payment.id, booking.id, kind);

        Ok(PaymentSession {
            payment,
            payment_url: intent.payment_url,
            qr_code_url: intent.qr_code_url,
            expires_at: intent.expires_at,
        })
    }

    /// Verifies and applies a gateway callback. Redeliveries are harmless.
    pub async fn handle_webhook(&self, kind: GatewayKind, signature: &str, raw_payload: &[u8]) -> CoreResult<Payment> {
        // 1. Authenticate the raw bytes before reading them
        let gateway = self.gateways.get(kind)?;
        gateway.verify_webhook(signature, raw_payload)?;

        // 2. Parse and locate the payment
        let payload: WebhookPayload = serde_json::from_slice(raw_payload)
            .map_err(|e| CoreError::ValidationError(format!("malformed webhook payload: {}", e)))?;
        let payment = self
            .payments
            .find_by_gateway_id(&payload.gateway_payment_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payload.gateway_payment_id)))?;
        if payment.gateway != kind {
            return Err(CoreError::ValidationError(format!(
                "payment {} belongs to {}, not {}",
                payment.id, payment.gateway, kind
            )));
        }

        if payment.status == PaymentStatus::Completed {
            info!("Webhook replay for completed payment {}", payment.id);
            return Ok(payment);
        }

        // 3. Map the reported status; unknown statuses change nothing
        let outcome = payload.outcome()?;
        if let (Some(amount), PaymentOutcome::Completed { .. }) = (payload.amount, &outcome) {
            if amount != payment.amount {
                return Err(CoreError::ValidationError(format!(
                    "payment {} amount mismatch: expected {}, got {}",
                    payment.id, payment.amount, amount
                )));
            }
        }

        if payment.status != PaymentStatus::Pending {
            warn!(
                "Ignoring {} webhook for payment {} already {}",
                outcome.status().as_str(),
                payment.id,
                payment.status.as_str()
            );
            return Ok(payment);
        }

        self.apply_outcome(payment, &outcome).await
    }

    /// Polls the gateway for a Pending payment. A gateway failure returns the local record.
    pub async fn check_payment_status(&self, payment_id: Uuid) -> CoreResult<Payment> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }

        let gateway = match self.gateways.get(payment.gateway) {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!("Cannot poll payment {}: {}", payment.id, e);
                return Ok(payment);
            }
        };

        match gateway.check_status(&payment.gateway_payment_id).await {
            Ok(Some(outcome)) => self.apply_outcome(payment, &outcome).await,
            Ok(None) => Ok(payment),
            Err(e) => {
                warn!("Status poll for payment {} failed, keeping local state: {}", payment.id, e);
                Ok(payment)
            }
        }
    }

    pub async fn refund_payment(&self, payment_id: Uuid) -> CoreResult<Payment> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "payment {} is {} and cannot be refunded",
                payment.id,
                payment.status.as_str()
            )));
        }

        // 1. Gateway refund
        let gateway = self.gateways.get(payment.gateway)?;
        gateway
            .refund(&payment.gateway_payment_id, payment.amount)
            .await
            .map_err(|e| CoreError::UpstreamFailure(format!("{} refund failed: {}", payment.gateway, e)))?;

        // 2. Local record
        let refunded = self
            .payments
            .update_status(payment.id, PaymentStatus::Completed, PaymentStatus::Refunded)
            .await?
            .ok_or_else(|| CoreError::InvalidState(format!("payment {} changed concurrently", payment.id)))?;

        // 3. Booking and seats
        match self.orchestrator.refund_booking(refunded.booking_id).await {
            Ok(_) => {}
            Err(CoreError::InvalidState(reason)) => {
                warn!("Payment {} refunded but booking left as is: {}", refunded.id, reason);
            }
            Err(e) => return Err(e),
        }

        info!("Payment {} refunded", refunded.id);
        Ok(refunded)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> CoreResult<Payment> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment_id)))
    }

    async fn apply_outcome(&self, payment: Payment, outcome: &PaymentOutcome) -> CoreResult<Payment> {
        let settled = match self.payments.settle(payment.id, outcome).await? {
            Some(settled) => settled,
            None => {
                // Another delivery settled it first
                return self.get_payment(payment.id).await;
            }
        };
        info!("Payment {} settled as {}", settled.id, settled.status.as_str());

        if settled.status == PaymentStatus::Completed {
            self.orchestrator.mark_paid(settled.booking_id).await?;
        }
        Ok(settled)
    }
}
