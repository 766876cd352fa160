use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use seatline_core::gateway::{GatewayStatus, PaymentGateway, PaymentIntent, PaymentRequest};
use seatline_core::payment::GatewayKind;
use seatline_core::CoreResult;
use seatline_store::app_config::PayOsConfig;

use super::{
    ensure_refund_amount, live_call_unsupported, payment_window, sandbox_completed, sandbox_payment_id, signature,
};

const SANDBOX_HOST: &str = "https://test.payos.vn";

pub struct PayOsGateway {
    config: PayOsConfig,
}

impl PayOsGateway {
    pub fn new(config: PayOsConfig) -> Self {
        Self { config }
    }

    /// Checksum over `orderCode|amount|description|cancelUrl|returnUrl`.
    pub fn checksum(&self, order_code: i64, request: &PaymentRequest) -> CoreResult<String> {
        let data = format!(
            "{}|{}|{}|{}|{}",
            order_code, request.amount, request.description, request.return_url, request.return_url
        );
        signature::sign(&self.config.checksum_key, data.as_bytes())
    }
}

#[async_trait]
impl PaymentGateway for PayOsGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::PayOs
    }

    async fn create_payment(&self, request: &PaymentRequest) -> CoreResult<PaymentIntent> {
        let now = Utc::now();
        let checksum = self.checksum(now.timestamp(), request)?;
        debug!("PayOS order for {} from client {} signed: {}", request.booking_code, self.config.client_id, checksum);

        let intent = PaymentIntent {
            gateway_payment_id: sandbox_payment_id("PAYOS", request.booking_id),
            payment_url: format!("{}/checkout/{}", SANDBOX_HOST, request.booking_id),
            qr_code_url: Some(format!("{}/qr/{}", SANDBOX_HOST, request.booking_id)),
            expires_at: now + payment_window(),
        };
        info!("PayOS payment {} opened for booking {}", intent.gateway_payment_id, request.booking_id);
        Ok(intent)
    }

    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> CoreResult<()> {
        signature::verify(&self.config.checksum_key, payload, signature)
    }

    async fn check_status(&self, gateway_payment_id: &str) -> CoreResult<GatewayStatus> {
        if !self.config.sandbox {
            return Err(live_call_unsupported(GatewayKind::PayOs, "status query"));
        }
        Ok(sandbox_completed("PAYOS", gateway_payment_id))
    }

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> CoreResult<()> {
        ensure_refund_amount(amount)?;
        if !self.config.sandbox {
            return Err(live_call_unsupported(GatewayKind::PayOs, "refund"));
        }
        info!("PayOS refund of {} accepted for {}", amount, gateway_payment_id);
        Ok(())
    }
}
