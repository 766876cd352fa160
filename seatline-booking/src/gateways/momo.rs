use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use seatline_core::gateway::{GatewayStatus, PaymentGateway, PaymentIntent, PaymentRequest};
use seatline_core::payment::GatewayKind;
use seatline_core::CoreResult;
use seatline_store::app_config::MomoConfig;

use super::{
    ensure_refund_amount, live_call_unsupported, payment_window, sandbox_completed, sandbox_payment_id, signature,
};

const SANDBOX_HOST: &str = "https://test-payment.momo.vn";

/// MoMo wallet adapter. Only sandbox accounts answer status polls and refunds locally.
pub struct MomoGateway {
    config: MomoConfig,
}

impl MomoGateway {
    pub fn new(config: MomoConfig) -> Self {
        Self { config }
    }

    /// Signature MoMo expects on a `captureWallet` request, keys in alphabetical order.
    pub fn request_signature(&self, request: &PaymentRequest, request_id: &str) -> CoreResult<String> {
        let raw = format!(
            "accessKey={}&amount={}&extraData=&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType=captureWallet",
            self.config.access_key,
            request.amount,
            request.webhook_url,
            request.booking_id,
            request.description,
            self.config.partner_code,
            request.return_url,
            request_id,
        );
        signature::sign(&self.config.secret_key, raw.as_bytes())
    }
}

#[async_trait]
impl PaymentGateway for MomoGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Momo
    }

    async fn create_payment(&self, request: &PaymentRequest) -> CoreResult<PaymentIntent> {
        let request_signature = self.request_signature(request, &request.idempotency_key)?;
        debug!("MoMo request for {} signed: {}", request.booking_code, request_signature);

        let intent = PaymentIntent {
            gateway_payment_id: sandbox_payment_id("MOMO", request.booking_id),
            payment_url: format!(
                "{}/gw_payment/transactionProcessor?partnerCode={}&orderId={}",
                SANDBOX_HOST, self.config.partner_code, request.booking_id
            ),
            qr_code_url: Some(format!("{}/qr/{}", SANDBOX_HOST, request.booking_id)),
            expires_at: Utc::now() + payment_window(),
        };
        info!("MoMo payment {} opened for booking {}", intent.gateway_payment_id, request.booking_id);
        Ok(intent)
    }

    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> CoreResult<()> {
        signature::verify(&self.config.secret_key, payload, signature)
    }

    async fn check_status(&self, gateway_payment_id: &str) -> CoreResult<GatewayStatus> {
        if !self.config.sandbox {
            return Err(live_call_unsupported(GatewayKind::Momo, "status query"));
        }
        Ok(sandbox_completed("MOMO", gateway_payment_id))
    }

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> CoreResult<()> {
        ensure_refund_amount(amount)?;
        if !self.config.sandbox {
            return Err(live_call_unsupported(GatewayKind::Momo, "refund"));
        }
        info!("MoMo refund of {} accepted for {}", amount, gateway_payment_id);
        Ok(())
    }
}
