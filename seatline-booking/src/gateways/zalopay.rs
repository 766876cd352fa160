use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use seatline_core::gateway::{GatewayStatus, PaymentGateway, PaymentIntent, PaymentRequest};
use seatline_core::payment::GatewayKind;
use seatline_core::CoreResult;
use seatline_store::app_config::ZaloPayConfig;

use super::{
    ensure_refund_amount, live_call_unsupported, payment_window, sandbox_completed, sandbox_payment_id, short_id,
    signature,
};

const SANDBOX_HOST: &str = "https://sbgateway.zalopay.vn";

/// ZaloPay adapter. Orders are signed with `key1`, callbacks with `key2`.
pub struct ZaloPayGateway {
    config: ZaloPayConfig,
}

impl ZaloPayGateway {
    pub fn new(config: ZaloPayConfig) -> Self {
        Self { config }
    }

    /// `yyMMdd_{unix}_{booking prefix}`, the transaction id format ZaloPay requires.
    pub fn app_trans_id(request: &PaymentRequest, at: DateTime<Utc>) -> String {
        format!("{}_{}_{}", at.format("%y%m%d"), at.timestamp(), short_id(request.booking_id))
    }

    pub fn order_mac(&self, request: &PaymentRequest, app_trans_id: &str, at: DateTime<Utc>) -> CoreResult<String> {
        let app_user = request.customer.email.as_deref().unwrap_or("guest");
        let data = format!(
            "{}|{}|{}|{}|{}|{{}}|[]",
            self.config.app_id,
            app_trans_id,
            app_user,
            request.amount,
            at.timestamp_millis(),
        );
        signature::sign(&self.config.key1, data.as_bytes())
    }
}

#[async_trait]
impl PaymentGateway for ZaloPayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::ZaloPay
    }

    async fn create_payment(&self, request: &PaymentRequest) -> CoreResult<PaymentIntent> {
        let now = Utc::now();
        let app_trans_id = Self::app_trans_id(request, now);
        let mac = self.order_mac(request, &app_trans_id, now)?;
        debug!("ZaloPay order {} signed: {}", app_trans_id, mac);

        let intent = PaymentIntent {
            gateway_payment_id: sandbox_payment_id("ZALOPAY", request.booking_id),
            payment_url: format!("{}/api/gateway/pay/{}", SANDBOX_HOST, request.booking_id),
            qr_code_url: Some(format!("{}/qr/{}", SANDBOX_HOST, request.booking_id)),
            expires_at: now + payment_window(),
        };
        info!("ZaloPay payment {} opened for booking {}", intent.gateway_payment_id, request.booking_id);
        Ok(intent)
    }

    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> CoreResult<()> {
        signature::verify(&self.config.key2, payload, signature)
    }

    async fn check_status(&self, gateway_payment_id: &str) -> CoreResult<GatewayStatus> {
        if !self.config.sandbox {
            return Err(live_call_unsupported(GatewayKind::ZaloPay, "status query"));
        }
        Ok(sandbox_completed("ZALOPAY", gateway_payment_id))
    }

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> CoreResult<()> {
        ensure_refund_amount(amount)?;
        if !self.config.sandbox {
            return Err(live_call_unsupported(GatewayKind::ZaloPay, "refund"));
        }
        info!("ZaloPay refund of {} accepted for {}", amount, gateway_payment_id);
        Ok(())
    }
}
