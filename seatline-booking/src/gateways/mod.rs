use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use seatline_core::gateway::{GatewayStatus, PaymentGateway};
use seatline_core::payment::{GatewayKind, PaymentOutcome};
use seatline_core::{CoreError, CoreResult};
use seatline_store::app_config::PaymentsConfig;

pub mod momo;
pub mod payos;
pub mod signature;
pub mod zalopay;

pub use momo::MomoGateway;
pub use payos::PayOsGateway;
pub use zalopay::ZaloPayGateway;

const PAYMENT_WINDOW_MINUTES: i64 = 15;

pub(crate) fn payment_window() -> chrono::Duration {
    chrono::Duration::minutes(PAYMENT_WINDOW_MINUTES)
}

pub(crate) fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// `{PREFIX}_{booking prefix}{attempt suffix}`, unique per attempt.
pub(crate) fn sandbox_payment_id(prefix: &str, booking_id: Uuid) -> String {
    format!("{}_{}{}", prefix, short_id(booking_id), short_id(Uuid::new_v4()).to_uppercase())
}

pub(crate) fn ensure_refund_amount(amount: i64) -> CoreResult<()> {
    if amount <= 0 {
        return Err(CoreError::ValidationError(format!("refund amount must be positive, got {}", amount)));
    }
    Ok(())
}

/// Sandbox accounts report every payment as settled.
pub(crate) fn sandbox_completed(prefix: &str, gateway_payment_id: &str) -> GatewayStatus {
    Some(PaymentOutcome::Completed {
        transaction_id: Some(format!("{}_TXN_{}", prefix, gateway_payment_id)),
        paid_at: Utc::now(),
    })
}

/// Outside the sandbox only signed webhooks may settle or refund a payment.
pub(crate) fn live_call_unsupported(kind: GatewayKind, operation: &str) -> CoreError {
    warn!("{} {} requested on a live account, which only settles via webhooks", kind, operation);
    CoreError::UpstreamFailure(format!("{} {} is not available outside the sandbox", kind, operation))
}

/// Gateways keyed by kind. Built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

pub struct GatewayRegistryBuilder {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistryBuilder {
    /// A later registration for the same kind replaces the earlier one.
    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn build(self) -> GatewayRegistry {
        GatewayRegistry { gateways: self.gateways }
    }
}

impl GatewayRegistry {
    pub fn builder() -> GatewayRegistryBuilder {
        GatewayRegistryBuilder { gateways: HashMap::new() }
    }

    /// Registers every gateway that has a configuration section.
    pub fn from_config(config: &PaymentsConfig) -> Self {
        let mut builder = Self::builder();
        if let Some(momo) = &config.momo {
            builder = builder.register(Arc::new(MomoGateway::new(momo.clone())));
        }
        if let Some(zalopay) = &config.zalopay {
            builder = builder.register(Arc::new(ZaloPayGateway::new(zalopay.clone())));
        }
        if let Some(payos) = &config.payos {
            builder = builder.register(Arc::new(PayOsGateway::new(payos.clone())));
        }

        let registry = builder.build();
        info!("Payment gateways enabled: {:?}", registry.kinds());
        registry
    }

    pub fn get(&self, kind: GatewayKind) -> CoreResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or_else(|| CoreError::ValidationError(format!("payment gateway {} is not configured", kind)))
    }

    pub fn kinds(&self) -> Vec<GatewayKind> {
        GatewayKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.gateways.contains_key(kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_store::app_config::{MomoConfig, PayOsConfig};

    fn payments_config() -> PaymentsConfig {
        PaymentsConfig {
            currency: "VND".to_string(),
            return_url_base: "http://localhost:3000".to_string(),
            webhook_url_base: "http://localhost:8080".to_string(),
            momo: Some(MomoConfig {
                partner_code: "MOMO".to_string(),
                access_key: "ak".to_string(),
                secret_key: "sk".to_string(),
                sandbox: true,
            }),
            zalopay: None,
            payos: Some(PayOsConfig {
                client_id: "c".to_string(),
                api_key: "a".to_string(),
                checksum_key: "k".to_string(),
                sandbox: false,
            }),
        }
    }

    #[test]
    fn test_registry_from_config() {
        let registry = GatewayRegistry::from_config(&payments_config());
        assert_eq!(registry.kinds(), vec![GatewayKind::Momo, GatewayKind::PayOs]);
        assert_eq!(registry.get(GatewayKind::Momo).unwrap().kind(), GatewayKind::Momo);
        assert!(matches!(
            registry.get(GatewayKind::ZaloPay),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_sandbox_payment_id_shape() {
        let booking_id = Uuid::parse_str("0a1b2c3d-0000-0000-0000-000000000000").unwrap();
        let id = sandbox_payment_id("MOMO", booking_id);
        assert!(id.starts_with("MOMO_0a1b2c3d"));
        assert_eq!(id.len(), "MOMO_".len() + 16);
    }
}
