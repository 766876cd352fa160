use hmac::{Hmac, Mac};
use sha2::Sha256;

use seatline_core::{CoreError, CoreResult};

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str) -> CoreResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::InternalError(format!("invalid signing key: {}", e)))
}

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> CoreResult<String> {
    let mut mac = mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature against `payload`.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> CoreResult<()> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| CoreError::AuthenticationFailure("malformed webhook signature".to_string()))?;

    let mut mac = mac(secret)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| CoreError::AuthenticationFailure("webhook signature mismatch".to_string()))
}
