use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::typed_header::TypedHeaderRejectionReason;
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seatline_core::booking::Booking;
use seatline_core::Holder;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

pub fn decode_claims(token: &str, secret: &str) -> Result<CustomerClaims, AppError> {
    decode::<CustomerClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::AuthenticationError(format!("invalid token: {}", e)))
}

// ============================================================================
// Holder Extraction
// ============================================================================

/// Who is acting on this request. `minted` is set when no identity was
/// presented and a fresh session had to be created for the caller.
#[derive(Debug, Clone)]
pub struct RequestHolder {
    pub holder: Holder,
    pub minted: bool,
}

impl RequestHolder {
    /// Session id to hand back to the client when one was minted here.
    pub fn minted_session(&self) -> Option<String> {
        match (&self.holder, self.minted) {
            (Holder::Session(id), true) => Some(id.clone()),
            _ => None,
        }
    }
}

impl FromRequestParts<AppState> for RequestHolder {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // 1. Bearer token, when present, must be valid
        match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await {
            Ok(TypedHeader(Authorization(bearer))) => {
                let claims = decode_claims(bearer.token(), &state.auth.secret)?;
                if let Ok(user_id) = Uuid::parse_str(&claims.sub) {
                    return Ok(Self { holder: Holder::User(user_id), minted: false });
                }
            }
            Err(rejection) if matches!(rejection.reason(), TypedHeaderRejectionReason::Missing) => {}
            Err(rejection) => return Err(AppError::AuthenticationError(rejection.to_string())),
        }

        // 2. Anonymous callers identify with a session header
        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if let Some(id) = session {
            return Ok(Self { holder: Holder::Session(id.to_string()), minted: false });
        }

        // 3. First contact: mint a session
        Ok(Self { holder: Holder::new_session(), minted: true })
    }
}

// ============================================================================
// Ownership Check Helper
// ============================================================================

pub fn ensure_owner(booking: &Booking, holder: &Holder) -> Result<(), AppError> {
    if booking.holder != *holder {
        return Err(AppError::AuthorizationError(
            "Unauthorized: booking does not belong to you".to_string(),
        ));
    }
    Ok(())
}
