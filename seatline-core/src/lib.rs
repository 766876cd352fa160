pub mod seat;
pub mod booking;
pub mod payment;
pub mod ticket;
pub mod trip;
pub mod holder;
pub mod events;
pub mod repository;
pub mod cache;
pub mod gateway;

pub use holder::Holder;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
