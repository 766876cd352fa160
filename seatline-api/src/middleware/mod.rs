pub mod auth;

pub use auth::{ensure_owner, CustomerClaims, RequestHolder};
