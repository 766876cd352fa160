use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// The identity that owns a seat lock and the booking created from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Holder {
    User(Uuid),
    Session(String),
}

impl Holder {
    pub fn new_session() -> Self {
        Holder::Session(Uuid::new_v4().simple().to_string())
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Holder::User(id) => Some(*id),
            Holder::Session(_) => None,
        }
    }

    /// Value written as the lock owner in both the cache and the seat store.
    pub fn lock_value(&self) -> String {
        self.to_string()
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.split_once(':') {
            Some(("user", id)) => Uuid::parse_str(id)
                .map(Holder::User)
                .map_err(|_| CoreError::ValidationError(format!("invalid user holder: {}", value))),
            Some(("session", id)) if !id.is_empty() => Ok(Holder::Session(id.to_string())),
            _ => Err(CoreError::ValidationError(format!("invalid holder: {}", value))),
        }
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::User(id) => write!(f, "user:{}", id),
            Holder::Session(id) => write!(f, "session:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_value_parses_back() {
        let user = Holder::User(Uuid::new_v4());
        assert_eq!(Holder::parse(&user.lock_value()).unwrap(), user);

        let session = Holder::Session("abc123".to_string());
        assert_eq!(session.lock_value(), "session:abc123");
        assert_eq!(Holder::parse("session:abc123").unwrap(), session);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Holder::parse("user:not-a-uuid").is_err());
        assert!(Holder::parse("session:").is_err());
        assert!(Holder::parse("nobody").is_err());
    }
}
