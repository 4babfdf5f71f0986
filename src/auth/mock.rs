//! Mock token validator for unit and integration testing.
//!
//! Resolves tokens from an in-memory table without any network calls and can
//! be switched into an outage mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::token::{AuthToken, Identity};
use super::validator::TokenValidator;
use crate::error::ValidationFailure;

/// Mock validator backed by a token → identity table.
#[derive(Debug, Clone, Default)]
pub struct MockValidator {
    users: Arc<Mutex<HashMap<String, Identity>>>,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockValidator {
    /// Create a validator that accepts no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`.
    pub fn with_user(self, token: impl Into<String>, identity: Identity) -> Self {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), identity);
        self
    }

    /// Simulate the identity provider being down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of validation calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenValidator for MockValidator {
    async fn validate(&self, token: &AuthToken) -> Result<Identity, ValidationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ValidationFailure::Unavailable(
                "mock provider offline".to_string(),
            ));
        }

        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token.as_str())
            .cloned()
            .ok_or_else(|| ValidationFailure::Invalid("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let mock = MockValidator::new().with_user("T1", Identity::new(json!({ "login": "alice" })));

        let identity = mock.validate(&AuthToken::new("T1")).await.unwrap();
        assert_eq!(identity.display_name(), Some("alice"));

        let err = mock.validate(&AuthToken::new("T2")).await.unwrap_err();
        assert!(matches!(err, ValidationFailure::Invalid(_)));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn outage_mode_overrides_table() {
        let mock = MockValidator::new().with_user("T1", Identity::new(json!({})));
        mock.set_unavailable(true);

        let err = mock.validate(&AuthToken::new("T1")).await.unwrap_err();
        assert!(matches!(err, ValidationFailure::Unavailable(_)));
    }
}
