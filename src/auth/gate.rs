//! Per-request admission decision.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, instrument, warn};

use super::token::{extract_token, Identity};
use super::validator::TokenValidator;
use crate::error::{GateRejection, ValidationFailure};
use crate::metrics;

/// Outcome of [`Gate::admit`].
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Request carries a valid token for this identity.
    Admit(Identity),
    /// Request must not reach a handler.
    Reject(GateRejection),
}

impl GateDecision {
    /// The admitted identity, if any.
    pub fn identity(self) -> Option<Identity> {
        match self {
            GateDecision::Admit(identity) => Some(identity),
            GateDecision::Reject(_) => None,
        }
    }
}

/// Admits or rejects requests based on their bearer token.
///
/// Holds no per-request state; cloning is cheap.
#[derive(Clone)]
pub struct Gate {
    validator: Arc<dyn TokenValidator>,
    cookie_name: Arc<str>,
}

impl Gate {
    /// Create a gate using `validator`, reading tokens from the
    /// `Authorization` header or the cookie named `cookie_name`.
    pub fn new(validator: Arc<dyn TokenValidator>, cookie_name: impl Into<Arc<str>>) -> Self {
        Self {
            validator,
            cookie_name: cookie_name.into(),
        }
    }

    /// Decide whether a request with these headers is admitted.
    ///
    /// Never fails: every problem becomes a [`GateDecision::Reject`].
    #[instrument(skip_all)]
    pub async fn admit(&self, headers: &HeaderMap) -> GateDecision {
        let decision = match extract_token(headers, &self.cookie_name) {
            None => GateDecision::Reject(GateRejection::Unauthenticated),
            Some(token) => {
                let _timer = metrics::timer_validator();
                match self.validator.validate(&token).await {
                    Ok(identity) => GateDecision::Admit(identity),
                    Err(ValidationFailure::Invalid(reason)) => {
                        debug!(%reason, "token rejected");
                        GateDecision::Reject(GateRejection::InvalidToken)
                    }
                    Err(ValidationFailure::Unavailable(reason)) => {
                        warn!(%reason, "token validator unavailable");
                        GateDecision::Reject(GateRejection::ValidatorUnavailable)
                    }
                }
            }
        };

        match &decision {
            GateDecision::Admit(identity) => {
                debug!(user = identity.display_name().unwrap_or("-"), "request admitted");
                metrics::inc_gate_admitted();
            }
            GateDecision::Reject(reason) => {
                debug!(reason = reason.as_ref(), "request rejected");
                metrics::inc_gate_rejected(*reason);
            }
        }

        decision
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mock::MockValidator;
    use axum::http::{header, HeaderValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn alice() -> Identity {
        Identity::new(json!({ "login": "alice", "id": 1 }))
    }

    fn gate(mock: &MockValidator) -> Gate {
        Gate::new(Arc::new(mock.clone()), "access_token")
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn admits_valid_token_with_validator_identity() {
        let mock = MockValidator::new().with_user("T1", alice());
        let decision = gate(&mock).admit(&bearer("T1")).await;
        assert_eq!(decision, GateDecision::Admit(alice()));
    }

    #[tokio::test]
    async fn admits_token_from_cookie() {
        let mock = MockValidator::new().with_user("T1", alice());
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=T1"));

        let decision = gate(&mock).admit(&headers).await;
        assert_eq!(decision.identity(), Some(alice()));
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated_without_calling_validator() {
        let mock = MockValidator::new().with_user("T1", alice());
        let decision = gate(&mock).admit(&HeaderMap::new()).await;

        assert_eq!(decision, GateDecision::Reject(GateRejection::Unauthenticated));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn rejected_token_is_invalid() {
        let mock = MockValidator::new().with_user("T1", alice());
        let decision = gate(&mock).admit(&bearer("BAD")).await;
        assert_eq!(decision, GateDecision::Reject(GateRejection::InvalidToken));
    }

    #[tokio::test]
    async fn validator_outage_is_distinguished() {
        let mock = MockValidator::new().with_user("T1", alice());
        mock.set_unavailable(true);

        let decision = gate(&mock).admit(&bearer("T1")).await;
        assert_eq!(
            decision,
            GateDecision::Reject(GateRejection::ValidatorUnavailable)
        );
    }
}
