//! Token validation against the identity provider's user-info endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use super::token::{AuthToken, Identity};
use crate::config::Config;
use crate::error::ValidationFailure;

/// Resolves a bearer token to the identity behind it.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Look up the user for `token`.
    ///
    /// `Invalid` means the provider answered and refused the token;
    /// `Unavailable` means no trustworthy answer was obtained.
    async fn validate(&self, token: &AuthToken) -> Result<Identity, ValidationFailure>;
}

/// Validator calling `GET <user_info_url>` with the token as a bearer
/// credential.
#[derive(Debug, Clone)]
pub struct UserInfoValidator {
    http: reqwest::Client,
    url: String,
}

impl UserInfoValidator {
    /// Create a validator from config.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.validator_timeout())
            .connect_timeout(Duration::from_millis(
                config.validator_timeout_ms.min(2_000),
            ))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self::with_client(http, config.user_info_url.clone()))
    }

    /// Create a validator around an existing HTTP client.
    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

/// Map a non-success provider status to a failure kind.
fn classify_status(status: StatusCode) -> ValidationFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ValidationFailure::Invalid(format!("provider returned {}", status))
        }
        _ => ValidationFailure::Unavailable(format!("provider returned {}", status)),
    }
}

#[async_trait]
impl TokenValidator for UserInfoValidator {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn validate(&self, token: &AuthToken) -> Result<Identity, ValidationFailure> {
        let response = self
            .http
            .get(&self.url)
            .bearer_auth(token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "user-info request failed");
                ValidationFailure::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "user-info lookup refused");
            return Err(classify_status(status));
        }

        let document: serde_json::Value = response.json().await.map_err(|e| {
            warn!(error = %e, "user-info response was not JSON");
            ValidationFailure::Unavailable(format!("undecodable user-info response: {}", e))
        })?;

        if !document.is_object() {
            warn!("user-info response was not a JSON object");
            return Err(ValidationFailure::Unavailable(
                "user-info response is not an object".to_string(),
            ));
        }

        Ok(Identity::new(document))
    }
}
