//! Bearer credentials and the identities they resolve to.

use std::fmt;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// Scheme accepted in the `Authorization` header.
pub const BEARER_SCHEME: &str = "Bearer";

/// Opaque bearer credential taken from a request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw token value, for forwarding to the identity provider.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken([REDACTED])")
    }
}

/// Extract a token from `Authorization: Bearer …`, falling back to the cookie
/// named `cookie_name`. Empty values count as absent.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<AuthToken> {
    bearer_token(headers).or_else(|| cookie_token(headers, cookie_name))
}

fn bearer_token(headers: &HeaderMap) -> Option<AuthToken> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| AuthToken::new(token))
}

fn cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<AuthToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(AuthToken::new)
}

/// User document returned by the identity provider, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(serde_json::Value);

impl Identity {
    /// Fields tried, in order, when naming the user in logs.
    const NAME_FIELDS: [&'static str; 5] =
        ["login", "preferred_username", "username", "email", "name"];

    /// Wrap a provider document.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The provider document.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Best-effort human readable name for the user.
    pub fn display_name(&self) -> Option<&str> {
        Self::NAME_FIELDS
            .iter()
            .find_map(|field| self.0.get(field).and_then(|v| v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn bearer_header_is_extracted() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer T1")]);
        assert_eq!(extract_token(&h, "access_token"), Some(AuthToken::new("T1")));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let h = headers(&[(header::AUTHORIZATION, "bearer T1")]);
        assert_eq!(extract_token(&h, "access_token"), Some(AuthToken::new("T1")));
    }

    #[test]
    fn header_takes_precedence_over_cookie() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "access_token=from-cookie"),
        ]);
        assert_eq!(
            extract_token(&h, "access_token"),
            Some(AuthToken::new("from-header"))
        );
    }

    #[test]
    fn cookie_is_used_when_header_missing() {
        let h = headers(&[(header::COOKIE, "theme=dark; access_token=C1; lang=en")]);
        assert_eq!(extract_token(&h, "access_token"), Some(AuthToken::new("C1")));
    }

    #[test]
    fn cookie_found_across_multiple_headers() {
        let h = headers(&[
            (header::COOKIE, "theme=dark"),
            (header::COOKIE, "session=\"C2\""),
        ]);
        assert_eq!(extract_token(&h, "session"), Some(AuthToken::new("C2")));
    }

    #[test]
    fn basic_auth_falls_back_to_cookie() {
        let h = headers(&[
            (header::AUTHORIZATION, "Basic dXNlcjpwYXNz"),
            (header::COOKIE, "access_token=C3"),
        ]);
        assert_eq!(extract_token(&h, "access_token"), Some(AuthToken::new("C3")));
    }

    #[test]
    fn empty_values_count_as_absent() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer "),
            (header::COOKIE, "access_token="),
        ]);
        assert_eq!(extract_token(&h, "access_token"), None);
        assert_eq!(extract_token(&HeaderMap::new(), "access_token"), None);
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("super-secret");
        assert_eq!(format!("{:?}", token), "AuthToken([REDACTED])");
    }

    #[test]
    fn identity_display_name_prefers_login() {
        let identity = Identity::new(json!({ "email": "a@example.com", "login": "alice" }));
        assert_eq!(identity.display_name(), Some("alice"));

        let identity = Identity::new(json!({ "email": "b@example.com" }));
        assert_eq!(identity.display_name(), Some("b@example.com"));

        let identity = Identity::new(json!({ "id": 7 }));
        assert_eq!(identity.display_name(), None);
    }

    #[test]
    fn identity_serializes_verbatim() {
        let doc = json!({ "login": "alice", "id": 42 });
        let identity = Identity::new(doc.clone());
        assert_eq!(serde_json::to_value(&identity).unwrap(), doc);
    }
}
