//! HTTP API route definitions.

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::assets::{app_js, index};
use super::handlers::{containers, current_user, deploy, health, status, AppState};
use crate::auth::require_identity;

/// Create the API router.
///
/// Everything except `/health` and `/rest/user` sits behind the gate.
pub fn create_router(state: AppState) -> Router {
    let gated = Router::new()
        // Status
        .route("/rest/status", get(status))
        .route("/rest/status/:project", get(status))
        // Containers
        .route("/rest/containers", get(containers))
        .route("/rest/containers/:project", get(containers))
        // Deploy
        .route("/rest/deploy/:project/:environment", get(deploy))
        // Assets
        .route("/", get(index))
        .route("/app.js", get(app_js))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/rest/user", get(current_user))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, MockValidator};
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(mock: MockValidator, config: Config) -> Router {
        create_router(AppState::new(config, Arc::new(mock)))
    }

    fn app() -> (Router, MockValidator) {
        let mock = MockValidator::new().with_user("T1", Identity::new(json!({ "login": "alice" })));
        let config = Config {
            status_command: "echo \"status:$DEPLOYBOARD_PROJECT\"".to_string(),
            deploy_command: "echo \"deploy:$DEPLOYBOARD_PROJECT:$DEPLOYBOARD_ENVIRONMENT\""
                .to_string(),
            flush_period_ms: 10,
            ..Config::with_user_info_url("https://id.example.com/user")
        };
        (app_with(mock.clone(), config), mock)
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (app, mock) = app();
        let response = app.oneshot(get_request("/health", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn current_user_returns_identity() {
        let (app, _) = app();
        let response = app.oneshot(get_request("/rest/user", Some("T1"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let user: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(user, json!({ "login": "alice" }));
    }

    #[tokio::test]
    async fn current_user_is_null_but_ok_when_unauthenticated() {
        for token in [None, Some("BAD")] {
            let (app, _) = app();
            let response = app.oneshot(get_request("/rest/user", token)).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await.trim(), "null");
        }
    }

    #[tokio::test]
    async fn gated_routes_require_token() {
        let (app, _) = app();
        let response = app.oneshot(get_request("/rest/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["reason"], "unauthenticated");
    }

    #[tokio::test]
    async fn invalid_token_is_401() {
        let (app, _) = app();
        let response = app.oneshot(get_request("/", Some("BAD"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validator_outage_is_503() {
        let (app, mock) = app();
        mock.set_unavailable(true);

        let response = app.oneshot(get_request("/rest/status", Some("T1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn browser_redirected_to_login() {
        let config = Config {
            login_url: Some("https://id.example.com/login".to_string()),
            ..Config::with_user_info_url("https://id.example.com/user")
        };
        let app = app_with(MockValidator::new(), config);

        let request = Request::builder()
            .uri("/")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://id.example.com/login"
        );
    }

    #[tokio::test]
    async fn index_served_when_admitted() {
        let (app, _) = app();
        let response = app.oneshot(get_request("/", Some("T1"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("<title>deployboard</title>"));
    }

    #[tokio::test]
    async fn status_streams_command_output() {
        let (app, _) = app();
        let response = app
            .oneshot(get_request("/rest/status/shop", Some("T1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "status:shop\nexit status: 0\n");
    }

    #[tokio::test]
    async fn status_without_project_passes_empty_name() {
        let (app, _) = app();
        let response = app
            .oneshot(get_request("/rest/status", Some("T1")))
            .await
            .unwrap();

        assert_eq!(body_string(response).await, "status:\nexit status: 0\n");
    }

    #[tokio::test]
    async fn deploy_streams_command_output() {
        let (app, _) = app();
        let response = app
            .oneshot(get_request("/rest/deploy/shop/staging", Some("T1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "deploy:shop:staging\nexit status: 0\n"
        );
    }

    #[tokio::test]
    async fn deploy_rejects_unsafe_names() {
        let (app, _) = app();
        let response = app
            .oneshot(get_request("/rest/deploy/shop/st%24ging", Some("T1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
