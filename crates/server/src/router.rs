//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/status", get(api::status))
        .route("/validate", post(api::validate))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS origin, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use conform_core::{Settings, ValidationError, ValidationResult, Validator};
    use conform_dispatch::{CollectingPublisher, Dispatcher};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct EchoEngine;

    impl Validator for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }

        fn initialise(&mut self) -> Result<(), ValidationError> {
            Ok(())
        }

        fn validate(&self, event: &Value, _source: &str) -> Result<Vec<ValidationResult>, ValidationError> {
            if event["entity"]["fail"] == json!(true) {
                return Err(ValidationError::Execution("boom".to_string()));
            }
            let entity = conform_core::Entity::new("vserver", event["entity"].clone());
            Ok(vec![ValidationResult::new(&entity, Vec::new())])
        }
    }

    fn app() -> Router {
        let settings = Settings::from_toml("[dispatch]\nrule_event_types = [\"AAI-EVENT\"]\n").unwrap();
        let dispatcher = Dispatcher::new(&settings, Box::new(CollectingPublisher::new()))
            .with_rule_engine(Box::new(EchoEngine));
        let state = Arc::new(AppState {
            dispatcher: Arc::new(dispatcher),
        });
        build_router(state, "*")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn validate_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn validate_returns_results() {
        let event = json!({
            "event-header": {"event-type": "AAI-EVENT", "entity-type": "vserver"},
            "entity": {"vserver-id": "v1"}
        });
        let response = app().oneshot(validate_request("/validate", event)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["entityType"], "vserver");
        assert!(results[0]["violations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_without_identity_is_500() {
        let event = json!({
            "event-header": {"event-type": "AAI-EVENT"},
            "entity": {"fail": true}
        });
        let response = app().oneshot(validate_request("/validate", event)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn engine_failure_with_identity_returns_the_record() {
        let event = json!({
            "event-header": {"event-type": "AAI-EVENT", "entity-type": "vserver"},
            "entity": {"vserver-id": "v1", "fail": true}
        });
        let response = app().oneshot(validate_request("/validate", event)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["violations"][0]["category"], "CANNOT_VALIDATE");
    }

    #[tokio::test]
    async fn status_counts_by_source() {
        let app = app();
        let event = json!({"event-header": {"event-type": "END-EVENT"}});
        app.clone()
            .oneshot(validate_request("/validate?source=bus", event))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["bus"]["end"], 1);
        assert_eq!(body["bus"]["total"], 1);
    }

    #[tokio::test]
    async fn unknown_sources_do_not_add_buckets() {
        let app = app();
        for i in 0..20 {
            let event = json!({"event-header": {"event-type": "END-EVENT"}});
            app.clone()
                .oneshot(validate_request(&format!("/validate?source=caller-{i}"), event))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        let buckets = body.as_object().unwrap();
        assert_eq!(buckets.len(), 4);
        assert_eq!(body["other"]["end"], 20);
    }
}
