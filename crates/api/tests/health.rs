//! Integration tests for the health check endpoint and general HTTP behaviour.
//!
//! The pool here points at a closed port, so these run without Postgres.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, build_test_app, get, unreachable_pool};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: GET /health reports a degraded database
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_degraded_without_database() {
    let app = build_test_app(unreachable_pool(), true);
    let _member = app.registry.register(aat_core::types::new_project_id(), "c");

    let response = get(app.router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["db_healthy"], false);
    assert_eq!(json["ws_connections"], 1);
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app(unreachable_pool(), true);
    let response = get(app.router, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app(unreachable_pool(), true);
    let response = get(app.router, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: CORS preflight for the configured origin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = build_test_app(unreachable_pool(), true);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/projects")
                .header("origin", "http://localhost:5173")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );
}

// ---------------------------------------------------------------------------
// Test: the WebSocket route rejects plain HTTP requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ws_route_requires_upgrade() {
    let app = build_test_app(unreachable_pool(), false);
    let uri = format!(
        "/api/v1/ws/projects/{}/annotations",
        aat_core::types::new_project_id()
    );

    let response = get(app.router, &uri).await;

    assert!(response.status().is_client_error());
    assert_eq!(app.registry.connection_count(), 0);
}
