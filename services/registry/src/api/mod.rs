//! HTTP API handlers and routing.

pub mod error;
mod health;
mod images;
mod request_context;

use axum::{
    http::{header, HeaderName, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub use request_context::REQUEST_ID_HEADER;

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_LENGTH, HeaderName::from_static("content-md5")])
        .allow_origin(Any);

    Router::new()
        // Health endpoints
        .merge(health::routes())
        // Image endpoints
        .merge(images::routes())
        // Middleware (outermost last)
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        // Application state
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use imgreg_pool::{ImagePool, PoolConfig, SaveFailurePolicy};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(dir: &TempDir) -> Router {
        let images = ImagePool::open(PoolConfig {
            image_dir: dir.path().join("images"),
            manifests_path: dir.path().join("manifests.json"),
            on_save_failure: SaveFailurePolicy::Retain,
        })
        .unwrap();
        create_router(AppState::new(images))
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_propagated() {
        let dir = TempDir::new().unwrap();
        let response = test_router(&dir)
            .oneshot(Request::get("/livez").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_error_body_carries_request_id() {
        let dir = TempDir::new().unwrap();
        let response = test_router(&dir)
            .oneshot(
                Request::get("/images/missing")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "ResourceNotFound");
        assert_eq!(body["request_id"], "req-42");
    }
}
