//! Health check endpoints.
//!
//! `/ping` is the endpoint image clients probe before talking to the
//! registry; `/healthz` and `/livez` serve orchestration probes.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Ping response understood by image clients.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct Pong {
    pub ping: String,
    pub version: String,
    pub imgapi: bool,
}

/// Body of `/healthz`. The registry has no remote dependencies, so a
/// process that answers is healthy.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    /// Always `registry`.
    pub service: String,
    pub version: String,
    /// RFC 3339 time the probe was answered.
    pub timestamp: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/healthz", get(healthz))
        .route("/livez", get(livez))
}

async fn ping() -> impl IntoResponse {
    Json(Pong {
        ping: "pong".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        imgapi: true,
    })
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "registry".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// Empty body.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_ping_reports_pong() {
        let response = ping().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let pong: Pong = serde_json::from_slice(&body).unwrap();
        assert_eq!(pong.ping, "pong");
        assert!(pong.imgapi);
        assert_eq!(pong.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_healthz_returns_ok() {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.service, "registry");
        assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_livez_returns_ok() {
        let response = livez().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
