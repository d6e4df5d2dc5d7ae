//! Image API endpoints.
//!
//! Manifest CRUD, the single-file upload and download, and the
//! activate/enable/disable actions.

use std::collections::HashSet;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use imgreg_pool::{ErrorClass, Filter, Manifest, ManifestDraft, PoolError};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Create image routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/images", get(list_images).post(create_image))
        .route(
            "/images/{uuid}",
            get(get_image).post(image_action).delete(delete_image),
        )
        .route("/images/{uuid}/file", get(get_image_file).put(add_image_file))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub compression: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Build list filters from raw query pairs.
///
/// Only the first value of a repeated field counts and unknown fields are
/// ignored. Without a non-empty `state` the listing is restricted to
/// active images.
pub(crate) fn filters_from_query(params: &[(String, String)]) -> Vec<Filter> {
    let mut seen = HashSet::new();
    let mut filters = Vec::new();
    let mut has_state = false;

    for (field, value) in params {
        if !seen.insert(field.as_str()) {
            continue;
        }
        if field == "state" {
            if value.is_empty() {
                continue;
            }
            has_state = true;
        }
        if let Some(filter) = Filter::from_query(field, value) {
            filters.push(filter);
        }
    }

    if !has_state {
        filters.push(Filter::state("active"));
    }
    filters
}

/// Log a pool failure and convert it into an API error.
fn pool_error(ctx: &RequestContext, op: &'static str, err: PoolError) -> ApiError {
    match err.class() {
        ErrorClass::Server => {
            error!(request_id = %ctx.request_id, op, error = %err, "Image operation failed")
        }
        _ => warn!(
            request_id = %ctx.request_id,
            op,
            code = err.code(),
            error = %err,
            "Image request rejected"
        ),
    }
    ApiError::from_pool(&err).with_request_id(ctx.request_id.clone())
}

// =============================================================================
// Handlers
// =============================================================================

/// List images.
///
/// GET /images
async fn list_images(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Vec<Manifest>> {
    let filters = filters_from_query(&params);
    let images = state.images().list(&filters).await;
    info!(
        request_id = %ctx.request_id,
        filters = filters.len(),
        count = images.len(),
        "Listed images"
    );
    Json(images)
}

/// Get a manifest by uuid.
///
/// GET /images/{uuid}
async fn get_image(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(uuid): Path<String>,
) -> Result<Json<Manifest>, ApiError> {
    state
        .images()
        .get(&uuid)
        .await
        .map(Json)
        .map_err(|e| pool_error(&ctx, "images.get", e))
}

/// Stream the image's file.
///
/// GET /images/{uuid}/file
async fn get_image_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(uuid): Path<String>,
) -> Result<Response, ApiError> {
    let blob = state
        .images()
        .get_file(&uuid)
        .await
        .map_err(|e| pool_error(&ctx, "images.get_file", e))?;

    let content_md5 = HeaderValue::from_str(&STANDARD.encode(&blob.checksum)).map_err(|e| {
        error!(request_id = %ctx.request_id, error = %e, "Invalid checksum header");
        ApiError::from_pool(&PoolError::Io(std::io::Error::other(e)))
            .with_request_id(ctx.request_id.clone())
    })?;
    let size = blob.size;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
            (header::HeaderName::from_static("content-md5"), content_md5),
        ],
        Body::from_stream(blob.into_stream()),
    )
        .into_response())
}

/// Create an unactivated manifest.
///
/// POST /images
async fn create_image(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<ManifestDraft>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(draft) = payload.map_err(|rejection| {
        warn!(request_id = %ctx.request_id, error = %rejection, "Malformed manifest body");
        ApiError::bad_request("BadRequestError", rejection.body_text())
            .with_request_id(ctx.request_id.clone())
    })?;

    let manifest = state
        .images()
        .create(draft)
        .await
        .map_err(|e| pool_error(&ctx, "images.create", e))?;

    Ok((StatusCode::OK, Json(manifest)).into_response())
}

/// Upload the image's file.
///
/// PUT /images/{uuid}/file?compression=none|gzip|bzip2
async fn add_image_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(uuid): Path<String>,
    Query(query): Query<FileQuery>,
    body: Body,
) -> Result<Json<Manifest>, ApiError> {
    let compression = match query.compression {
        Some(c) if !c.is_empty() => c,
        _ => {
            warn!(request_id = %ctx.request_id, uuid = %uuid, "Upload without compression");
            return Err(ApiError::invalid_parameter().with_request_id(ctx.request_id.clone()));
        }
    };

    state
        .images()
        .add_file(&uuid, &compression, body.into_data_stream())
        .await
        .map(Json)
        .map_err(|e| pool_error(&ctx, "images.add_file", e))
}

/// Apply a lifecycle action.
///
/// POST /images/{uuid}?action=activate|enable|disable
async fn image_action(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(uuid): Path<String>,
    Query(query): Query<ActionQuery>,
) -> Result<Json<Manifest>, ApiError> {
    let images = state.images();
    let (op, result) = match query.action.as_deref() {
        Some("activate") => ("images.activate", images.activate(&uuid).await),
        Some("enable") => ("images.enable", images.set_disabled(&uuid, false).await),
        Some("disable") => ("images.disable", images.set_disabled(&uuid, true).await),
        other => {
            warn!(request_id = %ctx.request_id, uuid = %uuid, action = ?other, "Unknown image action");
            return Err(ApiError::invalid_parameter().with_request_id(ctx.request_id.clone()));
        }
    };

    result.map(Json).map_err(|e| pool_error(&ctx, op, e))
}

/// Delete an image and its file.
///
/// DELETE /images/{uuid}
async fn delete_image(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .images()
        .delete(&uuid)
        .await
        .map_err(|e| pool_error(&ctx, "images.delete", e))?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgreg_pool::NameMatch;
    use rstest::rstest;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_query_lists_active_only() {
        assert_eq!(filters_from_query(&[]), vec![Filter::state("active")]);
    }

    #[rstest]
    #[case(&[("state", "all")], vec![Filter::state("all")])]
    #[case(&[("state", "")], vec![Filter::state("active")])]
    #[case(
        &[("owner", "o1"), ("owner", "o2")],
        vec![Filter::owner("o1"), Filter::state("active")]
    )]
    #[case(&[("color", "red")], vec![Filter::state("active")])]
    #[case(
        &[("name", "~bas"), ("state", "disabled")],
        vec![Filter::Name(NameMatch::Contains("bas".into())), Filter::state("disabled")]
    )]
    fn test_filters_from_query(#[case] query: &[(&str, &str)], #[case] expected: Vec<Filter>) {
        assert_eq!(filters_from_query(&pairs(query)), expected);
    }
}
