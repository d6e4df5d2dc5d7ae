use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use imgreg_pool::{ErrorClass, PoolError};
use serde::Serialize;

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub description: String,
    pub request_id: String,
}

impl ErrorBody {
    fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            request_id: "unknown".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Box<ErrorBody>,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status,
            body: Box::new(ErrorBody::new(code, description)),
        }
    }

    pub fn bad_request(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, description)
    }

    pub fn invalid_parameter() -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "InvalidParameter",
            "Given parameter was invalid.",
        )
    }

    /// Map a pool error to its wire status, code and description.
    pub fn from_pool(err: &PoolError) -> Self {
        let status = match err {
            PoolError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            PoolError::InvalidParameter(_)
            | PoolError::ImageAlreadyActivated
            | PoolError::NoActivationNoFile => StatusCode::UNPROCESSABLE_ENTITY,
            PoolError::Upload(_) => StatusCode::BAD_REQUEST,
            _ => match err.class() {
                ErrorClass::NotFound => StatusCode::NOT_FOUND,
                ErrorClass::Client => StatusCode::BAD_REQUEST,
                ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        Self::new(status, err.code(), err.description())
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.body.request_id = request_id.into();
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_statuses() {
        let cases = [
            (PoolError::ResourceNotFound("x".into()), StatusCode::NOT_FOUND),
            (PoolError::InvalidParameter("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PoolError::ImageAlreadyActivated, StatusCode::UNPROCESSABLE_ENTITY),
            (PoolError::NoActivationNoFile, StatusCode::UNPROCESSABLE_ENTITY),
            (PoolError::NotActivated, StatusCode::SERVICE_UNAVAILABLE),
            (PoolError::Upload("reset".into()), StatusCode::BAD_REQUEST),
            (
                PoolError::Io(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let api = ApiError::from_pool(&err);
            assert_eq!(api.status, status, "{err}");
            assert_eq!(api.body.code, err.code());
        }
    }

    #[test]
    fn test_request_id_is_attached() {
        let err = ApiError::invalid_parameter().with_request_id("req-1");
        assert_eq!(err.body.request_id, "req-1");
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
