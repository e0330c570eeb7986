use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors that can cross a store/detector boundary inside the service.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised while evaluating a single detector. These never cross the
/// ingest boundary: the engine catches them per-detector and logs a warning,
/// treating the detector as "no detection" for that request.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model unavailable")]
    ModelUnavailable,

    #[error("pattern compile error: {0}")]
    PatternCompile(#[from] regex::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type DetectorResult<T> = std::result::Result<T, DetectorError>;

/// Errors that can be returned directly from an HTTP handler. These map to
/// the exact status codes named in the external interface contract.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unknown api key")]
    UnknownApiKey,

    #[error("api is not active")]
    ApiInactive,

    #[error("invalid request body: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            IngestError::UnknownApiKey => (StatusCode::UNAUTHORIZED, self.to_string()),
            IngestError::ApiInactive => (StatusCode::FORBIDDEN, self.to_string()),
            IngestError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            IngestError::Store(e) => {
                tracing::error!(error = %e, "storage failure handling ingest request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, axum::Json(json!({ "detail": message }))).into_response()
    }
}

/// Top-level error for configuration and startup failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_api_key_maps_to_401() {
        let resp = IngestError::UnknownApiKey.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn inactive_api_maps_to_403() {
        let resp = IngestError::ApiInactive.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn validation_maps_to_400() {
        let resp = IngestError::Validation("bad field".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_error_maps_to_500() {
        let resp = IngestError::Store(StoreError::NotFound).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
