use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gallery_common::filename::FilenameError;
use serde_json::json;

use crate::uploads::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    NotFound,
    PayloadTooLarge,
    UnsupportedMediaType,
    DiskWriteFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::DiskWriteFailed => "DISK_WRITE_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::DiskWriteFailed => StatusCode::INSUFFICIENT_STORAGE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::InternalError | Self::DiskWriteFailed)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::NotFound => "requested resource not found",
            Self::PayloadTooLarge => "payload exceeds maximum allowed size",
            Self::UnsupportedMediaType => "only image files are allowed",
            Self::DiskWriteFailed => "server could not persist data",
            Self::InternalError => "internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                }
            })),
        )
            .into_response()
    }
}

impl From<FilenameError> for ApiError {
    fn from(error: FilenameError) -> Self {
        let code = match error {
            FilenameError::NotAnImage(_) => ErrorCode::UnsupportedMediaType,
            _ => ErrorCode::ValidationFailed,
        };
        Self::new(code, error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidName(error) => error.into(),
            StoreError::NotFound(name) => {
                Self::new(ErrorCode::NotFound, format!("image `{name}` not found"))
            }
            StoreError::TooLarge { limit } => Self::new(
                ErrorCode::PayloadTooLarge,
                format!("file exceeds maximum size of {limit} bytes"),
            ),
            StoreError::Io(error) => Self::new(ErrorCode::DiskWriteFailed, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use super::{ApiError, ErrorCode};
    use crate::uploads::StoreError;
    use gallery_common::filename::FilenameError;

    async fn body_json(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        (status, serde_json::from_slice(&body).expect("error response body should be valid json"))
    }

    #[tokio::test]
    async fn error_envelope_shape() {
        let (status, parsed) = body_json(ApiError::from_code(ErrorCode::InternalError)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(parsed["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["error"]["message"], "internal server error");
        assert_eq!(parsed["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn traversal_maps_to_validation_failure() {
        let (status, parsed) =
            body_json(FilenameError::Traversal("..".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parsed["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(parsed["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn store_errors_map_to_status_codes() {
        let (status, parsed) = body_json(StoreError::NotFound("a.jpg".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(parsed["error"]["message"], "image `a.jpg` not found");

        let (status, _) = body_json(StoreError::TooLarge { limit: 10 }.into()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, _) = body_json(
            StoreError::InvalidName(FilenameError::NotAnImage("x.txt".into())).into(),
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
