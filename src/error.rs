//! 上传请求的错误类型与响应转换。

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::response::html_response;
use crate::storage::StorageError;

pub const UPLOAD_FAILED_MESSAGE: &str = "Error uploading file";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(HeaderMap),
    MethodNotAllowed,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                html_response(StatusCode::BAD_REQUEST, HeaderMap::new(), &msg)
            }
            ApiError::Unauthorized(headers) => {
                html_response(StatusCode::UNAUTHORIZED, headers, "Authentication required")
            }
            ApiError::MethodNotAllowed => {
                let mut headers = HeaderMap::new();
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD, POST"));
                html_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    headers,
                    "Request method not allowed",
                )
            }
            ApiError::Internal(msg) => {
                html_response(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), &msg)
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::BadRequest("Invalid upload path".into()),
            StorageError::Io(_) => ApiError::Internal(UPLOAD_FAILED_MESSAGE.into()),
        }
    }
}
