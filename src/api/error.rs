//! Response envelope and error mapping.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::{EcommerceError, ErrorKind};

static EXPOSE_DETAIL: AtomicBool = AtomicBool::new(false);

/// Include server-side error detail in responses (development only).
pub fn expose_error_detail(enabled: bool) { EXPOSE_DETAIL.store(enabled, Ordering::Relaxed); }

/// Every response body, success or failure:
///
/// ```json
/// { "success": false, "message": "...", "kind": "conflict" }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self { Self::with_status(StatusCode::OK, "Success", data) }

    pub fn created(data: T, message: impl Into<String>) -> Self { Self::with_status(StatusCode::CREATED, message, data) }

    pub fn with_message(data: T, message: impl Into<String>) -> Self { Self::with_status(StatusCode::OK, message, data) }

    fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: message.into(), data: Some(data), kind: None, detail: None, status }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response { (self.status, Json(self)).into_response() }
}

/// Handler error: an [`EcommerceError`] on its way to becoming a response.
#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

impl From<EcommerceError> for ApiError {
    fn from(e: EcommerceError) -> Self { Self(e) }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self { Self(EcommerceError::Validation(e.body_text())) }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self { Self(EcommerceError::Validation(e.body_text())) }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self { Self(EcommerceError::Validation(e.body_text())) }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::TransactionAbort | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let kind = error.kind();
        let status = status_for(kind);
        let (message, detail) = if error.is_client_error() {
            (error.to_string(), None)
        } else {
            tracing::error!(error = %error, ?kind, "request failed");
            let message = match kind {
                ErrorKind::TransactionAbort => "The request could not be completed, please try again",
                _ => "Internal server error",
            };
            (message.to_string(), EXPOSE_DETAIL.load(Ordering::Relaxed).then(|| error.to_string()))
        };
        let body = ApiResponse::<()> { success: false, message, data: None, kind: Some(kind), detail, status };
        (status, Json(body)).into_response()
    }
}
