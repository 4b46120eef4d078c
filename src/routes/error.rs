// Maps ledger errors onto HTTP responses with a JSON body.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use crate::ledger::LedgerError;

pub const SUPPORT_MESSAGE: &str = "could not complete the operation, please contact support";

/// Seconds a client should wait before retrying a transient failure.
pub const RETRY_AFTER_SECS: &str = "1";

pub struct ApiError(pub LedgerError);

/// JSON request body whose rejections come back in the same shape as
/// ledger validation errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LedgerError::validation("body", rejection.body_text()))
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let transient = self.0.is_transient();
        let (status, body) = match self.0 {
            LedgerError::Validation { field, message } => {
                warn!(%field, %message, "request rejected");
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "validation", "field": field, "message": message }),
                )
            }
            LedgerError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": format!("{entity} {id} not found") }),
            ),
            LedgerError::Conflict { student_id } => {
                warn!(%student_id, "write conflict surfaced to caller");
                (
                    StatusCode::CONFLICT,
                    json!({ "error": "conflict", "message": "the record changed while saving, please retry" }),
                )
            }
            // Logged with full context by the reconciler already.
            LedgerError::Consistency { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "consistency", "message": SUPPORT_MESSAGE }),
            ),
            LedgerError::Storage(err) => {
                error!(error = %format!("{err:#}"), "storage failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "storage", "message": "storage is unavailable, please retry" }),
                )
            }
        };
        let mut response = (status, Json(body)).into_response();
        if transient {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
