use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use serde_json::json;

use crate::services::classifier::ApiError;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, message = %self.message, "Request failed");
        } else {
            tracing::warn!(kind = %self.kind, message = %self.message, "Request rejected");
        }
        let body = json!({
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Unwrap a JSON body and run its garde rules. Both failures are `ParamsInvalid`.
pub fn validated<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError>
where
    T: Validate,
    T::Context: Default,
{
    let Json(body) = payload.map_err(|rejection| ApiError::params_invalid(rejection.body_text()))?;
    body.validate()
        .map_err(|report| ApiError::params_invalid(report.to_string()))?;
    Ok(body)
}
