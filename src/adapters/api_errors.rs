use crate::domain::error::{GatewayError, PipelineError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype so the domain error can implement axum's `IntoResponse`.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match &self.0 {
            PipelineError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PipelineError::WebhookSignature(_) => (
                StatusCode::BAD_REQUEST,
                "webhook_error",
                "invalid webhook signature".to_string(),
            ),
            PipelineError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            PipelineError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            PipelineError::OutOfOrder(msg) => (StatusCode::CONFLICT, "out_of_order", msg.clone()),
            PipelineError::UnknownEvent(kind) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unknown_event",
                format!("unrecognized event type: {kind}"),
            ),
            PipelineError::Gateway(GatewayError::InvalidPayload(msg)) => {
                (StatusCode::BAD_REQUEST, "invalid_payload", msg.clone())
            }
            PipelineError::Gateway(GatewayError::Rejected(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "gateway_rejected",
                msg.clone(),
            ),
            PipelineError::Gateway(err @ (GatewayError::Unavailable(_) | GatewayError::Timeout)) => {
                tracing::warn!("gateway error: {err}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "gateway_unavailable",
                    "payment gateway unavailable".to_string(),
                )
            }
            PipelineError::Database(err) => {
                tracing::error!("database error: {err}");
                internal()
            }
            PipelineError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                internal()
            }
            PipelineError::Timeout => {
                tracing::error!("request processing timed out");
                internal()
            }
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
