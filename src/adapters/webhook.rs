use {
    crate::{
        AppState,
        domain::error::{GatewayError, PipelineError},
        services::ingress::accept_webhook,
    },
    axum::{
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
    },
};

/// `POST /webhooks/{gateway}`. Providers only look at the status code, so
/// the body stays plain text. Business outcomes never surface here: once
/// the delivery is verified and queued the answer is 200.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(
        gateway = tracing::field::Empty,
        event_id = tracing::field::Empty,
        event_type = tracing::field::Empty
    )
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    tracing::Span::current().record("gateway", tracing::field::display(&gateway));

    let signature = state
        .gateways
        .resolve(&gateway)
        .ok()
        .and_then(|adapter| headers.get(adapter.signature_header()))
        .and_then(|v| v.to_str().ok());

    match accept_webhook(&state.gateways, &*state.jobs, &gateway, &body, signature).await {
        Ok(accepted) => {
            tracing::Span::current()
                .record("event_id", tracing::field::display(&accepted.event_id))
                .record("event_type", tracing::field::display(&accepted.event_type));
            tracing::info!(result = ?accepted.result, "webhook accepted");
            (StatusCode::OK, "OK")
        }
        Err(PipelineError::NotFound(msg)) => {
            tracing::warn!("{msg}");
            (StatusCode::NOT_FOUND, "Unknown gateway")
        }
        Err(PipelineError::Gateway(GatewayError::InvalidPayload(msg))) => {
            tracing::warn!("invalid webhook payload: {msg}");
            (StatusCode::BAD_REQUEST, "Invalid JSON payload")
        }
        Err(PipelineError::WebhookSignature(msg)) => {
            tracing::warn!("webhook validation failed: {msg}");
            (StatusCode::BAD_REQUEST, "Webhook validation failed")
        }
        Err(e) => {
            tracing::error!(error = %e, "webhook ingress failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
