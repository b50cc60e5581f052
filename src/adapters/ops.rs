use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::PipelineError, gateway::GatewayName, job::WebhookJob},
        services::audit_trail::{AttemptReport, attempt_report},
    },
    axum::{
        Json,
        extract::{Query, State},
    },
    serde::Deserialize,
};

const GAP_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub gateway: Option<String>,
    pub hours: Option<i64>,
}

pub async fn attempt_stats(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<Json<AttemptReport>, ApiError> {
    let gateway = q
        .gateway
        .as_deref()
        .map(GatewayName::try_from)
        .transpose()
        .map_err(|e| PipelineError::Validation(e.to_string()))?;
    let report = attempt_report(&*state.attempts, gateway, q.hours.unwrap_or(24)).await?;
    Ok(Json(report))
}

/// Jobs whose retries ran out: donations that may disagree with the gateway.
pub async fn reconciliation_gaps(
    State(state): State<AppState>,
) -> Result<Json<Vec<WebhookJob>>, ApiError> {
    Ok(Json(state.jobs.failed_jobs(GAP_LIMIT).await?))
}
