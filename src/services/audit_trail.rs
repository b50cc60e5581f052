use {
    crate::domain::{
        attempt::{AttemptStats, SuspiciousPattern, detect_suspicious_patterns},
        error::PipelineError,
        gateway::GatewayName,
        store::AttemptLog,
    },
    chrono::{TimeDelta, Utc},
    serde::Serialize,
};

#[derive(Debug, Serialize)]
pub struct AttemptReport {
    pub window_hours: i64,
    pub gateway: Option<GatewayName>,
    pub stats: AttemptStats,
    pub suspicious: Vec<SuspiciousPattern>,
}

/// Statistics over the attempt log for the last `hours`.
pub async fn attempt_report(
    log: &dyn AttemptLog,
    gateway: Option<GatewayName>,
    hours: i64,
) -> Result<AttemptReport, PipelineError> {
    if !(1..=24 * 90).contains(&hours) {
        return Err(PipelineError::Validation(format!(
            "hours must be between 1 and {}, got {hours}",
            24 * 90
        )));
    }
    let since = Utc::now() - TimeDelta::hours(hours);
    let attempts = log.attempts_since(since, gateway).await?;

    Ok(AttemptReport {
        window_hours: hours,
        gateway,
        stats: AttemptStats::from_attempts(&attempts),
        suspicious: detect_suspicious_patterns(&attempts),
    })
}
