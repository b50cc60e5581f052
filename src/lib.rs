pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    domain::{
        gateway::GatewayRegistry,
        store::{AttemptLog, JobQueue},
    },
    services::donations::DonationService,
    std::{sync::Arc, time::Duration},
    tower_http::timeout::TimeoutLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub gateways: Arc<GatewayRegistry>,
    pub jobs: Arc<dyn JobQueue>,
    pub attempts: Arc<dyn AttemptLog>,
    pub donations: Arc<DonationService>,
}

pub fn app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/webhooks/{gateway}", post(adapters::webhook::webhook_handler))
        .route("/donations", post(adapters::donations::create_donation))
        .route("/donations/{id}", get(adapters::donations::get_donation))
        .route("/donations/{id}/cancel", post(adapters::donations::cancel_donation))
        .route("/donations/{id}/refund-request", post(adapters::donations::request_refund))
        .route("/ops/attempts/stats", get(adapters::ops::attempt_stats))
        .route("/ops/reconciliation-gaps", get(adapters::ops::reconciliation_gaps))
        // Provider events are well under 20 KB.
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
