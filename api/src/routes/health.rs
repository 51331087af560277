use axum::Router;
use axum::extract::State;
use axum::routing::get;
use axum::Json;
use chrono::Utc;
use domain::HealthCheckReply;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health_check))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health_check(State(state): State<AppState>) -> Json<HealthCheckReply> {
    Json(HealthCheckReply {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        timestamp: Utc::now(),
    })
}
