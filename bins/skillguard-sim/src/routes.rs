use std::sync::Arc;

use axum::{Router, extract::State, response::Json, routing::get};
use serde_json::{Value, json};

use skillguard_service::{DashboardSnapshot, RiskService};

pub fn router(service: Arc<RiskService>) -> Router {
    Router::new()
        .route("/api/risk/dashboard", get(dashboard))
        .route("/healthz", get(health))
        .with_state(service)
}

async fn dashboard(State(service): State<Arc<RiskService>>) -> Json<DashboardSnapshot> {
    Json(service.dashboard())
}

async fn health(State(service): State<Arc<RiskService>>) -> Json<Value> {
    Json(json!({ "ok": true, "engine": service.engine_name() }))
}
