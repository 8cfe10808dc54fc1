//! `GET /health` for operators and supervisors.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Session lifecycle state.
    pub session: &'static str,
    /// Connected consumers.
    pub consumers: usize,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        session: state.session.state().await.as_str(),
        consumers: state.registry.count().await,
    })
}
