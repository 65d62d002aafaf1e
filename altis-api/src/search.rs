use axum::{extract::State, routing::{get, post}, Json, Router};
use altis_core::{CoreError, ProviderId, SearchRequest, SearchResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/search", post(search_flights))
        .route("/health", get(health))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/flights/search
/// One result per requested leg, in request order
pub async fn search_flights(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    tracing::info!("Flight search: {} leg(s), {} passenger(s)", req.legs.len(), req.passengers);

    let response = state.orchestrator.search(req).await.map_err(|e| match e {
        CoreError::RequestInvalid(msg) => AppError::ValidationError(msg),
        other => AppError::Anyhow(other.into()),
    })?;

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderId>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        providers: state.orchestrator.provider_ids(),
    })
}
