use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use crate::{
    api::models::*,
    db::{self, models::MealDetails, DbPool},
    rag::RetrievalEngine,
    Error, Result,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub engine: RetrievalEngine,
    pub default_k: usize,
}

impl AppState {
    fn k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_k)
    }
}

/// GET /api/search - Ranked meals for a free-text query
pub async fn search_meals(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    debug!("Search request: {:?}", params);

    let retrieval = state.engine.retrieve(&params.q, state.k(params.k)).await?;

    Ok(Json(SearchResponse {
        query: params.q,
        results: retrieval.contexts().to_vec(),
    }))
}

/// GET /api/meals/:id - Meal with its ingredient lines
pub async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MealDetails>> {
    debug!("Get meal request: {}", id);

    let details = db::meals::get_meal_details(&state.pool, id).await?;
    Ok(Json(details))
}

/// POST /api/ask - Answer a question from the index
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    if request.question.trim().is_empty() {
        return Err(Error::Validation("question must not be empty".to_string()));
    }

    let answer = state
        .engine
        .answer(&request.question, state.k(request.k), request.delegate)
        .await?;

    Ok(Json(AskResponse {
        question: request.question,
        answer,
    }))
}

/// GET /api/stats - Index statistics
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Stats>> {
    let stats = db::meals::index_stats(&state.pool).await?;

    Ok(Json(Stats {
        total_meals: stats.meals,
        total_ingredient_lines: stats.ingredient_lines,
        latest_build: stats.latest_run,
    }))
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// GET /ready - Ready once the database answers and holds at least one meal
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();
    let index_healthy = matches!(db::meals::count_meals(&state.pool).await, Ok(n) if n > 0);

    let ready = db_healthy && index_healthy;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database: if db_healthy { "ok" } else { "error" }.to_string(),
            search_index: if index_healthy { "ok" } else { "empty" }.to_string(),
        }),
    )
}
