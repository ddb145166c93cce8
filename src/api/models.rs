use crate::db::models::BuildRun;
use crate::rag::ContextRecord;
use serde::{Deserialize, Serialize};

/// Search request parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub k: Option<usize>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ContextRecord>,
}

/// Ask request body
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub k: Option<usize>,
    #[serde(default)]
    pub delegate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_meals: i64,
    pub total_ingredient_lines: i64,
    pub latest_build: Option<BuildRun>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: String,
    pub search_index: String,
}
