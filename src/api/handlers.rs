//! API handlers

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::query::QueryMatch;
use crate::types::Record;

use super::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dimension: state.searcher.encoder().dimension(),
        bands: state.searcher.template().bands(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dimension: usize,
    pub bands: usize,
}

pub async fn query(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    if payload.attrs.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "'attrs' must not be empty".to_string(),
        ));
    }

    let start = Instant::now();
    let record = Record::new(0, payload.attrs);
    let results = state
        .searcher
        .query(&record, payload.top_k)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(QueryResponse {
        results,
        took_ms: start.elapsed().as_millis() as u64,
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub attrs: HashMap<String, String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryMatch>,
    pub took_ms: u64,
}
