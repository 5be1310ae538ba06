//! HTTP API
//!
//! A thin surface over the query pipeline: a health probe and a query
//! endpoint. Ingestion happens through the CLI, not over HTTP.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::query::Searcher;

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
}

impl AppState {
    pub fn new(searcher: Arc<Searcher>) -> Self {
        Self { searcher }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/query", post(handlers::query))
        .with_state(state)
}
