use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use marketscope_core::{DataSource, Engine};
use serde::Serialize;
use serde_json::json;

use crate::api_error::ApiError;

type Params = Vec<(String, String)>;

#[derive(Serialize)]
struct TableSummary {
    name: String,
    filters: Vec<String>,
    aggregations: Vec<String>,
}

pub fn router<S: DataSource>(engine: Arc<Engine<S>>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/api/tables", get(tables::<S>))
        .route("/api/cache", delete(clear_cache::<S>))
        .route("/api/{table}", get(list::<S>))
        .route("/api/{table}/count", get(count::<S>))
        .route("/api/{table}/analytics/{aggregation}", get(analytics::<S>))
        .with_state(engine)
}

/// Reads a positive integer paging parameter; anything else counts as absent.
fn paging_param(params: &Params, key: &str) -> Option<usize> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .and_then(|(_, value)| value.trim().parse().ok())
}

async fn health<S: DataSource>(State(engine): State<Arc<Engine<S>>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "source": engine.source().get_name(),
        "tables": engine.catalog().len(),
        "cache": engine.cache_stats(),
    }))
}

async fn tables<S: DataSource>(State(engine): State<Arc<Engine<S>>>) -> Json<Vec<TableSummary>> {
    let summaries = engine
        .catalog()
        .tables()
        .into_iter()
        .map(|table| TableSummary {
            name: table.name.clone(),
            filters: table.filters.iter().map(|f| f.key.clone()).collect(),
            aggregations: table.aggregations.iter().map(|a| a.id.clone()).collect(),
        })
        .collect();

    Json(summaries)
}

async fn list<S: DataSource>(
    State(engine): State<Arc<Engine<S>>>,
    Path(table): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let page = paging_param(&params, "page");
    let page_size = paging_param(&params, "page_size");

    let page = engine.list_page(&table, &params, page, page_size).await?;
    Ok(Json(page).into_response())
}

async fn count<S: DataSource>(
    State(engine): State<Arc<Engine<S>>>,
    Path(table): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let count = engine.count(&table, &params).await?;
    Ok(Json(json!({ "count": count })).into_response())
}

async fn analytics<S: DataSource>(
    State(engine): State<Arc<Engine<S>>>,
    Path((table, aggregation)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let result = engine.aggregation(&table, &aggregation, &params).await?;
    Ok(Json(result.as_ref()).into_response())
}

async fn clear_cache<S: DataSource>(State(engine): State<Arc<Engine<S>>>) -> StatusCode {
    engine.clear_cache();
    StatusCode::NO_CONTENT
}
