use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::coordinator::{CoordinatorError, QueryAnswer};
use crate::schema::{SchemaCatalog, SchemaSnapshot};
use crate::web::state::AppState;

// Request and response types

#[derive(Debug, Deserialize, Clone)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub database_count: usize,
    pub refreshed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub llm_backend: String,
    pub database_count: usize,
    pub table_count: usize,
    pub last_schema_refresh: Option<chrono::DateTime<chrono::Utc>>,
}

// API Implementations

/// Answers a question across every cataloged database. Dropping the request
/// (client disconnect) cancels the in-flight oracle and database calls.
#[instrument(skip(state, payload))]
pub async fn ask(
    state: State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<QueryAnswer>, (StatusCode, String)> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    info!("Processing question: {}", question);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let result = state.coordinator.ask(question, &cancel).await;
    guard.disarm();

    match result {
        Ok(answer) => Ok(Json(answer)),
        Err(CoordinatorError::NoSchemas) => {
            warn!("Question received before any schema was loaded");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                CoordinatorError::NoSchemas.to_string(),
            ))
        }
        Err(CoordinatorError::Cancelled) => Err((
            StatusCode::REQUEST_TIMEOUT,
            CoordinatorError::Cancelled.to_string(),
        )),
    }
}

pub async fn list_schemas(state: State<Arc<AppState>>) -> Json<Vec<SchemaSnapshot>> {
    Json(state.schema_manager.get_all_schemas().await)
}

#[instrument(skip(state))]
pub async fn refresh_schemas(
    state: State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, (StatusCode, String)> {
    let database_count = state.schema_manager.refresh_cache().await.map_err(|e| {
        error!("Failed to refresh schema cache: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to refresh schemas: {}", e),
        )
    })?;

    Ok(Json(RefreshResponse {
        database_count,
        refreshed_at: state
            .schema_manager
            .last_refresh()
            .await
            .unwrap_or_else(chrono::Utc::now),
    }))
}

pub async fn system_status(state: State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let schemas = state.schema_manager.get_all_schemas().await;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        llm_backend: state.config.llm.backend.clone(),
        database_count: schemas.len(),
        table_count: schemas.iter().map(|s| s.tables.len()).sum(),
        last_schema_refresh: state.schema_manager.last_refresh().await,
    })
}
