use axum::{
    extract::{State, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::api::AppState;
use crate::export::ExportDocument;

#[derive(Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize { 50 }

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> Json<Value> {
    let capacity = state.settings.read().await.ledger_capacity;
    let ledger = state.processor.ledger().backend.load(capacity).await;
    let limit = query.limit.min(capacity);

    Json(json!({
        "transactions": ledger.list(limit),
        "total": ledger.len(),
        "limit": limit,
    }))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> Json<Value> {
    let entries = state.reactions.leaderboard().list().await;
    Json(json!({ "leaderboard": entries }))
}

pub async fn get_notifications(
    State(state): State<AppState>,
) -> Json<Value> {
    let notifications = state.reactions.notifications().list().await;
    Json(json!({ "notifications": notifications }))
}

pub async fn export(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, String)> {
    let capacity = state.settings.read().await.ledger_capacity;
    let document = ExportDocument::collect(
        state.processor.ledger(),
        &state.reactions,
        &state.holders,
        capacity,
        state.clock.now(),
    )
    .await;

    let body = document.to_pretty_json().map_err(|e| {
        tracing::error!("Export serialization failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Export failed".to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", document.file_name())),
        ],
        body,
    )
        .into_response())
}
