use axum::{
    extract::State,
    response::Json,
};
use serde_json::{json, Value};
use crate::api::AppState;

pub async fn get_stats(
    State(state): State<AppState>,
) -> Json<Value> {
    let capacity = state.settings.read().await.ledger_capacity;
    let shared = state.processor.ledger().backend.load(capacity).await;
    let frontend = state.processor.ledger().frontend.load(capacity).await;

    Json(json!({
        "ledger": shared.stats(),
        "frontendLedgerSize": frontend.len(),
        "processor": state.processor.metrics().get_stats(),
        "detectionRunning": state.detection.is_running().await,
        "connection": state.detection.monitor().get(),
    }))
}
