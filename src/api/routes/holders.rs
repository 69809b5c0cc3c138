use axum::{
    extract::State,
    response::Json,
};
use serde_json::{json, Value};
use crate::api::AppState;

pub async fn get_holders(
    State(state): State<AppState>,
) -> Json<Value> {
    match state.holders.current().await {
        Some(current) => Json(json!(current)),
        None => Json(json!({ "holders": [] })),
    }
}

pub async fn get_snapshots(
    State(state): State<AppState>,
) -> Json<Value> {
    let snapshots = state.holders.snapshots().await;
    Json(json!({
        "count": snapshots.len(),
        "snapshots": snapshots,
    }))
}
