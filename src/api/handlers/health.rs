use axum::{
  extract::State,
  http::StatusCode,
  response::Json,
};
use serde_json::{json, Value};
use crate::api::AppState;

pub async fn health_check(
  State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
  let control = state.detection.control().await;

  (
    StatusCode::OK,
    Json(json!({
      "status": "healthy",
      "service": "launch watch",
      "timestamp": state.clock.now(),
      "connection": state.detection.monitor().get(),
      "detection": {
        "isRunning": control.as_ref().is_some_and(|c| c.is_running),
        "tokenAddress": control.as_ref().map(|c| c.token_address.clone()),
        "startTimestamp": control.as_ref().and_then(|c| c.start_timestamp),
        "timersActive": state.detection.timers_active(),
      },
    }))
  )
}
