use axum::{
    extract::{State, Path},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use crate::api::AppState;
use crate::countdown::{CountdownKind, CountdownState};
use chrono::{DateTime, Utc};

pub(crate) fn countdown_json(kind: CountdownKind, state: &CountdownState, now: DateTime<Utc>) -> Value {
    json!({
        "kind": kind.as_str(),
        "targetTimestamp": state.target_timestamp,
        "remainingSecs": state.remaining(now).num_seconds(),
        "capReached": state.cap_reached_flag,
    })
}

pub async fn get_countdown(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let kind: CountdownKind = kind
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;

    let countdown = state.countdown.state(kind).await;
    Ok(Json(countdown_json(kind, &countdown, state.countdown.now())))
}
