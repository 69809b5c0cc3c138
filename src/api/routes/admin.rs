use axum::{
    body::Bytes,
    extract::{State, Path},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use crate::api::AppState;
use crate::api::routes::{bad_request, store_failure};
use crate::api::routes::countdown::countdown_json;
use crate::config::validate_address;
use crate::countdown::CountdownKind;
use crate::error::ValidationError;
use crate::holders::SnapshotKind;
use crate::storage::keys;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    rpc_url: String,
    token_address: String,
}

#[derive(Deserialize, Default)]
pub struct ResetRequest {
    #[serde(default)]
    seconds: Option<u64>,
}

#[derive(Deserialize)]
pub struct ExtendRequest {
    seconds: u64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    #[serde(default)]
    token_address: Option<String>,
}

/// Bodies are optional on some admin calls; an empty body means defaults.
fn optional_body<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T, (StatusCode, String)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

pub async fn start_detection(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let control = state
        .detection
        .start(&request.rpc_url, &request.token_address)
        .await
        .map_err(bad_request)?;

    Ok(Json(json!({ "detection": control })))
}

pub async fn stop_detection(
    State(state): State<AppState>,
) -> Json<Value> {
    let control = state.detection.stop().await;
    Json(json!({
        "stopped": control.is_some(),
        "detection": control,
    }))
}

pub async fn reset_countdown(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, String)> {
    let kind: CountdownKind = kind
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;
    let request: ResetRequest = optional_body(&body)?;

    let reset = state
        .countdown
        .reset(kind, request.seconds)
        .await
        .map_err(bad_request)?;

    Ok(Json(countdown_json(kind, &reset, state.countdown.now())))
}

/// Only the launch countdown is extendable.
pub async fn extend_countdown(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(request): Json<ExtendRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let kind: CountdownKind = kind
        .parse()
        .map_err(|e: String| (StatusCode::NOT_FOUND, e))?;
    if kind != CountdownKind::Launch {
        return Err((StatusCode::BAD_REQUEST, format!("{} countdown cannot be extended", kind)));
    }

    let ceiling = state.settings.read().await.ceiling_secs;
    if request.seconds == 0 || request.seconds > ceiling {
        return Err(bad_request(ValidationError::Range {
            field: "seconds",
            value: request.seconds,
            min: 1,
            max: ceiling,
        }));
    }

    let extension = state.countdown.extend(CountdownKind::Launch, request.seconds).await;
    let mut body = countdown_json(CountdownKind::Launch, &extension.state, state.countdown.now());
    body["sharedWritten"] = json!(extension.shared_written);

    Ok(Json(body))
}

pub async fn take_snapshot(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, String)> {
    let request: SnapshotRequest = optional_body(&body)?;

    let token = match request.token_address {
        Some(token) => token,
        None => state
            .detection
            .control()
            .await
            .map(|c| c.token_address)
            .unwrap_or_else(|| state.default_token.clone()),
    };
    validate_address("tokenAddress", &token).map_err(bad_request)?;

    let snapshot = state
        .holders
        .snapshot(SnapshotKind::Manual, &token)
        .await
        .map_err(store_failure)?;

    Ok(Json(json!({ "snapshot": snapshot })))
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> Json<Value> {
    let settings = state.settings.read().await.clone();
    Json(json!(settings))
}

/// Merges a partial patch on a copy, persists it, then swaps it in. Other
/// instances pick it up from the store's change feed. A rejected patch
/// leaves both the store and the running settings alone.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut updated = state.settings.read().await.clone();
    updated.merge(patch).map_err(bad_request)?;

    state
        .shared
        .try_set(keys::SETTINGS, &updated)
        .await
        .map_err(store_failure)?;

    state.settings_sync.apply(updated.clone()).await;
    info!("⚙️ Settings updated");

    Ok(Json(json!(updated)))
}
