use axum::{
    extract::{State, Path},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use crate::api::AppState;
use crate::error::PointsError;

pub async fn get_balance(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let Some(points) = state.points.as_ref() else {
        return Err((StatusCode::NOT_FOUND, "No points service configured".to_string()));
    };

    let balance = points.balance(&wallet).await.map_err(|e| match e {
        PointsError::Invalid(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            tracing::error!("Points service error: {}", other);
            (StatusCode::BAD_GATEWAY, "Points service error".to_string())
        }
    })?;

    Ok(Json(json!({
        "walletAddress": wallet,
        "points": balance.points,
        "tokens": balance.tokens,
    })))
}
