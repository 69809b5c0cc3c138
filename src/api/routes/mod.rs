pub mod admin;
pub mod countdown;
pub mod holders;
pub mod points;
pub mod stats;
pub mod transactions;
pub mod websocket;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post, put},
};
use crate::api::AppState;
use crate::error::{StoreError, ValidationError};

pub fn create_api_routes() -> Router<AppState> {
    Router::new()

        .route("/countdown/{kind}", get(countdown::get_countdown))

        .route("/transactions", get(transactions::list_transactions))
        .route("/leaderboard", get(transactions::get_leaderboard))
        .route("/notifications", get(transactions::get_notifications))
        .route("/export", get(transactions::export))

        .route("/holders", get(holders::get_holders))
        .route("/snapshots", get(holders::get_snapshots))

        .route("/points/{wallet}", get(points::get_balance))

        .route("/stats", get(stats::get_stats))
        .route("/settings", get(admin::get_settings))

        .route("/admin/detection/start", post(admin::start_detection))
        .route("/admin/detection/stop", post(admin::stop_detection))
        .route("/admin/countdown/{kind}/reset", post(admin::reset_countdown))
        .route("/admin/countdown/{kind}/extend", post(admin::extend_countdown))
        .route("/admin/snapshot", post(admin::take_snapshot))
        .route("/admin/settings", put(admin::update_settings))
}


pub fn create_ws_routes() -> Router<AppState> {
    Router::new()

        .route("/notifications", get(websocket::notifications_websocket))
}

pub(crate) fn bad_request(e: ValidationError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

pub(crate) fn store_failure(e: StoreError) -> (StatusCode, String) {
    tracing::error!("Store error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Store error".to_string())
}
