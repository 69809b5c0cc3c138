pub mod routes;
pub mod handlers;

use axum::{
  Router,
  routing::get,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use std::sync::Arc;
use crate::background::{DetectionService, SettingsSync};
use crate::clock::SharedClock;
use crate::config::SharedSettings;
use crate::countdown::CountdownEngine;
use crate::holders::HolderSnapshotEngine;
use crate::points::PointsLedger;
use crate::processor::Processor;
use crate::reaction::{BroadcastNotifier, ReactionEngine};
use crate::storage::Store;


#[derive(Clone)]
pub struct AppState {
  pub shared: Store,
  pub countdown: Arc<CountdownEngine>,
  pub detection: Arc<DetectionService>,
  pub processor: Arc<Processor>,
  pub reactions: Arc<ReactionEngine>,
  pub holders: Arc<HolderSnapshotEngine>,
  pub notifier: BroadcastNotifier,
  pub settings: SharedSettings,
  pub settings_sync: Arc<SettingsSync>,
  pub clock: SharedClock,
  pub points: Option<Arc<dyn PointsLedger>>,
  /// Token used for manual snapshots when detection has never been started.
  pub default_token: String,
}

pub fn create_router(state: AppState) -> Router {
  Router::new()
    .route("/health", get(handlers::health::health_check))

    .nest("/api", routes::create_api_routes())

    .nest("/ws", routes::create_ws_routes())

    .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
    .layer(TraceLayer::new_for_http())

    .with_state(state)
}
