pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod visibility;

use axum::routing::{get, patch, post, put};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use folio_shared::clients::db::DbPool;

use crate::config::AppConfig;
use crate::visibility::VisibilityResolver;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub visibility: VisibilityResolver,
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/users/:id/currently-reading", get(routes::currently_reading::get_currently_reading))
        .route(
            "/users/:id/privacy-settings",
            get(routes::privacy::get_privacy_settings).put(routes::privacy::update_privacy_settings),
        )
        .route("/users/:id/privacy-settings/reset", post(routes::privacy::reset_privacy_settings))
        .route("/users/:id/privacy-stats", get(routes::privacy::get_privacy_stats))
        .route("/users/:id/privacy-audit", get(routes::privacy::get_privacy_audit))
        .route("/users/:id/access", get(routes::permissions::users_with_access))
        .route(
            "/users/:id/custom-permissions/:target_id",
            put(routes::permissions::grant_permission).delete(routes::permissions::revoke_permission),
        )
        .route(
            "/reading-progress/:book_id",
            get(routes::progress::get_progress)
                .put(routes::progress::put_progress)
                .delete(routes::progress::delete_progress),
        )
        .route("/reading-progress/:book_id/visibility", patch(routes::progress::update_visibility))
        .layer(middleware::from_fn(folio_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
