use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use folio_shared::clients::db::with_conn;
use folio_shared::types::api::{HealthCheck, HealthResponse};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match with_conn(&state.db, |conn| {
        diesel::sql_query("SELECT 1").execute(conn)?;
        Ok(())
    })
    .await
    {
        Ok(()) => HealthCheck::up("database"),
        Err(e) => HealthCheck::down("database", e.to_string()),
    };

    Json(HealthResponse::healthy("folio-reading", env!("CARGO_PKG_VERSION")).with_checks(vec![database]))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
