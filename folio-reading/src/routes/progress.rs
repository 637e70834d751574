use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use folio_shared::clients::db::with_conn;
use folio_shared::errors::AppResult;
use folio_shared::types::auth::AuthUser;
use folio_shared::types::ApiResponse;

use super::client_ip;
use crate::models::ReadingProgress;
use crate::services::progress_service::{self, ProgressUpdate, VisibilityUpdate};
use crate::AppState;

// --- GET /reading-progress/:book_id ---

pub async fn get_progress(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Option<ReadingProgress>>>> {
    let progress = with_conn(&state.db, move |conn| {
        progress_service::find_progress(conn, user.id, book_id)
    })
    .await?;

    Ok(Json(ApiResponse::ok(progress)))
}

// --- PUT /reading-progress/:book_id ---

pub async fn put_progress(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    Json(payload): Json<ProgressUpdate>,
) -> AppResult<Json<ApiResponse<ReadingProgress>>> {
    let progress = with_conn(&state.db, move |conn| {
        progress_service::upsert_progress(conn, user.id, book_id, &payload)
    })
    .await?;

    Ok(Json(ApiResponse::ok(progress)))
}

// --- DELETE /reading-progress/:book_id ---

#[derive(Debug, Serialize)]
pub struct ProgressRemovedResponse {
    pub removed: bool,
}

pub async fn delete_progress(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProgressRemovedResponse>>> {
    with_conn(&state.db, move |conn| {
        progress_service::delete_progress(conn, user.id, book_id)
    })
    .await?;

    Ok(Json(ApiResponse::ok(ProgressRemovedResponse { removed: true })))
}

// --- PATCH /reading-progress/:book_id/visibility ---

pub async fn update_visibility(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<VisibilityUpdate>,
) -> AppResult<Json<ApiResponse<ReadingProgress>>> {
    let ip = client_ip(&headers);
    let progress = with_conn(&state.db, move |conn| {
        progress_service::update_visibility(conn, user.id, book_id, &payload, ip)
    })
    .await?;

    Ok(Json(ApiResponse::ok(progress)))
}
